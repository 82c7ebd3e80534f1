//! Mutation Event Bridge
//!
//! Turns host mutation events (`items.create`, `items.update`, ...) into
//! registry dispatch calls. Only namespaces in the configured scope are
//! forwarded; filtering of subscribers is left to the registry.

use std::sync::Arc;

use itemstream_commons::MutationAction;
use itemstream_configs::EventSettings;
use log::{debug, trace};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::models::{DispatchReport, ItemEvent, MutationEvent};
use super::registry::SubscriptionRegistry;

/// Bounded capacity of the host event channel
pub const ITEM_EVENT_CHANNEL_CAPACITY: usize = 1024;

pub struct MutationBridge {
    registry: Arc<SubscriptionRegistry>,
    scope: Vec<String>,
}

impl MutationBridge {
    pub fn new(registry: Arc<SubscriptionRegistry>, settings: &EventSettings) -> Self {
        let scope = settings.scope();
        debug!("MutationBridge listening on namespaces {:?}", scope);
        Self { registry, scope }
    }

    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    /// Build the dispatch event for a host event, or `None` when the event
    /// is out of scope or not a create/update/delete
    pub fn translate(&self, event: &ItemEvent) -> Option<MutationEvent> {
        let (namespace, action) = event.parts()?;
        if !self.scope.iter().any(|ns| ns == namespace) {
            trace!("Ignoring event {} outside of scope", event.event);
            return None;
        }

        let collection = event.collection.trim().to_lowercase();
        let mutation = MutationEvent::new(action, collection).with_payload(event.payload.clone());
        // Deletes are described by their payload alone
        let mutation = match (action, &event.key, &event.keys) {
            (MutationAction::Delete, _, _) => mutation,
            (_, Some(key), _) => mutation.with_key(key.clone()),
            (_, None, Some(keys)) => mutation.with_keys(keys.clone()),
            (_, None, None) => mutation,
        };
        Some(mutation)
    }

    /// Translate and dispatch one event, waiting for delivery to finish
    pub async fn forward(&self, event: &ItemEvent) -> Option<DispatchReport> {
        let mutation = self.translate(event)?;
        debug!("[ WS ] event {} on {}", event.event, mutation.collection);
        Some(self.registry.dispatch(&mutation).await)
    }

    /// Consume host events until the channel closes, dispatching each one in
    /// its own task
    pub fn run(self: Arc<Self>, mut rx: mpsc::Receiver<ItemEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(mutation) = self.translate(&event) else {
                    continue;
                };
                let registry = Arc::clone(&self.registry);
                tokio::spawn(async move {
                    registry.dispatch(&mutation).await;
                });
            }
            debug!("MutationBridge event channel closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use serde_json::json;

    fn bridge(settings: EventSettings) -> MutationBridge {
        let registry = Arc::new(SubscriptionRegistry::new(Arc::new(MemoryGateway::new())));
        MutationBridge::new(registry, &settings)
    }

    #[test]
    fn test_translate_by_action() {
        let bridge = bridge(EventSettings::default());

        let create = ItemEvent::new("items.create", "Articles")
            .with_key(json!(5))
            .with_payload(json!({"title": "x"}));
        let mutation = bridge.translate(&create).unwrap();
        assert_eq!(mutation.action, MutationAction::Create);
        assert_eq!(mutation.collection, "articles");
        assert_eq!(mutation.key, Some(json!(5)));

        let update = ItemEvent::new("items.update", "articles").with_keys(vec![json!(1)]);
        let mutation = bridge.translate(&update).unwrap();
        assert_eq!(mutation.keys, Some(vec![json!(1)]));
        assert_eq!(mutation.key, None);

        let single_update = ItemEvent::new("items.update", "articles").with_key(json!("1"));
        let mutation = bridge.translate(&single_update).unwrap();
        assert_eq!(mutation.key, Some(json!("1")));

        let delete = ItemEvent::new("items.delete", "articles")
            .with_keys(vec![json!(1)])
            .with_payload(json!([1]));
        let mutation = bridge.translate(&delete).unwrap();
        assert_eq!(mutation.keys, None);
        assert_eq!(mutation.payload, json!([1]));
    }

    #[test]
    fn test_namespace_scope() {
        let default_scope = bridge(EventSettings::default());
        assert!(default_scope.translate(&ItemEvent::new("users.update", "users")).is_none());
        assert!(default_scope.translate(&ItemEvent::new("items.sort", "articles")).is_none());

        let with_system = bridge(EventSettings {
            system: true,
            namespaces: vec![],
        });
        assert!(with_system.translate(&ItemEvent::new("users.update", "users")).is_some());

        let custom = bridge(EventSettings {
            system: false,
            namespaces: vec!["orders".to_string()],
        });
        assert!(custom.translate(&ItemEvent::new("orders.create", "orders")).is_some());
        assert!(custom.translate(&ItemEvent::new("users.create", "users")).is_none());
    }

    #[tokio::test]
    async fn test_forward_without_subscribers() {
        let bridge = bridge(EventSettings::default());
        let report = bridge
            .forward(&ItemEvent::new("items.update", "articles").with_keys(vec![json!(1)]))
            .await;
        assert_eq!(report, Some(DispatchReport::default()));
        assert_eq!(bridge.forward(&ItemEvent::new("files.upload", "x")).await, None);
    }
}
