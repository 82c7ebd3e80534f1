//! Subscription Registry
//!
//! Maps each collection to its own independently locked subscriber set:
//! - `subscribe` adds a record, replacing any earlier one with the same
//!   (connection, uid)
//! - `unsubscribe` removes records of one connection by scope
//! - `dispatch` re-reads changed records through the data gateway with each
//!   subscriber's identity and pushes SUBSCRIPTION frames
//!
//! Locks are never held across a gateway call. Dispatch works on a snapshot
//! of the subscriber set; removal after the snapshot is observed through the
//! subscription's `active` flag.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::join_all;
use itemstream_commons::{ConnectionId, MutationAction, ServerMessage, SubscriptionFrame};
use log::{debug, info};
use parking_lot::RwLock;
use serde_json::Value;

use super::models::{
    Connection, DispatchReport, MutationEvent, Subscription, SubscriptionOptions, UnsubscribeScope,
};
use crate::error::LiveError;
use crate::gateway::DataGateway;

/// Hook that may rewrite or drop a SUBSCRIPTION frame right before it is sent
pub type OutboundFilter =
    Arc<dyn Fn(SubscriptionFrame) -> Option<SubscriptionFrame> + Send + Sync>;

#[derive(Debug, Default)]
struct SubscriberSet {
    entries: RwLock<Vec<Arc<Subscription>>>,
}

impl SubscriberSet {
    fn insert(&self, subscription: Arc<Subscription>) {
        self.entries.write().push(subscription);
    }

    fn snapshot(&self) -> Vec<Arc<Subscription>> {
        self.entries.read().clone()
    }

    fn remove_matching(&self, connection_id: &ConnectionId, scope: &UnsubscribeScope) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|sub| {
            if sub.matches_scope(connection_id, scope) {
                sub.deactivate();
                false
            } else {
                true
            }
        });
        before - entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn count_for(&self, connection_id: &ConnectionId) -> usize {
        self.entries.read().iter().filter(|s| s.connection_id() == connection_id).count()
    }
}

enum Delivery {
    Delivered,
    Skipped,
    Failed,
}

/// Collection → subscriber set
pub struct SubscriptionRegistry {
    topics: DashMap<String, Arc<SubscriberSet>>,
    gateway: Arc<dyn DataGateway>,
    next_id: AtomicU64,
    outbound_filter: Option<OutboundFilter>,
}

impl SubscriptionRegistry {
    pub fn new(gateway: Arc<dyn DataGateway>) -> Self {
        Self {
            topics: DashMap::new(),
            gateway,
            next_id: AtomicU64::new(1),
            outbound_filter: None,
        }
    }

    /// Install a filter applied to every SUBSCRIPTION frame before sending.
    /// Returning `None` drops the frame.
    pub fn with_outbound_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(SubscriptionFrame) -> Option<SubscriptionFrame> + Send + Sync + 'static,
    {
        self.outbound_filter = Some(Arc::new(filter));
        self
    }

    /// Register a subscription. Performs no authorization.
    ///
    /// Nothing stays registered for a connection that is already closed.
    pub fn subscribe(
        &self,
        collection: &str,
        connection: &Arc<Connection>,
        options: SubscriptionOptions,
    ) -> Arc<Subscription> {
        if let Some(uid) = options.uid.as_deref() {
            let replaced =
                self.unsubscribe(connection.id(), &UnsubscribeScope::Uid(uid.to_string()));
            if replaced > 0 {
                debug!("Replacing subscription uid={} for {}", uid, connection.id());
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscription =
            Arc::new(Subscription::new(id, collection.to_string(), connection, options));

        // Insert while holding the entry so a concurrent empty-topic cleanup
        // cannot detach the set we insert into
        self.topics
            .entry(collection.to_string())
            .or_insert_with(|| Arc::new(SubscriberSet::default()))
            .value()
            .insert(Arc::clone(&subscription));

        // The connection may have closed while the caller awaited its probe;
        // its `closed` cleanup already ran, so undo the insert here
        if connection.is_closed() {
            let removed = self.unsubscribe(connection.id(), &UnsubscribeScope::All);
            debug!(
                "Dropped {} subscription(s) on {} for closed connection {}",
                removed,
                collection,
                connection.id()
            );
            return subscription;
        }

        info!(
            "subscribed - {} #{} (connection={}, uid={:?})",
            collection,
            subscription.target().map(|v| v.to_string()).unwrap_or_default(),
            connection.id(),
            subscription.uid()
        );
        subscription
    }

    /// Remove subscriptions of `connection_id` selected by `scope`.
    ///
    /// Returns how many were removed; no-op when nothing matches.
    pub fn unsubscribe(&self, connection_id: &ConnectionId, scope: &UnsubscribeScope) -> usize {
        let topics: Vec<(String, Arc<SubscriberSet>)> = match scope {
            UnsubscribeScope::Collection(collection) => self
                .topics
                .get(collection)
                .map(|set| vec![(collection.clone(), Arc::clone(set.value()))])
                .unwrap_or_default(),
            UnsubscribeScope::All | UnsubscribeScope::Uid(_) => self
                .topics
                .iter()
                .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
                .collect(),
        };

        let mut removed = 0;
        for (collection, set) in topics {
            let count = set.remove_matching(connection_id, scope);
            if count > 0 {
                removed += count;
                self.topics.remove_if(&collection, |_, set| set.is_empty());
            }
        }

        if removed > 0 {
            debug!("Removed {} subscriptions for {} ({:?})", removed, connection_id, scope);
        }
        removed
    }

    /// Deliver a mutation to every concerned subscriber of its collection.
    ///
    /// Each subscriber's re-read runs concurrently and fails on its own;
    /// one subscriber's error never affects another's delivery.
    pub async fn dispatch(&self, event: &MutationEvent) -> DispatchReport {
        let Some(subscribers) = self.topics.get(&event.collection).map(|set| set.snapshot())
        else {
            return DispatchReport::default();
        };

        let keys = event.affected_keys();
        let outcomes =
            join_all(subscribers.into_iter().map(|sub| self.deliver(sub, event, &keys))).await;

        let mut report = DispatchReport::default();
        for outcome in outcomes {
            match outcome {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Skipped => report.skipped += 1,
                Delivery::Failed => report.failed += 1,
            }
        }
        debug!(
            "dispatch {} {}: delivered={} skipped={} failed={}",
            event.action, event.collection, report.delivered, report.skipped, report.failed
        );
        report
    }

    async fn deliver(
        &self,
        subscription: Arc<Subscription>,
        event: &MutationEvent,
        keys: &[Value],
    ) -> Delivery {
        if !subscription.is_active() || !subscription.watches_any(keys) {
            return Delivery::Skipped;
        }
        let Some(connection) = subscription.connection() else {
            return Delivery::Skipped;
        };

        let payload = if event.action == MutationAction::Delete {
            if is_empty_payload(&event.payload) {
                return Delivery::Skipped;
            }
            event.payload.clone()
        } else {
            let read_keys = match subscription.target() {
                Some(target) => vec![target.clone()],
                None => keys.to_vec(),
            };
            let result = self
                .gateway
                .read_many(&event.collection, &read_keys, subscription.query(), connection.identity())
                .await;
            match result {
                Ok(records) if records.is_empty() => return Delivery::Skipped,
                Ok(mut records) if event.is_single() => records.swap_remove(0),
                Ok(records) => Value::Array(records),
                Err(e) => {
                    debug!(
                        "Re-read for subscription {} on {} failed: {}",
                        subscription.id(),
                        event.collection,
                        e
                    );
                    return Delivery::Failed;
                },
            }
        };

        if !subscription.is_active() {
            return Delivery::Skipped;
        }

        let frame = SubscriptionFrame {
            action: event.action,
            collection: event.collection.clone(),
            key: event.key.clone(),
            keys: event.keys.clone(),
            payload,
            uid: subscription.uid().map(str::to_string),
        };
        let frame = match &self.outbound_filter {
            Some(filter) => match filter(frame) {
                Some(frame) => frame,
                None => return Delivery::Skipped,
            },
            None => frame,
        };

        match connection.send(&ServerMessage::subscription(frame)) {
            Ok(()) => Delivery::Delivered,
            Err(LiveError::TransportClosed) => Delivery::Skipped,
            Err(e) => {
                debug!("Failed to send SUBSCRIPTION to {}: {}", connection.id(), e);
                Delivery::Failed
            },
        }
    }

    // ==================== Metrics ====================

    pub fn subscription_count(&self) -> usize {
        self.topics.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn connection_subscription_count(&self, connection_id: &ConnectionId) -> usize {
        self.topics.iter().map(|entry| entry.value().count_for(connection_id)).sum()
    }

    pub fn collection_subscription_count(&self, collection: &str) -> usize {
        self.topics.get(collection).map(|set| set.len()).unwrap_or(0)
    }
}

fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
