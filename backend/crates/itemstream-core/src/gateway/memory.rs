//! In-memory data gateway
//!
//! Holds each configured collection as an ordered list of JSON records with
//! role-based read and write permissions. After every successful write it
//! publishes an [`ItemEvent`] on the optional event channel, the same way a
//! host store would announce mutations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use itemstream_commons::{Identity, Query, Schema};
use itemstream_configs::CollectionSettings;
use log::{debug, warn};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use super::filter;
use super::{key_string, DataGateway, GatewayError};
use crate::live::models::ItemEvent;

/// Role lists guarding one collection
#[derive(Debug, Clone, Default)]
pub struct CollectionPermissions {
    pub read_roles: Vec<String>,
    pub write_roles: Vec<String>,
    pub public_read: bool,
}

impl CollectionPermissions {
    fn can_read(&self, identity: &Identity) -> bool {
        if identity.admin || self.public_read {
            return true;
        }
        identity
            .role
            .as_ref()
            .is_some_and(|role| self.read_roles.contains(role) || self.write_roles.contains(role))
    }

    fn can_write(&self, identity: &Identity) -> bool {
        identity.admin
            || identity.role.as_ref().is_some_and(|role| self.write_roles.contains(role))
    }
}

struct MemoryCollection {
    primary_key: String,
    permissions: RwLock<CollectionPermissions>,
    records: RwLock<Vec<Value>>,
    next_key: AtomicU64,
}

impl MemoryCollection {
    fn new(primary_key: String, permissions: CollectionPermissions) -> Self {
        Self {
            primary_key,
            permissions: RwLock::new(permissions),
            records: RwLock::new(Vec::new()),
            next_key: AtomicU64::new(1),
        }
    }

    fn key_of(&self, record: &Value) -> Option<String> {
        record.get(&self.primary_key).map(key_string)
    }

    fn position(records: &[Value], primary_key: &str, key: &str) -> Option<usize> {
        records
            .iter()
            .position(|r| r.get(primary_key).map(key_string).as_deref() == Some(key))
    }
}

/// Data gateway backed by process memory
pub struct MemoryGateway {
    collections: DashMap<String, Arc<MemoryCollection>>,
    events: Option<mpsc::Sender<ItemEvent>>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    /// Namespace used for record events
    pub const EVENT_NAMESPACE: &'static str = "items";

    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            events: None,
        }
    }

    /// Build a gateway with one empty collection per settings entry
    pub fn from_settings(collections: &[CollectionSettings]) -> Self {
        let gateway = Self::new();
        for settings in collections {
            gateway.add_collection(settings);
        }
        gateway
    }

    /// Publish an [`ItemEvent`] on `tx` after every successful write
    pub fn with_events(mut self, tx: mpsc::Sender<ItemEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn add_collection(&self, settings: &CollectionSettings) {
        let permissions = CollectionPermissions {
            read_roles: settings.read_roles.clone(),
            write_roles: settings.write_roles.clone(),
            public_read: settings.public_read,
        };
        let name = settings.name.trim().to_lowercase();
        debug!("Registering in-memory collection '{}' (pk={})", name, settings.primary_key);
        self.collections.insert(
            name,
            Arc::new(MemoryCollection::new(settings.primary_key.clone(), permissions)),
        );
    }

    /// Replace the permissions of a collection at runtime
    pub fn set_permissions(
        &self,
        collection: &str,
        permissions: CollectionPermissions,
    ) -> Result<(), GatewayError> {
        let target = self.collection(collection)?;
        *target.permissions.write() = permissions;
        Ok(())
    }

    fn collection(&self, name: &str) -> Result<Arc<MemoryCollection>, GatewayError> {
        self.collections
            .get(name)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| GatewayError::NotFound(format!("collection '{}'", name)))
    }

    fn readable(
        &self,
        name: &str,
        identity: &Identity,
    ) -> Result<Arc<MemoryCollection>, GatewayError> {
        let collection = self.collection(name)?;
        if !collection.permissions.read().can_read(identity) {
            return Err(GatewayError::Forbidden(format!(
                "'{}' may not read '{}'",
                identity.label(),
                name
            )));
        }
        Ok(collection)
    }

    fn writable(
        &self,
        name: &str,
        identity: &Identity,
    ) -> Result<Arc<MemoryCollection>, GatewayError> {
        let collection = self.collection(name)?;
        if !collection.permissions.read().can_write(identity) {
            return Err(GatewayError::Forbidden(format!(
                "'{}' may not write '{}'",
                identity.label(),
                name
            )));
        }
        Ok(collection)
    }

    fn publish(&self, event: ItemEvent) {
        let Some(tx) = &self.events else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {},
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Event channel full, dropping {} for {}", event.event, event.collection);
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event channel closed, mutation events are no longer published");
            },
        }
    }

    fn event_name(action: &str) -> String {
        format!("{}.{}", Self::EVENT_NAMESPACE, action)
    }

    fn insert_record(collection: &MemoryCollection, data: &Value) -> Result<Value, GatewayError> {
        let Value::Object(fields) = data else {
            return Err(GatewayError::InvalidPayload("record must be an object".to_string()));
        };
        let mut record: Map<String, Value> = fields.clone();

        let key = match record.get(&collection.primary_key).filter(|v| !v.is_null()) {
            Some(key) => {
                if let Some(n) = key.as_u64() {
                    let next = n.checked_add(1).ok_or_else(|| {
                        GatewayError::InvalidPayload(format!(
                            "'{}' {} is out of range",
                            collection.primary_key, n
                        ))
                    })?;
                    collection.next_key.fetch_max(next, Ordering::AcqRel);
                }
                key.clone()
            },
            None => {
                let key = Value::from(collection.next_key.fetch_add(1, Ordering::AcqRel));
                record.insert(collection.primary_key.clone(), key.clone());
                key
            },
        };

        let mut records = collection.records.write();
        let key_str = key_string(&key);
        if MemoryCollection::position(&records, &collection.primary_key, &key_str).is_some() {
            return Err(GatewayError::InvalidPayload(format!("duplicate key '{}'", key_str)));
        }
        records.push(Value::Object(record));
        Ok(key)
    }

    fn patch_records(
        collection: &MemoryCollection,
        keys: &[Value],
        data: &Value,
    ) -> Result<Vec<Value>, GatewayError> {
        let Value::Object(changes) = data else {
            return Err(GatewayError::InvalidPayload("update must be an object".to_string()));
        };

        let mut records = collection.records.write();
        let mut positions = Vec::with_capacity(keys.len());
        for key in keys {
            let key_str = key_string(key);
            let pos = MemoryCollection::position(&records, &collection.primary_key, &key_str)
                .ok_or_else(|| GatewayError::NotFound(format!("record '{}'", key_str)))?;
            positions.push(pos);
        }

        for pos in positions {
            if let Some(Value::Object(record)) = records.get_mut(pos) {
                for (field, value) in changes {
                    if *field != collection.primary_key {
                        record.insert(field.clone(), value.clone());
                    }
                }
            }
        }
        Ok(keys.to_vec())
    }

    fn remove_records(
        collection: &MemoryCollection,
        keys: &[Value],
    ) -> Result<Vec<Value>, GatewayError> {
        let wanted: Vec<String> = keys.iter().map(key_string).collect();
        let mut records = collection.records.write();
        for key in &wanted {
            if MemoryCollection::position(&records, &collection.primary_key, key).is_none() {
                return Err(GatewayError::NotFound(format!("record '{}'", key)));
            }
        }
        records.retain(|r| collection.key_of(r).map_or(true, |k| !wanted.contains(&k)));
        Ok(keys.to_vec())
    }
}

#[async_trait]
impl DataGateway for MemoryGateway {
    async fn schema(&self) -> Result<Schema, GatewayError> {
        Ok(Schema::new(self.collections.iter().map(|e| e.key().clone())))
    }

    async fn read_by_query(
        &self,
        collection: &str,
        query: &Query,
        identity: &Identity,
    ) -> Result<Vec<Value>, GatewayError> {
        let target = self.readable(collection, identity)?;
        let records = target.records.read().clone();
        filter::apply(records, query)
    }

    async fn read_one(
        &self,
        collection: &str,
        key: &Value,
        query: &Query,
        identity: &Identity,
    ) -> Result<Value, GatewayError> {
        let target = self.readable(collection, identity)?;
        let key_str = key_string(key);
        let records = target.records.read();
        MemoryCollection::position(&records, &target.primary_key, &key_str)
            .and_then(|pos| records.get(pos))
            .map(|record| filter::project(record, query.fields.as_ref()))
            .ok_or_else(|| GatewayError::NotFound(format!("record '{}'", key_str)))
    }

    async fn read_many(
        &self,
        collection: &str,
        keys: &[Value],
        query: &Query,
        identity: &Identity,
    ) -> Result<Vec<Value>, GatewayError> {
        let target = self.readable(collection, identity)?;
        let wanted: Vec<String> = keys.iter().map(key_string).collect();
        let records: Vec<Value> = target
            .records
            .read()
            .iter()
            .filter(|r| target.key_of(r).is_some_and(|k| wanted.contains(&k)))
            .cloned()
            .collect();
        filter::apply(records, query)
    }

    async fn create_one(
        &self,
        collection: &str,
        data: &Value,
        identity: &Identity,
    ) -> Result<Value, GatewayError> {
        let target = self.writable(collection, identity)?;
        let key = Self::insert_record(&target, data)?;
        self.publish(
            ItemEvent::new(Self::event_name("create"), collection)
                .with_key(key.clone())
                .with_payload(data.clone()),
        );
        Ok(key)
    }

    async fn create_many(
        &self,
        collection: &str,
        data: &[Value],
        identity: &Identity,
    ) -> Result<Vec<Value>, GatewayError> {
        let target = self.writable(collection, identity)?;
        let mut keys = Vec::with_capacity(data.len());
        for item in data {
            let key = Self::insert_record(&target, item)?;
            self.publish(
                ItemEvent::new(Self::event_name("create"), collection)
                    .with_key(key.clone())
                    .with_payload(item.clone()),
            );
            keys.push(key);
        }
        Ok(keys)
    }

    async fn update_one(
        &self,
        collection: &str,
        key: &Value,
        data: &Value,
        identity: &Identity,
    ) -> Result<Value, GatewayError> {
        let target = self.writable(collection, identity)?;
        Self::patch_records(&target, std::slice::from_ref(key), data)?;
        self.publish(
            ItemEvent::new(Self::event_name("update"), collection)
                .with_keys(vec![key.clone()])
                .with_payload(data.clone()),
        );
        Ok(key.clone())
    }

    async fn update_many(
        &self,
        collection: &str,
        keys: &[Value],
        data: &Value,
        identity: &Identity,
    ) -> Result<Vec<Value>, GatewayError> {
        let target = self.writable(collection, identity)?;
        let updated = Self::patch_records(&target, keys, data)?;
        self.publish(
            ItemEvent::new(Self::event_name("update"), collection)
                .with_keys(updated.clone())
                .with_payload(data.clone()),
        );
        Ok(updated)
    }

    async fn delete_one(
        &self,
        collection: &str,
        key: &Value,
        identity: &Identity,
    ) -> Result<Value, GatewayError> {
        let target = self.writable(collection, identity)?;
        Self::remove_records(&target, std::slice::from_ref(key))?;
        self.publish(
            ItemEvent::new(Self::event_name("delete"), collection)
                .with_keys(vec![key.clone()])
                .with_payload(Value::Array(vec![key.clone()])),
        );
        Ok(key.clone())
    }

    async fn delete_many(
        &self,
        collection: &str,
        keys: &[Value],
        identity: &Identity,
    ) -> Result<Vec<Value>, GatewayError> {
        let target = self.writable(collection, identity)?;
        let deleted = Self::remove_records(&target, keys)?;
        self.publish(
            ItemEvent::new(Self::event_name("delete"), collection)
                .with_keys(deleted.clone())
                .with_payload(Value::Array(deleted.clone())),
        );
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(name: &str) -> CollectionSettings {
        CollectionSettings {
            name: name.to_string(),
            primary_key: "id".to_string(),
            read_roles: vec!["viewer".to_string()],
            write_roles: vec!["editor".to_string()],
            public_read: false,
        }
    }

    fn gateway() -> MemoryGateway {
        MemoryGateway::from_settings(&[settings("articles")])
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_keys() {
        let gw = gateway();
        let editor = Identity::with_role("e1", "editor");

        let first = gw.create_one("articles", &json!({"title": "A"}), &editor).await.unwrap();
        let rest = gw
            .create_many("articles", &[json!({"title": "B"}), json!({"title": "C"})], &editor)
            .await
            .unwrap();
        assert_eq!(first, json!(1));
        assert_eq!(rest, vec![json!(2), json!(3)]);

        let explicit = gw.create_one("articles", &json!({"id": 10}), &editor).await.unwrap();
        assert_eq!(explicit, json!(10));
        let next = gw.create_one("articles", &json!({}), &editor).await.unwrap();
        assert_eq!(next, json!(11));

        let dup = gw.create_one("articles", &json!({"id": "10"}), &editor).await;
        assert!(matches!(dup, Err(GatewayError::InvalidPayload(_))));
    }

    #[tokio::test]
    async fn test_create_with_max_key_is_invalid_payload() {
        let gw = gateway();
        let editor = Identity::with_role("e1", "editor");

        let result = gw.create_one("articles", &json!({"id": u64::MAX}), &editor).await;
        assert!(matches!(result, Err(GatewayError::InvalidPayload(_))));

        let next = gw.create_one("articles", &json!({}), &editor).await.unwrap();
        assert_eq!(next, json!(1));
    }

    #[tokio::test]
    async fn test_permissions_are_enforced() {
        let gw = gateway();
        let viewer = Identity::with_role("v1", "viewer");
        let anonymous = Identity::anonymous();

        let write = gw.create_one("articles", &json!({"title": "A"}), &viewer).await;
        assert!(matches!(write, Err(GatewayError::Forbidden(_))));

        let read = gw.read_by_query("articles", &Query::default(), &anonymous).await;
        assert!(matches!(read, Err(GatewayError::Forbidden(_))));

        assert!(gw.read_by_query("articles", &Query::default(), &viewer).await.is_ok());

        gw.set_permissions("articles", CollectionPermissions::default()).unwrap();
        let read = gw.read_by_query("articles", &Query::default(), &viewer).await;
        assert!(matches!(read, Err(GatewayError::Forbidden(_))));

        let admin = Identity::admin("root");
        assert!(gw.read_by_query("articles", &Query::default(), &admin).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_merges_and_keeps_primary_key() {
        let gw = gateway();
        let editor = Identity::with_role("e1", "editor");
        gw.create_one("articles", &json!({"id": "a", "title": "Old", "views": 1}), &editor)
            .await
            .unwrap();

        gw.update_one("articles", &json!("a"), &json!({"id": "b", "title": "New"}), &editor)
            .await
            .unwrap();

        let record = gw.read_one("articles", &json!("a"), &Query::default(), &editor).await.unwrap();
        assert_eq!(record, json!({"id": "a", "title": "New", "views": 1}));

        let missing = gw.update_many("articles", &[json!("a"), json!("z")], &json!({}), &editor).await;
        assert!(matches!(missing, Err(GatewayError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_read_many_matches_numeric_and_string_keys() {
        let gw = gateway();
        let editor = Identity::with_role("e1", "editor");
        gw.create_many("articles", &[json!({"title": "A"}), json!({"title": "B"})], &editor)
            .await
            .unwrap();

        let query = Query::from_value(&json!({"fields": ["title"]}));
        let rows = gw
            .read_many("articles", &[json!("2"), json!(9)], &query, &editor)
            .await
            .unwrap();
        assert_eq!(rows, vec![json!({"title": "B"})]);
    }

    #[tokio::test]
    async fn test_delete_removes_records() {
        let gw = gateway();
        let editor = Identity::with_role("e1", "editor");
        gw.create_many("articles", &[json!({}), json!({}), json!({})], &editor).await.unwrap();

        let deleted = gw.delete_many("articles", &[json!(1), json!(3)], &editor).await.unwrap();
        assert_eq!(deleted, vec![json!(1), json!(3)]);
        let rows = gw.read_by_query("articles", &Query::default(), &editor).await.unwrap();
        assert_eq!(rows, vec![json!({"id": 2})]);

        let missing = gw.delete_one("articles", &json!(1), &editor).await;
        assert!(matches!(missing, Err(GatewayError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_writes_publish_item_events() {
        let (tx, mut rx) = mpsc::channel(16);
        let gw = gateway().with_events(tx);
        let editor = Identity::with_role("e1", "editor");

        gw.create_one("articles", &json!({"title": "A"}), &editor).await.unwrap();
        gw.update_one("articles", &json!(1), &json!({"title": "B"}), &editor).await.unwrap();
        gw.delete_one("articles", &json!(1), &editor).await.unwrap();

        let created = rx.recv().await.unwrap();
        assert_eq!(created.event, "items.create");
        assert_eq!(created.key, Some(json!(1)));

        let updated = rx.recv().await.unwrap();
        assert_eq!(updated.event, "items.update");
        assert_eq!(updated.keys, Some(vec![json!(1)]));

        let deleted = rx.recv().await.unwrap();
        assert_eq!(deleted.event, "items.delete");
        assert_eq!(deleted.payload, json!([1]));
    }

    #[tokio::test]
    async fn test_schema_lists_collections() {
        let gw = MemoryGateway::from_settings(&[settings("Articles"), settings("authors")]);
        let schema = gw.schema().await.unwrap();
        assert!(schema.has_collection("articles"));
        assert!(schema.has_collection("authors"));

        let err = gw.read_by_query("ghosts", &Query::default(), &Identity::admin("root")).await;
        assert!(matches!(err, Err(GatewayError::NotFound(_))));
    }
}
