use itemstream_commons::MutationAction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mutation notification as published by the host store.
///
/// `event` is `<namespace>.<action>`, e.g. `items.update`. Creates carry
/// `key`, updates carry `keys`, deletes carry the deleted keys in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEvent {
    pub event: String,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<Value>>,
    #[serde(default)]
    pub payload: Value,
}

impl ItemEvent {
    pub fn new(event: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            collection: collection.into(),
            key: None,
            keys: None,
            payload: Value::Null,
        }
    }

    pub fn with_key(mut self, key: Value) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_keys(mut self, keys: Vec<Value>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Split `event` into namespace and action
    pub fn parts(&self) -> Option<(&str, MutationAction)> {
        let (namespace, action) = self.event.rsplit_once('.')?;
        Some((namespace, MutationAction::from_event_suffix(action)?))
    }
}

/// Change fed into subscription dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct MutationEvent {
    pub action: MutationAction,
    pub collection: String,
    pub key: Option<Value>,
    pub keys: Option<Vec<Value>>,
    pub payload: Value,
}

impl MutationEvent {
    pub fn new(action: MutationAction, collection: impl Into<String>) -> Self {
        Self {
            action,
            collection: collection.into(),
            key: None,
            keys: None,
            payload: Value::Null,
        }
    }

    pub fn with_key(mut self, key: Value) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_keys(mut self, keys: Vec<Value>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Affected keys: `[key]` for single-key events, otherwise `keys`
    pub fn affected_keys(&self) -> Vec<Value> {
        match (&self.key, &self.keys) {
            (Some(key), _) => vec![key.clone()],
            (None, Some(keys)) => keys.clone(),
            (None, None) => match &self.payload {
                Value::Array(keys) if self.action == MutationAction::Delete => keys.clone(),
                _ => Vec::new(),
            },
        }
    }

    /// Single-key events deliver one record instead of an array
    #[inline]
    pub fn is_single(&self) -> bool {
        self.key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_parts() {
        let event = ItemEvent::new("items.update", "articles");
        assert_eq!(event.parts(), Some(("items", MutationAction::Update)));

        assert_eq!(ItemEvent::new("items.sort", "articles").parts(), None);
        assert_eq!(ItemEvent::new("update", "articles").parts(), None);
    }

    #[test]
    fn test_affected_keys() {
        let single = MutationEvent::new(MutationAction::Create, "articles").with_key(json!(1));
        assert_eq!(single.affected_keys(), vec![json!(1)]);
        assert!(single.is_single());

        let many = MutationEvent::new(MutationAction::Update, "articles")
            .with_keys(vec![json!(1), json!(2)]);
        assert_eq!(many.affected_keys().len(), 2);
        assert!(!many.is_single());

        let deleted = MutationEvent::new(MutationAction::Delete, "articles")
            .with_payload(json!(["4", "5"]));
        assert_eq!(deleted.affected_keys(), vec![json!("4"), json!("5")]);
    }
}
