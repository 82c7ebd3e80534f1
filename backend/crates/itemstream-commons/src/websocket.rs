//! WebSocket message protocol
//!
//! # Client request
//! ```json
//! {
//!   "type": "SUBSCRIBE",
//!   "collection": "articles",
//!   "id": "1",
//!   "query": { "fields": ["id", "title"] },
//!   "uid": "s1"
//! }
//! ```
//!
//! # Server frames
//! ```json
//! { "type": "RESPONSE", "data": [...], "uid": "s1" }
//! { "type": "ERROR", "data": { "kind": "MissingTarget", "message": "..." }, "uid": "s1" }
//! { "type": "SUBSCRIPTION", "action": "update", "collection": "articles",
//!   "key": "1", "payload": { ... }, "uid": "s1" }
//! ```
//!
//! Parsing and serialization are pure. Query filtering happens at parse time
//! so unrecognized query fields never reach the data gateway.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::errors::{ErrorInfo, ErrorKind};
use crate::models::{MutationAction, Schema};

/// Query fields forwarded to the data gateway. Everything else is dropped.
pub const QUERY_FIELDS: [&str; 11] = [
    "fields", "sort", "filter", "limit", "offset", "page", "search", "group", "aggregate", "deep",
    "alias",
];

/// Request verb. Anything outside the standard set is kept as `Custom` so
/// extension handlers can claim it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    Get,
    Post,
    Patch,
    Delete,
    Subscribe,
    Unsubscribe,
    Custom(String),
}

impl MessageType {
    /// Case-insensitive, whitespace-trimmed parse
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_uppercase();
        match normalized.as_str() {
            "GET" => MessageType::Get,
            "POST" => MessageType::Post,
            "PATCH" => MessageType::Patch,
            "DELETE" => MessageType::Delete,
            "SUBSCRIBE" => MessageType::Subscribe,
            "UNSUBSCRIBE" => MessageType::Unsubscribe,
            _ => MessageType::Custom(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Get => "GET",
            MessageType::Post => "POST",
            MessageType::Patch => "PATCH",
            MessageType::Delete => "DELETE",
            MessageType::Subscribe => "SUBSCRIBE",
            MessageType::Unsubscribe => "UNSUBSCRIBE",
            MessageType::Custom(name) => name.as_str(),
        }
    }
}

/// Restricted item query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<Value>,
}

impl Query {
    /// Build a query from a client-supplied value, keeping only recognized
    /// fields with truthy values. Non-object input yields an empty query.
    pub fn from_value(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };
        let mut query = Self::default();
        for name in QUERY_FIELDS {
            let Some(v) = map.get(name).filter(|v| is_truthy(v)) else {
                continue;
            };
            if let Some(slot) = query.slot_mut(name) {
                *slot = Some(v.clone());
            }
        }
        query
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut Option<Value>> {
        Some(match name {
            "fields" => &mut self.fields,
            "sort" => &mut self.sort,
            "filter" => &mut self.filter,
            "limit" => &mut self.limit,
            "offset" => &mut self.offset,
            "page" => &mut self.page,
            "search" => &mut self.search,
            "group" => &mut self.group,
            "aggregate" => &mut self.aggregate,
            "deep" => &mut self.deep,
            "alias" => &mut self.alias,
            _ => return None,
        })
    }

    /// Copy of this query capped to `limit` rows
    pub fn with_limit(&self, limit: u64) -> Self {
        Self {
            limit: Some(Value::from(limit)),
            ..self.clone()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// JavaScript-style truthiness used for optional request fields
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Target selector of a write or delete
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target<'a> {
    One(&'a Value),
    Many(&'a [Value]),
}

/// Decoded client request
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub message_type: MessageType,
    pub collection: Option<String>,
    pub query: Query,
    pub data: Option<Value>,
    pub id: Option<Value>,
    pub ids: Option<Vec<Value>>,
    pub uid: Option<String>,
}

impl InboundMessage {
    #[inline]
    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// `ids` wins over `id` when both are given
    pub fn target(&self) -> Option<Target<'_>> {
        if let Some(ids) = &self.ids {
            return Some(Target::Many(ids));
        }
        self.id.as_ref().map(Target::One)
    }
}

/// Decoding failure. Carries the `uid` when it could be read from the frame.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CodecError {
    #[error("Malformed message: {reason}")]
    Malformed { reason: String, uid: Option<String> },

    #[error("Collection '{collection}' does not exist in schema")]
    UnknownCollection {
        collection: String,
        uid: Option<String>,
    },
}

impl CodecError {
    fn malformed(reason: impl Into<String>, uid: Option<String>) -> Self {
        CodecError::Malformed {
            reason: reason.into(),
            uid,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::Malformed { .. } => ErrorKind::MalformedMessage,
            CodecError::UnknownCollection { .. } => ErrorKind::UnknownCollection,
        }
    }

    pub fn uid(&self) -> Option<&str> {
        match self {
            CodecError::Malformed { uid, .. } | CodecError::UnknownCollection { uid, .. } => {
                uid.as_deref()
            },
        }
    }

    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::new(self.kind(), self.to_string())
    }
}

/// Parse a raw text frame against the current schema
pub fn parse_inbound(raw: &str, schema: &Schema) -> Result<InboundMessage, CodecError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| CodecError::malformed(format!("invalid JSON: {}", e), None))?;
    let Value::Object(mut frame) = value else {
        return Err(CodecError::malformed("frame must be a JSON object", None));
    };

    let uid = take_uid(&mut frame)?;

    let message_type = match frame.remove("type") {
        Some(Value::String(s)) if !s.trim().is_empty() => MessageType::parse(&s),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            return Err(CodecError::malformed("'type' is required", uid));
        },
        Some(_) => return Err(CodecError::malformed("'type' must be a string", uid)),
    };

    let collection = match frame.remove("collection") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let name = s.trim().to_lowercase();
            if name.is_empty() {
                None
            } else if !schema.has_collection(&name) {
                return Err(CodecError::UnknownCollection {
                    collection: name,
                    uid,
                });
            } else {
                Some(name)
            }
        },
        Some(_) => return Err(CodecError::malformed("'collection' must be a string", uid)),
    };

    let query = frame.get("query").map(Query::from_value).unwrap_or_default();

    let data = frame.remove("data").filter(|v| !v.is_null());

    let id = frame.remove("id").filter(is_truthy);

    let ids = match frame.remove("ids") {
        Some(Value::Array(items)) if !items.is_empty() => Some(items),
        Some(v) if is_truthy(&v) && !v.is_array() => {
            return Err(CodecError::malformed("'ids' must be an array", uid));
        },
        _ => None,
    };

    Ok(InboundMessage {
        message_type,
        collection,
        query,
        data,
        id,
        ids,
        uid,
    })
}

fn take_uid(frame: &mut Map<String, Value>) -> Result<Option<String>, CodecError> {
    match frame.remove("uid") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(CodecError::malformed("'uid' must be a string", None)),
    }
}

/// Push frame sent to a subscriber when a watched record changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionFrame {
    pub action: MutationAction,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<Value>>,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// Frames sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Response {
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uid: Option<String>,
    },
    Error {
        data: ErrorInfo,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uid: Option<String>,
    },
    Subscription(SubscriptionFrame),
}

impl ServerMessage {
    pub fn response(data: Value, uid: Option<&str>) -> Self {
        ServerMessage::Response {
            data,
            uid: uid.map(str::to_string),
        }
    }

    pub fn error(info: ErrorInfo, uid: Option<&str>) -> Self {
        ServerMessage::Error {
            data: info,
            uid: uid.map(str::to_string),
        }
    }

    pub fn subscription(frame: SubscriptionFrame) -> Self {
        ServerMessage::Subscription(frame)
    }

    pub fn uid(&self) -> Option<&str> {
        match self {
            ServerMessage::Response { uid, .. } | ServerMessage::Error { uid, .. } => {
                uid.as_deref()
            },
            ServerMessage::Subscription(frame) => frame.uid.as_deref(),
        }
    }

    /// Serialize to a text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a text frame produced by [`ServerMessage::encode`]
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
