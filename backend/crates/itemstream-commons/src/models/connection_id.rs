use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for WebSocket connections.
///
/// Generated once when the upgrade is accepted and stable for the life of the
/// connection. Used to route frames and to own subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a connection ID from an existing unique identifier
    #[inline]
    pub fn new(unique_id: impl Into<String>) -> Self {
        Self(unique_id.into())
    }

    /// Generate a fresh random connection ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Parse from string format
    pub fn from_string(s: &str) -> Result<Self, String> {
        if s.is_empty() {
            return Err("ConnectionId cannot be empty".to_string());
        }
        Ok(Self(s.to_string()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
