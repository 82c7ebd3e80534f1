//! Data access gateway
//!
//! Every read and write issued on behalf of a connection goes through a
//! [`DataGateway`] together with that connection's [`Identity`]. The gateway
//! is responsible for authorization; nothing in the live engine checks
//! permissions on its own.

pub mod filter;
mod memory;

pub use memory::{CollectionPermissions, MemoryGateway};

use async_trait::async_trait;
use itemstream_commons::{ErrorKind, Identity, Query, Schema};
use serde_json::Value;
use thiserror::Error;

/// Failures reported by a data gateway
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Forbidden(_) => ErrorKind::Unauthorized,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::InvalidPayload(_) => ErrorKind::InvalidPayload,
            GatewayError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Record-oriented store executing authorized reads and writes.
///
/// Keys are primary-key values as sent by clients (strings or numbers).
/// Writes return the affected keys; callers re-read to build responses.
#[async_trait]
pub trait DataGateway: Send + Sync {
    /// Current schema snapshot
    async fn schema(&self) -> Result<Schema, GatewayError>;

    async fn read_by_query(
        &self,
        collection: &str,
        query: &Query,
        identity: &Identity,
    ) -> Result<Vec<Value>, GatewayError>;

    async fn read_one(
        &self,
        collection: &str,
        key: &Value,
        query: &Query,
        identity: &Identity,
    ) -> Result<Value, GatewayError>;

    /// Records whose key is in `keys`, in store order. Missing keys are skipped.
    async fn read_many(
        &self,
        collection: &str,
        keys: &[Value],
        query: &Query,
        identity: &Identity,
    ) -> Result<Vec<Value>, GatewayError>;

    async fn create_one(
        &self,
        collection: &str,
        data: &Value,
        identity: &Identity,
    ) -> Result<Value, GatewayError>;

    async fn create_many(
        &self,
        collection: &str,
        data: &[Value],
        identity: &Identity,
    ) -> Result<Vec<Value>, GatewayError>;

    async fn update_one(
        &self,
        collection: &str,
        key: &Value,
        data: &Value,
        identity: &Identity,
    ) -> Result<Value, GatewayError>;

    async fn update_many(
        &self,
        collection: &str,
        keys: &[Value],
        data: &Value,
        identity: &Identity,
    ) -> Result<Vec<Value>, GatewayError>;

    async fn delete_one(
        &self,
        collection: &str,
        key: &Value,
        identity: &Identity,
    ) -> Result<Value, GatewayError>;

    async fn delete_many(
        &self,
        collection: &str,
        keys: &[Value],
        identity: &Identity,
    ) -> Result<Vec<Value>, GatewayError>;
}

/// Canonical string form of a primary-key value, so `"1"` and `1` match
pub fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_string_normalizes_numbers_and_strings() {
        assert_eq!(key_string(&json!("1")), key_string(&json!(1)));
        assert_eq!(key_string(&json!("abc")), "abc");
    }
}
