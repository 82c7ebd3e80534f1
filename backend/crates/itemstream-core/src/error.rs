//! Error types for itemstream-core

use itemstream_commons::{CodecError, ErrorInfo, ErrorKind};
use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors raised while handling a message or delivering a frame
#[derive(Error, Debug)]
pub enum LiveError {
    #[error("'collection' is required")]
    MissingCollection,

    #[error("Either 'ids' or 'id' is required")]
    MissingTarget,

    #[error("'data' is required")]
    MissingData,

    #[error("Unsupported message type '{0}'")]
    UnsupportedMessageType(String),

    #[error("Connection is closed")]
    TransportClosed,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl LiveError {
    /// Wire-level kind carried on the ERROR frame
    pub fn kind(&self) -> ErrorKind {
        match self {
            LiveError::MissingCollection => ErrorKind::MissingCollection,
            LiveError::MissingTarget => ErrorKind::MissingTarget,
            LiveError::MissingData => ErrorKind::MissingData,
            LiveError::UnsupportedMessageType(_) => ErrorKind::UnsupportedMessageType,
            LiveError::TransportClosed => ErrorKind::TransportClosed,
            LiveError::Codec(e) => e.kind(),
            LiveError::Gateway(e) => e.kind(),
            LiveError::SerializationError(_) => ErrorKind::Internal,
        }
    }

    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::new(self.kind(), self.to_string())
    }
}

impl From<serde_json::Error> for LiveError {
    fn from(e: serde_json::Error) -> Self {
        LiveError::SerializationError(e.to_string())
    }
}

/// Result type for live operations
pub type Result<T> = std::result::Result<T, LiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_errors_keep_their_kind() {
        let err: LiveError = GatewayError::Forbidden("no read access".into()).into();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.info().message, "Forbidden: no read access");

        let err: LiveError = GatewayError::NotFound("articles/9".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_validation_error_messages() {
        assert_eq!(LiveError::MissingTarget.kind(), ErrorKind::MissingTarget);
        assert_eq!(LiveError::MissingTarget.to_string(), "Either 'ids' or 'id' is required");
        assert_eq!(
            LiveError::UnsupportedMessageType("EXAMPLE".into()).kind(),
            ErrorKind::UnsupportedMessageType
        );
    }
}
