//! Error kinds carried on ERROR frames.
//!
//! Every failure that reaches a client is reduced to an [`ErrorInfo`]: a
//! stable machine-readable [`ErrorKind`] plus a human-readable message.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire-level error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Frame is not valid structured data or a field has the wrong shape
    MalformedMessage,
    /// Named collection is absent from the schema
    UnknownCollection,
    /// No registered handler claims the message type
    UnsupportedMessageType,
    /// Write or delete without `id` / `ids`
    MissingTarget,
    /// Verb requires a collection but none was given
    MissingCollection,
    /// Write without a `data` payload
    MissingData,
    /// Permission failure reported by the data gateway
    Unauthorized,
    /// Record does not exist
    NotFound,
    /// Payload rejected by the data gateway
    InvalidPayload,
    /// Send attempted on a dead connection
    TransportClosed,
    /// Anything else
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedMessage => "MalformedMessage",
            ErrorKind::UnknownCollection => "UnknownCollection",
            ErrorKind::UnsupportedMessageType => "UnsupportedMessageType",
            ErrorKind::MissingTarget => "MissingTarget",
            ErrorKind::MissingCollection => "MissingCollection",
            ErrorKind::MissingData => "MissingData",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InvalidPayload => "InvalidPayload",
            ErrorKind::TransportClosed => "TransportClosed",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of an ERROR frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
