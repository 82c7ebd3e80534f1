//! itemstream-commons
//!
//! Shared types for the itemstream workspace:
//! - Wire protocol (inbound parsing, outbound frames)
//! - Connection identifiers and identity contexts
//! - Data schema snapshot
//! - Error kinds carried on ERROR frames
//!
//! This crate performs no I/O.

pub mod errors;
pub mod models;
pub mod websocket;

pub use errors::{ErrorInfo, ErrorKind};
pub use models::{ConnectionId, Identity, MutationAction, Schema};
pub use websocket::{
    CodecError, InboundMessage, MessageType, Query, ServerMessage, SubscriptionFrame,
};
