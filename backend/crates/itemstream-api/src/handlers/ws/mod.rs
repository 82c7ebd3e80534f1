//! WebSocket endpoint
//!
//! - Upgrade gate and socket task (handler.rs)
//! - Frame senders (events/)
//! - Endpoint context (models/)

pub mod events;
mod handler;
pub mod models;

pub use handler::websocket_handler;
pub use models::WsContext;
