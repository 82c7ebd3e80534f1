//! HTTP request handlers

pub mod health;
pub mod ws;

pub use health::health_handler;
pub use ws::{websocket_handler, WsContext};
