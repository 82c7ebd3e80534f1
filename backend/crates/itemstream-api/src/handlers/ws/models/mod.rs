//! WebSocket models

mod ws_context;

pub use ws_context::WsContext;
