//! itemstream-api
//!
//! HTTP and WebSocket layer: upgrade authentication, the per-connection
//! socket task and route configuration.

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{admit, AuthError, Handshake, IdentityProvider, StaticTokenProvider};
pub use handlers::WsContext;
pub use routes::configure_routes;
