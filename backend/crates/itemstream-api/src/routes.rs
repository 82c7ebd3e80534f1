//! API routes configuration

use crate::handlers;
use actix_web::web;

/// Configure itemstream routes:
/// - GET `<ws_path>` - WebSocket upgrade endpoint
/// - GET /health - liveness probe
pub fn configure_routes(cfg: &mut web::ServiceConfig, ws_path: &str) {
    cfg.route(ws_path, web::get().to(handlers::websocket_handler))
        .route("/health", web::get().to(handlers::health_handler));
}
