//! Server lifecycle management helpers.
//!
//! Bootstraps the gateway, subscription registry, connection manager and
//! mutation bridge, wires the HTTP server and coordinates graceful shutdown.

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use itemstream_api::{configure_routes, IdentityProvider, StaticTokenProvider, WsContext};
use itemstream_configs::ServerConfig;
use itemstream_core::gateway::{DataGateway, MemoryGateway};
use itemstream_core::live::{
    ConnectionsManager, HandlerChain, MutationBridge, SubscriptionRegistry,
    ITEM_EVENT_CHANNEL_CAPACITY,
};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Components shared by the HTTP server and shutdown handling
pub struct ApplicationComponents {
    pub gateway: Arc<MemoryGateway>,
    pub registry: Arc<SubscriptionRegistry>,
    pub connections_manager: Arc<ConnectionsManager>,
    pub identity_provider: Arc<dyn IdentityProvider>,
    pub heartbeat_task: JoinHandle<()>,
    pub bridge_task: JoinHandle<()>,
}

/// Build every component and start the background tasks.
///
/// Must run inside a Tokio runtime.
pub async fn bootstrap(config: &ServerConfig) -> Result<ApplicationComponents> {
    let phase_start = std::time::Instant::now();

    let (event_tx, event_rx) = mpsc::channel(ITEM_EVENT_CHANNEL_CAPACITY);
    let gateway =
        Arc::new(MemoryGateway::from_settings(&config.store.collections).with_events(event_tx));
    let schema = gateway.schema().await?;
    info!("Data gateway ready with collections {:?}", schema.collections().collect::<Vec<_>>());
    if config.store.collections.is_empty() {
        warn!("No [[store.collections]] configured; every request will be UnknownCollection");
    }

    let data_gateway: Arc<dyn DataGateway> = gateway.clone();
    let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&data_gateway)));

    let chain = HandlerChain::from_config(config);
    info!("Handler chain: {:?}", chain.handler_names());

    let connections_manager = ConnectionsManager::new(
        &config.websocket,
        chain,
        data_gateway,
        Arc::clone(&registry),
    );
    let heartbeat_task = connections_manager.spawn_heartbeat_checker();

    let bridge = Arc::new(MutationBridge::new(Arc::clone(&registry), &config.events));
    info!("Mutation bridge scope: {:?}", bridge.scope());
    let bridge_task = bridge.run(event_rx);

    let provider = StaticTokenProvider::from_settings(&config.auth);
    if provider.is_empty() && !config.websocket.public {
        warn!("No API tokens configured and websocket.public = false; every upgrade will be refused");
    }

    debug!("Bootstrap finished in {:.2}ms", phase_start.elapsed().as_secs_f64() * 1000.0);

    Ok(ApplicationComponents {
        gateway,
        registry,
        connections_manager,
        identity_provider: Arc::new(provider),
        heartbeat_task,
        bridge_task,
    })
}

/// Start the HTTP server and manage graceful shutdown.
pub async fn run(config: &ServerConfig, components: ApplicationComponents) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let ws_path = config.websocket.path.clone();
    info!("Starting HTTP server on {}", bind_addr);
    debug!("Endpoints: GET {}, GET /health", ws_path);

    let connections_manager = Arc::clone(&components.connections_manager);
    let ws_context = web::Data::new(WsContext::new(
        Arc::clone(&components.connections_manager),
        Arc::clone(&components.identity_provider),
        &config.websocket,
    ));

    let server = HttpServer::new(move || {
        let ws_path = ws_path.clone();
        App::new()
            .wrap(Logger::default())
            .app_data(ws_context.clone())
            .configure(move |cfg| configure_routes(cfg, &ws_path))
    });
    let server = if config.server.workers > 0 {
        server.workers(config.server.workers)
    } else {
        server
    };
    let server = server.bind(&bind_addr)?.run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);
    let shutdown_timeout = Duration::from_secs(config.websocket.shutdown_timeout_secs);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => log::error!("Server failed: {}", e),
                Err(e) => log::error!("Server task failed: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown...");

            // Stop accepting new HTTP connections
            server_handle.stop(true).await;

            info!("Shutting down WebSocket connections...");
            connections_manager.shutdown(shutdown_timeout).await;
        }
    }

    components.bridge_task.abort();
    components.heartbeat_task.abort();
    debug!(
        "Remaining subscriptions at exit: {}",
        components.registry.subscription_count()
    );

    info!("Server shutdown complete");
    Ok(())
}
