//! Connections Manager
//!
//! Owns every live connection and drives its lifecycle:
//! - registration and deregistration (bounded by `max_connections`)
//! - `connected` / `closed` lifecycle events to every handler
//! - decoding inbound frames and routing them through the handler chain
//! - background heartbeat checker
//! - graceful shutdown coordination
//!
//! Transport tasks hold the `Arc<Connection>` returned on registration and
//! report back through `handle_frame` and `close`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use itemstream_commons::websocket::parse_inbound;
use itemstream_commons::{ConnectionId, ErrorInfo, ErrorKind, Identity, ServerMessage};
use itemstream_configs::WebSocketSettings;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::handlers::{HandlerChain, HandlerContext};
use super::models::{
    Connection, ConnectionEvent, ConnectionRegistration, EVENT_CHANNEL_CAPACITY,
};
use super::registry::SubscriptionRegistry;
use crate::gateway::DataGateway;

pub struct ConnectionsManager {
    /// All active connections: ConnectionId → Connection
    connections: DashMap<ConnectionId, Arc<Connection>>,

    chain: HandlerChain,
    gateway: Arc<dyn DataGateway>,
    registry: Arc<SubscriptionRegistry>,

    // === Configuration ===
    outbound_buffer: usize,
    client_timeout: Duration,
    heartbeat_interval: Duration,
    /// Maximum concurrent connections allowed (DoS protection)
    max_connections: usize,

    // === Shutdown Coordination ===
    shutdown_token: CancellationToken,
    is_shutting_down: AtomicBool,

    // === Metrics ===
    total_connections: AtomicUsize,
}

impl ConnectionsManager {
    pub fn new(
        settings: &WebSocketSettings,
        chain: HandlerChain,
        gateway: Arc<dyn DataGateway>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            connections: DashMap::new(),
            chain,
            gateway,
            registry,
            outbound_buffer: settings.outbound_buffer.max(1),
            client_timeout: Duration::from_secs(settings.client_timeout_secs),
            heartbeat_interval: Duration::from_secs(settings.heartbeat_interval_secs.max(1)),
            max_connections: settings.max_connections,
            shutdown_token: CancellationToken::new(),
            is_shutting_down: AtomicBool::new(false),
            total_connections: AtomicUsize::new(0),
        });

        debug!(
            "ConnectionsManager initialized (handlers={:?}, client_timeout={}s, max_connections={})",
            manager.chain.handler_names(),
            manager.client_timeout.as_secs(),
            manager.max_connections
        );
        manager
    }

    fn context<'a>(&'a self, connection: &'a Arc<Connection>) -> HandlerContext<'a> {
        HandlerContext {
            connection,
            gateway: &self.gateway,
            registry: &self.registry,
        }
    }

    // ==================== Connection Lifecycle ====================

    /// Register a new connection once the upgrade has been admitted
    ///
    /// Returns None if server is shutting down or max connections reached.
    pub fn register_connection(&self, identity: Identity) -> Option<ConnectionRegistration> {
        if self.is_shutting_down.load(Ordering::Acquire) {
            warn!("Rejecting new connection during shutdown ({})", identity.label());
            return None;
        }

        // Reserve a slot atomically so concurrent upgrades cannot exceed the limit
        let reserved = self.total_connections.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |current| (current < self.max_connections).then_some(current + 1),
        );
        let count = match reserved {
            Ok(previous) => previous + 1,
            Err(_) => {
                warn!(
                    "Rejecting connection for {}: max connections ({}) reached",
                    identity.label(),
                    self.max_connections
                );
                return None;
            },
        };

        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_buffer);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let connection_id = ConnectionId::generate();
        let connection = Arc::new(Connection::new(
            connection_id.clone(),
            identity,
            outbound_tx,
            event_tx,
        ));

        self.connections.insert(connection_id.clone(), Arc::clone(&connection));
        info!(
            "connection {} opened ({}, {} active)",
            connection_id,
            connection.identity().label(),
            count
        );

        Some(ConnectionRegistration {
            connection,
            outbound_rx,
            event_rx,
        })
    }

    /// Emit the `connected` lifecycle event to every handler
    pub async fn connected(&self, connection: &Arc<Connection>) {
        self.chain.connected(&self.context(connection)).await;
    }

    /// Decode one inbound text frame and route it through the handler chain
    ///
    /// Never fails; every problem is answered with an ERROR frame.
    pub async fn handle_frame(&self, connection: &Arc<Connection>, raw: &str) {
        connection.touch();

        let schema = match self.gateway.schema().await {
            Ok(schema) => schema,
            Err(e) => {
                warn!("Schema unavailable for {}: {}", connection.id(), e);
                let info = ErrorInfo::new(ErrorKind::Internal, e.to_string());
                connection.send_or_log(&ServerMessage::error(info, None));
                return;
            },
        };

        match parse_inbound(raw, &schema) {
            Ok(message) => self.chain.route(&self.context(connection), message).await,
            Err(e) => {
                debug!("Rejected frame from {}: {}", connection.id(), e);
                connection.send_or_log(&ServerMessage::error(e.info(), e.uid()));
            },
        }
    }

    /// Deregister a connection and emit `closed` to every handler.
    ///
    /// Idempotent: returns false when the connection was already gone.
    pub async fn close(&self, connection_id: &ConnectionId) -> bool {
        let Some((_, connection)) = self.connections.remove(connection_id) else {
            return false;
        };
        let remaining = self.total_connections.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);

        // A subscribe still awaiting its probe sees this flag after inserting
        connection.mark_closed();
        self.chain.closed(&self.context(&connection)).await;
        info!("connection {} closed ({} active)", connection_id, remaining);
        true
    }

    /// Best-effort send of one frame to every connection
    ///
    /// Returns how many connections accepted the frame.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let mut delivered = 0;
        for entry in self.connections.iter() {
            if entry.value().send(message).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    // ==================== Query Methods ====================

    pub fn get_connection(&self, connection_id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(connection_id).map(|c| Arc::clone(c.value()))
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.total_connections.load(Ordering::Acquire)
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.subscription_count()
    }

    // ==================== Shutdown ====================

    /// Initiate graceful shutdown of all connections
    pub async fn shutdown(&self, timeout: Duration) {
        let count = self.total_connections.load(Ordering::Acquire);
        info!("Initiating WebSocket shutdown with {} active connections", count);

        self.is_shutting_down.store(true, Ordering::Release);

        for entry in self.connections.iter() {
            entry.value().send_event(ConnectionEvent::Shutdown);
        }

        // Wait for connections to close with timeout
        let deadline = Instant::now() + timeout;
        while self.total_connections.load(Ordering::Acquire) > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let remaining: Vec<ConnectionId> =
            self.connections.iter().map(|entry| entry.key().clone()).collect();
        if !remaining.is_empty() {
            warn!("Force closing {} connections after timeout", remaining.len());
            for connection_id in remaining {
                self.close(&connection_id).await;
            }
        }

        self.shutdown_token.cancel();
        info!("WebSocket shutdown complete");
    }

    /// Check if shutdown is in progress
    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::Acquire)
    }

    // ==================== Background Tasks ====================

    /// Start the heartbeat checker; it stops when shutdown completes
    pub fn spawn_heartbeat_checker(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run_heartbeat_checker().await;
        })
    }

    async fn run_heartbeat_checker(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.heartbeat_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_token.cancelled() => {
                    debug!("Heartbeat checker shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.check_all_connections().await;
                }
            }
        }
    }

    async fn check_all_connections(&self) {
        let now = Instant::now();
        let mut to_timeout = Vec::new();

        for entry in self.connections.iter() {
            let connection = entry.value();
            if connection.idle_for(now) > self.client_timeout {
                debug!("Heartbeat timeout for connection: {}", entry.key());
                connection.send_event(ConnectionEvent::HeartbeatTimeout);
                to_timeout.push(entry.key().clone());
                continue;
            }
            connection.send_event(ConnectionEvent::SendPing);
        }

        for connection_id in to_timeout {
            self.close(&connection_id).await;
        }
    }
}

impl Drop for ConnectionsManager {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
        debug!("ConnectionsManager dropped");
    }
}
