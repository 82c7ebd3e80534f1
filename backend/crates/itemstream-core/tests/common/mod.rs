#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use itemstream_commons::{Identity, Query, Schema};
use itemstream_configs::{CollectionSettings, ServerConfig};
use itemstream_core::gateway::{DataGateway, GatewayError, MemoryGateway};
use itemstream_core::live::{
    ConnectionRegistration, ConnectionsManager, HandlerChain, MutationBridge, SubscriptionRegistry,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;

/// Gateway wrapper counting every data call (schema lookups excluded)
pub struct CountingGateway {
    pub inner: Arc<MemoryGateway>,
    calls: AtomicUsize,
    held_read: Mutex<Option<ReadGate>>,
}

/// Pauses one `read_by_query` until released
#[derive(Clone, Default)]
pub struct ReadGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl CountingGateway {
    pub fn new(inner: Arc<MemoryGateway>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            held_read: Mutex::new(None),
        }
    }

    /// Hold the next `read_by_query` until `release` is notified
    pub fn hold_next_read(&self) -> ReadGate {
        let gate = ReadGate::default();
        *self.held_read.lock() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataGateway for CountingGateway {
    async fn schema(&self) -> Result<Schema, GatewayError> {
        self.inner.schema().await
    }

    async fn read_by_query(
        &self,
        collection: &str,
        query: &Query,
        identity: &Identity,
    ) -> Result<Vec<Value>, GatewayError> {
        self.count();
        let gate = self.held_read.lock().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.inner.read_by_query(collection, query, identity).await
    }

    async fn read_one(
        &self,
        collection: &str,
        key: &Value,
        query: &Query,
        identity: &Identity,
    ) -> Result<Value, GatewayError> {
        self.count();
        self.inner.read_one(collection, key, query, identity).await
    }

    async fn read_many(
        &self,
        collection: &str,
        keys: &[Value],
        query: &Query,
        identity: &Identity,
    ) -> Result<Vec<Value>, GatewayError> {
        self.count();
        self.inner.read_many(collection, keys, query, identity).await
    }

    async fn create_one(
        &self,
        collection: &str,
        data: &Value,
        identity: &Identity,
    ) -> Result<Value, GatewayError> {
        self.count();
        self.inner.create_one(collection, data, identity).await
    }

    async fn create_many(
        &self,
        collection: &str,
        data: &[Value],
        identity: &Identity,
    ) -> Result<Vec<Value>, GatewayError> {
        self.count();
        self.inner.create_many(collection, data, identity).await
    }

    async fn update_one(
        &self,
        collection: &str,
        key: &Value,
        data: &Value,
        identity: &Identity,
    ) -> Result<Value, GatewayError> {
        self.count();
        self.inner.update_one(collection, key, data, identity).await
    }

    async fn update_many(
        &self,
        collection: &str,
        keys: &[Value],
        data: &Value,
        identity: &Identity,
    ) -> Result<Vec<Value>, GatewayError> {
        self.count();
        self.inner.update_many(collection, keys, data, identity).await
    }

    async fn delete_one(
        &self,
        collection: &str,
        key: &Value,
        identity: &Identity,
    ) -> Result<Value, GatewayError> {
        self.count();
        self.inner.delete_one(collection, key, identity).await
    }

    async fn delete_many(
        &self,
        collection: &str,
        keys: &[Value],
        identity: &Identity,
    ) -> Result<Vec<Value>, GatewayError> {
        self.count();
        self.inner.delete_many(collection, keys, identity).await
    }
}

/// `articles` readable by viewers and editors, writable by editors;
/// `authors` readable by anyone
pub fn collections() -> Vec<CollectionSettings> {
    vec![
        CollectionSettings {
            name: "articles".to_string(),
            primary_key: "id".to_string(),
            read_roles: vec!["viewer".to_string()],
            write_roles: vec!["editor".to_string()],
            public_read: false,
        },
        CollectionSettings {
            name: "authors".to_string(),
            primary_key: "id".to_string(),
            read_roles: vec![],
            write_roles: vec!["editor".to_string()],
            public_read: true,
        },
    ]
}

pub struct TestServer {
    pub memory: Arc<MemoryGateway>,
    pub gateway: Arc<CountingGateway>,
    pub registry: Arc<SubscriptionRegistry>,
    pub manager: Arc<ConnectionsManager>,
    pub bridge: Arc<MutationBridge>,
}

impl TestServer {
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_memory(config, MemoryGateway::from_settings(&collections()))
    }

    pub fn with_memory(config: &ServerConfig, memory: MemoryGateway) -> Self {
        let memory = Arc::new(memory);
        let gateway = Arc::new(CountingGateway::new(Arc::clone(&memory)));
        let dyn_gateway: Arc<dyn DataGateway> = gateway.clone();
        let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&dyn_gateway)));
        let manager = ConnectionsManager::new(
            &config.websocket,
            HandlerChain::from_config(config),
            dyn_gateway,
            Arc::clone(&registry),
        );
        let bridge = Arc::new(MutationBridge::new(Arc::clone(&registry), &config.events));
        Self {
            memory,
            gateway,
            registry,
            manager,
            bridge,
        }
    }

    /// Seed `articles` with ids 1..=3
    pub async fn seed_articles(&self) {
        let admin = Identity::admin("root");
        self.memory
            .create_many(
                "articles",
                &[
                    json!({"title": "First", "status": "published"}),
                    json!({"title": "Second", "status": "draft"}),
                    json!({"title": "Third", "status": "published"}),
                ],
                &admin,
            )
            .await
            .expect("seed articles");
    }

    pub async fn connect(&self, identity: Identity) -> TestClient {
        let registration =
            self.manager.register_connection(identity).expect("connection admitted");
        self.manager.connected(&registration.connection).await;
        TestClient {
            registration,
            manager: Arc::clone(&self.manager),
        }
    }
}

pub struct TestClient {
    pub registration: ConnectionRegistration,
    manager: Arc<ConnectionsManager>,
}

impl TestClient {
    pub async fn send(&self, frame: Value) {
        self.manager.handle_frame(&self.registration.connection, &frame.to_string()).await;
    }

    /// Send a frame and return the next frame received
    pub async fn request(&mut self, frame: Value) -> Value {
        self.send(frame).await;
        self.recv().await
    }

    pub async fn recv(&mut self) -> Value {
        let raw = tokio::time::timeout(Duration::from_secs(2), self.registration.outbound_rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("outbound channel closed");
        serde_json::from_str(&raw).expect("frame is JSON")
    }

    /// Assert no frame is queued
    pub fn assert_silent(&mut self) {
        assert!(
            self.registration.outbound_rx.try_recv().is_err(),
            "expected no pending frame"
        );
    }

    pub fn id(&self) -> &itemstream_commons::ConnectionId {
        self.registration.connection.id()
    }
}
