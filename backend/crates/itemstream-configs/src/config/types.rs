use super::defaults::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub websocket: WebSocketSettings,
    #[serde(default)]
    pub handlers: HandlerSettings,
    #[serde(default)]
    pub subscriptions: SubscriptionSettings,
    #[serde(default)]
    pub events: EventSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub store: StoreSettings,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of actix workers (0 = number of CPU cores)
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
        }
    }
}

/// WebSocket endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketSettings {
    /// Accept connections whose identity carries no role
    #[serde(default)]
    pub public: bool,
    /// Upgrade endpoint path
    #[serde(default = "default_ws_path")]
    pub path: String,
    /// Largest accepted inbound text frame in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before new frames are dropped
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Connections silent for longer than this are closed
    #[serde(default = "default_client_timeout_secs")]
    pub client_timeout_secs: u64,
    /// Grace period for open connections during shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            public: false,
            path: default_ws_path(),
            max_message_size: default_max_message_size(),
            outbound_buffer: default_outbound_buffer(),
            max_connections: default_max_connections(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            client_timeout_secs: default_client_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

/// Per-verb enable flags. A disabled verb never joins the handler chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerSettings {
    #[serde(default = "default_true")]
    pub get: bool,
    #[serde(default = "default_true")]
    pub post: bool,
    #[serde(default = "default_true")]
    pub patch: bool,
    #[serde(default = "default_true")]
    pub delete: bool,
    #[serde(default = "default_true")]
    pub subscribe: bool,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            get: true,
            post: true,
            patch: true,
            delete: true,
            subscribe: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionSettings {
    /// Collections every new connection is subscribed to on connect
    #[serde(default)]
    pub auto_collections: Vec<String>,
}

/// Which host mutation-event namespaces reach subscribers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventSettings {
    /// Also bridge the host's system namespaces (users, roles, ...)
    #[serde(default)]
    pub system: bool,
    /// Extra namespaces on top of `items`
    #[serde(default)]
    pub namespaces: Vec<String>,
}

impl EventSettings {
    /// Full namespace scope: `items`, system namespaces if enabled, then extras
    pub fn scope(&self) -> Vec<String> {
        let mut scope = default_event_namespaces();
        if self.system {
            scope.extend(SYSTEM_EVENT_NAMESPACES.iter().map(|s| s.to_string()));
        }
        for ns in &self.namespaces {
            if !scope.contains(ns) {
                scope.push(ns.clone());
            }
        }
        scope
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
    #[serde(default = "default_true")]
    pub log_to_console: bool,
    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Per-target level overrides, e.g. `itemstream_core = "debug"`
    #[serde(default)]
    pub targets: HashMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            logs_path: default_logs_path(),
            log_to_console: true,
            format: default_log_format(),
            targets: HashMap::new(),
        }
    }
}

/// Static API token accepted at upgrade time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSettings {
    pub token: String,
    pub user: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub tokens: Vec<TokenSettings>,
}

/// Collection served by the built-in in-memory store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSettings {
    pub name: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Roles allowed to read. Admins always may.
    #[serde(default)]
    pub read_roles: Vec<String>,
    /// Roles allowed to create, update and delete
    #[serde(default)]
    pub write_roles: Vec<String>,
    /// Connections without a role may read
    #[serde(default)]
    pub public_read: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub collections: Vec<CollectionSettings>,
}
