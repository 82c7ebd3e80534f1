// Default value functions

pub fn default_host() -> String {
    "127.0.0.1".to_string()
}

pub fn default_port() -> u16 {
    8055
}

pub fn default_workers() -> usize {
    0 // 0 = one worker per CPU core
}

pub fn default_true() -> bool {
    true
}

pub fn default_ws_path() -> String {
    "/websocket".to_string()
}

pub fn default_max_message_size() -> usize {
    1048576 // 1MB
}

pub fn default_outbound_buffer() -> usize {
    256
}

pub fn default_max_connections() -> usize {
    10_000
}

pub fn default_heartbeat_interval_secs() -> u64 {
    5
}

pub fn default_client_timeout_secs() -> u64 {
    30
}

pub fn default_shutdown_timeout_secs() -> u64 {
    5
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_logs_path() -> String {
    "./logs".to_string()
}

pub fn default_log_format() -> String {
    "compact".to_string()
}

pub fn default_primary_key() -> String {
    "id".to_string()
}

/// Event namespaces always bridged to subscribers
pub fn default_event_namespaces() -> Vec<String> {
    vec!["items".to_string()]
}

/// Host namespaces added when `events.system` is enabled
pub const SYSTEM_EVENT_NAMESPACES: [&str; 12] = [
    "activity",
    "collections",
    "fields",
    "folders",
    "permissions",
    "presets",
    "relations",
    "revisions",
    "roles",
    "settings",
    "users",
    "webhooks",
];
