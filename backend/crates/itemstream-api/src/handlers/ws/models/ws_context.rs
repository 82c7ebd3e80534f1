//! WebSocket endpoint context

use itemstream_configs::WebSocketSettings;
use itemstream_core::live::ConnectionsManager;
use std::sync::Arc;

use crate::auth::IdentityProvider;

/// Shared dependencies of the upgrade endpoint and its socket tasks
pub struct WsContext {
    pub connections_manager: Arc<ConnectionsManager>,
    pub identity_provider: Arc<dyn IdentityProvider>,
    /// Whether anonymous identities may connect
    pub public: bool,
    pub max_message_size: usize,
}

impl WsContext {
    pub fn new(
        connections_manager: Arc<ConnectionsManager>,
        identity_provider: Arc<dyn IdentityProvider>,
        settings: &WebSocketSettings,
    ) -> Self {
        Self {
            connections_manager,
            identity_provider,
            public: settings.public,
            max_message_size: settings.max_message_size,
        }
    }
}
