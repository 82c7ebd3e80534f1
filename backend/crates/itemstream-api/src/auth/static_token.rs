use async_trait::async_trait;
use itemstream_commons::Identity;
use itemstream_configs::AuthSettings;
use log::{debug, warn};
use std::collections::HashMap;

use super::{AuthError, Handshake, IdentityProvider};

/// Identity provider backed by the `[[auth.tokens]]` table.
///
/// A handshake without a token resolves to the anonymous identity; an
/// unknown token is rejected.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenProvider {
    pub fn from_settings(settings: &AuthSettings) -> Self {
        let mut tokens = HashMap::with_capacity(settings.tokens.len());
        for entry in &settings.tokens {
            let identity = Identity {
                user: Some(entry.user.clone()),
                role: entry.role.clone(),
                admin: entry.admin,
                ..Identity::default()
            };
            if tokens.insert(entry.token.clone(), identity).is_some() {
                warn!("Token for '{}' shadows an earlier entry", entry.user);
            }
        }
        debug!("Loaded {} static API tokens", tokens.len());
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn resolve(&self, handshake: &Handshake) -> Result<Option<Identity>, AuthError> {
        match handshake.token.as_deref() {
            None => Ok(Some(Identity::anonymous())),
            Some(token) => self.tokens.get(token).cloned().map(Some).ok_or(AuthError::InvalidToken),
        }
    }
}
