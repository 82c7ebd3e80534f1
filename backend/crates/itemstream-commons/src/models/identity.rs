use serde::{Deserialize, Serialize};

/// Identity and authorization context of a connection.
///
/// Produced once by the upgrade handshake and handed to the data gateway on
/// every read or write made on behalf of the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub app: bool,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl Identity {
    /// Anonymous identity with no user and no role
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_role(user: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            role: Some(role.into()),
            ..Self::default()
        }
    }

    pub fn admin(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            admin: true,
            ..Self::default()
        }
    }

    /// Whether this identity names a principal that may connect to a
    /// non-public server.
    pub fn is_usable(&self) -> bool {
        self.admin || self.role.as_deref().is_some_and(|r| !r.is_empty())
    }

    /// Display label used in logs
    pub fn label(&self) -> &str {
        self.user.as_deref().unwrap_or("public")
    }
}
