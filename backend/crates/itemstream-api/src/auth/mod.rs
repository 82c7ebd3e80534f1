//! Upgrade handshake authentication
//!
//! An [`IdentityProvider`] turns the HTTP upgrade request into an
//! [`Identity`]. [`admit`] applies the gate: no identity, or an identity
//! without a role on a non-public server, is refused before the socket is
//! accepted.

mod static_token;

pub use static_token::StaticTokenProvider;

use actix_web::{web, HttpRequest};
use async_trait::async_trait;
use itemstream_commons::Identity;
use log::debug;
use std::collections::HashMap;

/// Query parameters that may carry the access token
const TOKEN_PARAMS: &[&str] = &["access_token", "api_token"];

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization: {0}")]
    MissingAuthorization(String),

    #[error("Malformed authorization: {0}")]
    MalformedAuthorization(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Identity has no role on a non-public server")]
    NotPermitted,
}

/// What an identity provider sees of the upgrade request
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub token: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl Handshake {
    /// Read the token from the query string first, then from a Bearer
    /// `Authorization` header
    pub fn from_request(req: &HttpRequest) -> Result<Self, AuthError> {
        let query = web::Query::<HashMap<String, String>>::from_query(req.query_string())
            .map(web::Query::into_inner)
            .unwrap_or_default();
        let from_query = TOKEN_PARAMS
            .iter()
            .find_map(|name| query.get(*name).filter(|t| !t.is_empty()).cloned());

        let token = match from_query {
            Some(token) => Some(token),
            None => bearer_token(req)?,
        };

        Ok(Self {
            token,
            ip: req.connection_info().realip_remote_addr().map(str::to_string),
            user_agent: req
                .headers()
                .get("User-Agent")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        })
    }
}

fn bearer_token(req: &HttpRequest) -> Result<Option<String>, AuthError> {
    let Some(header) = req.headers().get("Authorization") else {
        return Ok(None);
    };
    let header = header.to_str().map_err(|_| {
        AuthError::MalformedAuthorization(
            "Authorization header contains invalid characters".to_string(),
        )
    })?;
    let Some(token) = header.strip_prefix("Bearer ") else {
        return Err(AuthError::MalformedAuthorization(
            "Only 'Authorization: Bearer <token>' is supported".to_string(),
        ));
    };
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MalformedAuthorization("Bearer token missing".to_string()));
    }
    Ok(Some(token.to_string()))
}

/// Resolves the identity of an upgrade request.
///
/// `Ok(None)` means the handshake was understood but no identity could be
/// established.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, handshake: &Handshake) -> Result<Option<Identity>, AuthError>;
}

/// Run the upgrade gate. Checked once per connection.
pub async fn admit(
    provider: &dyn IdentityProvider,
    handshake: &Handshake,
    public: bool,
) -> Result<Identity, AuthError> {
    let mut identity = provider.resolve(handshake).await?.ok_or_else(|| {
        AuthError::MissingAuthorization("no identity for handshake".to_string())
    })?;

    if !public && !identity.is_usable() {
        debug!("Refusing {} on non-public server", identity.label());
        return Err(AuthError::NotPermitted);
    }

    identity.ip = handshake.ip.clone();
    identity.user_agent = handshake.user_agent.clone();
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    struct Nobody;

    #[async_trait]
    impl IdentityProvider for Nobody {
        async fn resolve(&self, _handshake: &Handshake) -> Result<Option<Identity>, AuthError> {
            Ok(None)
        }
    }

    #[test]
    fn test_token_from_query_then_header() {
        let req = TestRequest::get().uri("/websocket?access_token=abc").to_http_request();
        assert_eq!(Handshake::from_request(&req).unwrap().token.as_deref(), Some("abc"));

        let req = TestRequest::get()
            .uri("/websocket")
            .insert_header(("Authorization", "Bearer xyz"))
            .insert_header(("User-Agent", "probe/1.0"))
            .to_http_request();
        let handshake = Handshake::from_request(&req).unwrap();
        assert_eq!(handshake.token.as_deref(), Some("xyz"));
        assert_eq!(handshake.user_agent.as_deref(), Some("probe/1.0"));

        let req = TestRequest::get().uri("/websocket").to_http_request();
        assert!(Handshake::from_request(&req).unwrap().token.is_none());
    }

    #[test]
    fn test_basic_auth_header_is_malformed() {
        let req = TestRequest::get()
            .uri("/websocket")
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert!(matches!(
            Handshake::from_request(&req),
            Err(AuthError::MalformedAuthorization(_))
        ));
    }

    #[test]
    fn test_bearer_scheme_requires_separator() {
        let req = TestRequest::get()
            .uri("/websocket")
            .insert_header(("Authorization", "Bearerxyz"))
            .to_http_request();
        assert!(matches!(
            Handshake::from_request(&req),
            Err(AuthError::MalformedAuthorization(_))
        ));
    }

    #[actix_rt::test]
    async fn test_admit_rules() {
        let handshake = Handshake {
            token: None,
            ip: Some("10.0.0.7".to_string()),
            user_agent: None,
        };
        assert!(matches!(
            admit(&Nobody, &handshake, true).await,
            Err(AuthError::MissingAuthorization(_))
        ));

        let provider = StaticTokenProvider::default();
        assert!(matches!(
            admit(&provider, &handshake, false).await,
            Err(AuthError::NotPermitted)
        ));

        let identity = admit(&provider, &handshake, true).await.unwrap();
        assert!(identity.user.is_none());
        assert_eq!(identity.ip.as_deref(), Some("10.0.0.7"));
    }
}
