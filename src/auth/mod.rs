//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext headers
//!     → extract_credential (Authorization: Bearer, else session cookie)
//!     → gate.rs (public? credential present?)
//!     → Authenticator collaborator (static table or token introspection)
//!     → Principal attached to the context, or 401/403
//! ```
//!
//! # Design Decisions
//! - Token validation is delegated; the gateway never verifies signatures itself
//! - Collaborator failures fail closed (401), never open
//! - Credentials are redacted from Debug output

pub mod gate;
pub mod introspection;
pub mod static_tokens;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use thiserror::Error;

use crate::config::{AuthConfig, AuthMode};

pub use gate::AuthenticationGate;
pub use introspection::IntrospectionAuthenticator;
pub use static_tokens::StaticTokenAuthenticator;

/// A credential presented by the client.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Bearer(String),
    SessionCookie(String),
}

impl Credential {
    pub fn token(&self) -> &str {
        match self {
            Credential::Bearer(t) | Credential::SessionCookie(t) => t,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Bearer(_) => "bearer",
            Credential::SessionCookie(_) => "session_cookie",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(<redacted>)", self.kind())
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub subject: String,
    pub claims: BTreeMap<String, serde_json::Value>,
    /// The credential the principal was derived from, kept for token relay.
    pub credential: Credential,
}

impl Principal {
    pub fn new(subject: impl Into<String>, credential: Credential) -> Self {
        Self {
            subject: subject.into(),
            claims: BTreeMap::new(),
            credential,
        }
    }

    pub fn with_claims(mut self, claims: BTreeMap<String, serde_json::Value>) -> Self {
        self.claims = claims;
        self
    }
}

/// Per-request authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unchecked,
    Public,
    Authenticating,
    Authenticated,
    Rejected,
}

impl AuthState {
    pub fn can_transition_to(self, next: AuthState) -> bool {
        use AuthState::*;
        matches!(
            (self, next),
            (Unchecked, Public)
                | (Unchecked, Authenticating)
                | (Unchecked, Rejected)
                | (Authenticating, Authenticated)
                | (Authenticating, Rejected)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthRejection {
    #[error("invalid credential: {0}")]
    Invalid(String),
    #[error("access denied: {0}")]
    Forbidden(String),
    #[error("authorization service unavailable: {0}")]
    Unavailable(String),
}

/// External authorization collaborator.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn validate(&self, credential: &Credential) -> Result<Principal, AuthRejection>;
}

/// Pull a credential from the request: bearer token first, then the session cookie.
pub fn extract_credential(headers: &HeaderMap, cookie_name: &str) -> Option<Credential> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(Credential::Bearer(token.to_string()));
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| Credential::SessionCookie(value.to_string()))
}

/// Build the configured collaborator.
pub fn authenticator_from_config(config: &AuthConfig) -> Arc<dyn Authenticator> {
    match (&config.mode, &config.introspection) {
        (AuthMode::Introspection, Some(introspection)) => {
            Arc::new(IntrospectionAuthenticator::new(introspection.clone()))
        }
        _ => Arc::new(StaticTokenAuthenticator::from_config(&config.tokens)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let h = headers(&[("authorization", "Bearer abc"), ("cookie", "SESSION=xyz")]);
        assert_eq!(extract_credential(&h, "SESSION"), Some(Credential::Bearer("abc".into())));
    }

    #[test]
    fn session_cookie_fallback() {
        let h = headers(&[("cookie", "theme=dark; SESSION=xyz")]);
        assert_eq!(
            extract_credential(&h, "SESSION"),
            Some(Credential::SessionCookie("xyz".into()))
        );
        assert_eq!(extract_credential(&h, "OTHER"), None);
    }

    #[test]
    fn non_bearer_schemes_are_ignored() {
        let h = headers(&[("authorization", "Basic dXNlcjpwYXNz")]);
        assert_eq!(extract_credential(&h, "SESSION"), None);
        let h = headers(&[("authorization", "Bearer ")]);
        assert_eq!(extract_credential(&h, "SESSION"), None);
    }

    #[test]
    fn state_machine_transitions() {
        use AuthState::*;
        assert!(Unchecked.can_transition_to(Public));
        assert!(Unchecked.can_transition_to(Authenticating));
        assert!(Authenticating.can_transition_to(Authenticated));
        assert!(!Unchecked.can_transition_to(Authenticated));
        assert!(!Public.can_transition_to(Authenticating));
        assert!(!Rejected.can_transition_to(Authenticated));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let debug = format!("{:?}", Credential::Bearer("secret-token".into()));
        assert!(!debug.contains("secret-token"));
    }
}
