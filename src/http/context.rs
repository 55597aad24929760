//! Per-request context threaded through matching, filters and dispatch.
//!
//! # Responsibilities
//! - Hold the inbound request head and buffered body
//! - Record the matched route (set once)
//! - Record the authentication state and principal
//! - Carry an attribute bag where every key has a single owning filter
//!
//! # Design Decisions
//! - Owned by exactly one in-flight request, never shared (no locks)
//! - Headers use `HeaderMap`: case-insensitive names, multi-valued

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{request::Parts, HeaderMap, Method, Uri};
use thiserror::Error;

use crate::auth::{AuthState, Principal};
use crate::error::GatewayError;
use crate::routing::RouteDefinition;

/// Rejected write to an attribute owned by another filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("attribute '{key}' is owned by '{owner}', write from '{writer}' rejected")]
pub struct AttributeConflict {
    pub key: String,
    pub owner: &'static str,
    pub writer: &'static str,
}

/// Filter-to-filter communication bag.
#[derive(Debug, Default)]
pub struct Attributes {
    entries: HashMap<String, (&'static str, serde_json::Value)>,
}

impl Attributes {
    /// Write `key` on behalf of `owner`. The first writer becomes the owner.
    pub fn insert(
        &mut self,
        owner: &'static str,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<(), AttributeConflict> {
        let key = key.into();
        if let Some((existing, _)) = self.entries.get(&key) {
            if *existing != owner {
                return Err(AttributeConflict {
                    key,
                    owner: existing,
                    writer: owner,
                });
            }
        }
        self.entries.insert(key, (owner, value.into()));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// State of one in-flight request.
#[derive(Debug)]
pub struct RequestContext {
    request_id: String,
    client_addr: Option<SocketAddr>,
    /// Request method as received.
    pub method: Method,
    /// Path forwarded upstream; filters may rewrite it.
    pub path: String,
    original_path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub attributes: Attributes,
    route: Option<Arc<RouteDefinition>>,
    auth_state: AuthState,
    principal: Option<Principal>,
}

impl RequestContext {
    pub fn new(method: Method, uri: &Uri, headers: HeaderMap, body: Bytes) -> Self {
        let path = if uri.path().is_empty() {
            "/".to_string()
        } else {
            uri.path().to_string()
        };
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            client_addr: None,
            method,
            original_path: path.clone(),
            path,
            query: uri.query().map(str::to_string),
            headers,
            body,
            attributes: Attributes::default(),
            route: None,
            auth_state: AuthState::Unchecked,
            principal: None,
        }
    }

    /// Build a context from a split request.
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        Self::new(parts.method, &parts.uri, parts.headers, body)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    /// Path as received, before any filter rewrote it.
    pub fn original_path(&self) -> &str {
        &self.original_path
    }

    pub fn route(&self) -> Option<&Arc<RouteDefinition>> {
        self.route.as_ref()
    }

    /// Record the matched route. A route can only be assigned once.
    pub fn set_route(&mut self, route: Arc<RouteDefinition>) -> Result<(), GatewayError> {
        if let Some(existing) = &self.route {
            return Err(GatewayError::InternalFault(format!(
                "route '{}' already assigned, refusing '{}'",
                existing.id, route.id
            )));
        }
        self.route = Some(route);
        Ok(())
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth_state
    }

    /// Move the authentication state machine forward.
    ///
    /// Returns false (and leaves the state unchanged) for illegal transitions.
    pub fn advance_auth(&mut self, next: AuthState) -> bool {
        if self.auth_state.can_transition_to(next) {
            self.auth_state = next;
            true
        } else {
            false
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Attach a validated principal and mark the request authenticated.
    pub fn attach_principal(&mut self, principal: Principal) -> bool {
        if self.advance_auth(AuthState::Authenticated) {
            self.principal = Some(principal);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credential;

    fn ctx(uri: &str) -> RequestContext {
        RequestContext::new(
            Method::GET,
            &uri.parse().unwrap(),
            HeaderMap::new(),
            Bytes::new(),
        )
    }

    #[test]
    fn splits_path_and_query() {
        let ctx = ctx("/api/users/1?expand=true");
        assert_eq!(ctx.path, "/api/users/1");
        assert_eq!(ctx.original_path(), "/api/users/1");
        assert_eq!(ctx.query.as_deref(), Some("expand=true"));
    }

    #[test]
    fn attribute_keys_have_single_writer() {
        let mut attrs = Attributes::default();
        attrs.insert("strip-prefix", "strip-prefix.previous_path", "/a/b").unwrap();
        // Owner may overwrite its own key.
        attrs.insert("strip-prefix", "strip-prefix.previous_path", "/b").unwrap();
        let err = attrs
            .insert("token-relay", "strip-prefix.previous_path", "/c")
            .unwrap_err();
        assert_eq!(err.owner, "strip-prefix");
        assert_eq!(err.writer, "token-relay");
        assert_eq!(
            attrs.get("strip-prefix.previous_path"),
            Some(&serde_json::json!("/b"))
        );
    }

    #[test]
    fn principal_requires_authenticating_state() {
        let mut ctx = ctx("/x");
        let principal = Principal::new("u1", Credential::Bearer("t".into()));
        assert!(!ctx.attach_principal(principal.clone()));
        assert!(ctx.advance_auth(AuthState::Authenticating));
        assert!(ctx.attach_principal(principal));
        assert_eq!(ctx.auth_state(), AuthState::Authenticated);
        assert_eq!(ctx.principal().unwrap().subject, "u1");
    }
}
