//! Outbound header hygiene.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Strip client-supplied identity headers; set them from the principal
//! - Add X-Forwarded-* headers
//!
//! # Design Decisions
//! - Identity headers are a trust boundary: the client never controls them

use std::net::SocketAddr;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::auth::Principal;
use crate::config::ForwardingConfig;

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Remove hop-by-hop headers, including any the Connection header names.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Gateway-owned identity headers.
#[derive(Debug, Clone)]
pub struct IdentityHeaders {
    principal: HeaderName,
    claims: HeaderName,
    extra: Vec<HeaderName>,
}

impl IdentityHeaders {
    pub fn new(principal: HeaderName, claims: HeaderName, extra: Vec<HeaderName>) -> Self {
        Self {
            principal,
            claims,
            extra,
        }
    }

    pub fn from_config(config: &ForwardingConfig) -> Result<Self, header::InvalidHeaderName> {
        let parse = |raw: &str| HeaderName::from_bytes(raw.trim().as_bytes());
        Ok(Self::new(
            parse(&config.principal_header)?,
            parse(&config.claims_header)?,
            config
                .strip_headers
                .iter()
                .map(|h| parse(h))
                .collect::<Result<_, _>>()?,
        ))
    }

    /// Drop every identity header the client sent.
    pub fn sanitize(&self, headers: &mut HeaderMap) {
        headers.remove(&self.principal);
        headers.remove(&self.claims);
        for name in &self.extra {
            headers.remove(name);
        }
    }

    /// Set identity headers from the authenticated principal.
    pub fn apply(&self, headers: &mut HeaderMap, principal: &Principal) {
        match HeaderValue::from_str(&principal.subject) {
            Ok(value) => {
                headers.insert(self.principal.clone(), value);
            }
            Err(_) => tracing::warn!(
                header = %self.principal,
                "Principal subject is not a valid header value, not forwarded"
            ),
        }
        if principal.claims.is_empty() {
            return;
        }
        let claims = serde_json::to_string(&principal.claims)
            .ok()
            .and_then(|json| HeaderValue::from_str(&json).ok());
        if let Some(value) = claims {
            headers.insert(self.claims.clone(), value);
        }
    }
}

/// Append the client to X-Forwarded-For and set X-Forwarded-Proto / -Host.
pub fn add_forwarded(headers: &mut HeaderMap, client: Option<SocketAddr>, proto: &'static str) {
    if let Some(client) = client {
        let ip = client.ip().to_string();
        let chain = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.trim().is_empty() => format!("{}, {ip}", existing.trim()),
            _ => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(proto));
    if let Some(host) = headers.get(header::HOST).cloned() {
        headers.insert(X_FORWARDED_HOST, host);
    }
}
