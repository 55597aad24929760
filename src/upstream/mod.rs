//! Upstream dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext (after request-phase filters)
//!     → UpstreamTarget (static URL, or service name for the discovery collaborator)
//!     → headers.rs (hop-by-hop removal, identity + forwarding headers)
//!     → dispatcher.rs (bounded call, retry on connect failure, classification)
//!     → upstream response relayed verbatim, or a classified GatewayError
//! ```

pub mod dispatcher;
pub mod headers;

use std::fmt;

use thiserror::Error;
use url::Url;

use crate::config::{TargetConfig, TargetTable};

pub use dispatcher::{build_client, Dispatcher};
pub use headers::IdentityHeaders;

/// Scheme marking a discovered target in string form: `lb://user-service`.
pub const DISCOVERY_SCHEME: &str = "lb";

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("invalid target URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported scheme '{0}', expected http or lb")]
    UnsupportedScheme(String),
    #[error("target '{0}' has no host")]
    MissingHost(String),
    #[error("target '{0}' must not carry a query or fragment")]
    UnexpectedQuery(String),
    #[error("discovered target has an empty service name")]
    EmptyService,
}

/// Where a route sends its traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamTarget {
    /// Fixed `http://host:port[/base]`.
    Static(Url),
    /// Logical service name resolved per request.
    Discovered(String),
}

impl UpstreamTarget {
    pub fn from_config(config: &TargetConfig) -> Result<Self, TargetError> {
        match config {
            TargetConfig::Uri(raw) => Self::parse(raw),
            TargetConfig::Table(TargetTable::Static(raw)) => Self::parse_static(raw),
            TargetConfig::Table(TargetTable::Discover(service)) => Self::discovered(service),
        }
    }

    /// Parse the string form: `http://...` or `lb://service`.
    pub fn parse(raw: &str) -> Result<Self, TargetError> {
        match raw.split_once("://") {
            Some((scheme, service)) if scheme.eq_ignore_ascii_case(DISCOVERY_SCHEME) => {
                Self::discovered(service.trim_end_matches('/'))
            }
            _ => Self::parse_static(raw),
        }
    }

    fn parse_static(raw: &str) -> Result<Self, TargetError> {
        let url = Url::parse(raw).map_err(|source| TargetError::InvalidUrl {
            url: raw.to_string(),
            source,
        })?;
        if url.scheme() != "http" {
            return Err(TargetError::UnsupportedScheme(url.scheme().to_string()));
        }
        if url.host_str().is_none() {
            return Err(TargetError::MissingHost(raw.to_string()));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(TargetError::UnexpectedQuery(raw.to_string()));
        }
        Ok(UpstreamTarget::Static(url))
    }

    fn discovered(service: &str) -> Result<Self, TargetError> {
        let service = service.trim();
        if service.is_empty() {
            return Err(TargetError::EmptyService);
        }
        Ok(UpstreamTarget::Discovered(service.to_string()))
    }

    pub fn service(&self) -> Option<&str> {
        match self {
            UpstreamTarget::Discovered(name) => Some(name),
            UpstreamTarget::Static(_) => None,
        }
    }
}

impl fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamTarget::Static(url) => f.write_str(url.as_str().trim_end_matches('/')),
            UpstreamTarget::Discovered(name) => write!(f, "{DISCOVERY_SCHEME}://{name}"),
        }
    }
}

/// Join a base (`http://host:port[/base]`, no trailing slash) with a request path and query.
pub fn upstream_uri(base: &str, path: &str, query: Option<&str>) -> String {
    let mut uri = String::with_capacity(base.len() + path.len() + query.map_or(0, |q| q.len() + 1));
    uri.push_str(base.trim_end_matches('/'));
    if !path.starts_with('/') {
        uri.push('/');
    }
    uri.push_str(path);
    if let Some(query) = query {
        uri.push('?');
        uri.push_str(query);
    }
    uri
}
