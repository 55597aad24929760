//! Filter subsystem.
//!
//! # Data Flow
//! ```text
//! Request phase (declared order):
//!     authentication gate → filter 1 → filter 2 → ... → dispatcher
//! Response phase (reverse order, only filters that continued):
//!     client ← filter 1 ← filter 2 ← ... ← upstream response
//! ```
//!
//! # Design Decisions
//! - A filter may observe/mutate the request, short-circuit with its own
//!   response, or fail; ShortCircuit and Fail stop the request phase
//! - Panics inside filters are contained and become 500s
//! - Filters are referenced by name in route config and built at startup

pub mod builtin;
pub mod chain;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Response};
use thiserror::Error;

use crate::error::GatewayError;
use crate::http::context::RequestContext;

pub use chain::{Dispatch, FilterChain, PreFilterOutcome};

/// Result of a filter's request phase.
#[derive(Debug)]
pub enum FilterOutcome {
    /// Proceed to the next filter, or to dispatch.
    Continue,
    /// Stop and answer with this response.
    ShortCircuit(Response<Body>),
    /// Abort with a classified error.
    Fail(GatewayError),
}

impl FilterOutcome {
    pub fn is_continue(&self) -> bool {
        matches!(self, FilterOutcome::Continue)
    }
}

/// A request/response transformer in a route's chain.
#[async_trait]
pub trait Filter: Send + Sync + fmt::Debug {
    /// Stable name, also used as the owner of attributes the filter writes.
    fn name(&self) -> &'static str;

    async fn on_request(&self, _ctx: &mut RequestContext) -> FilterOutcome {
        FilterOutcome::Continue
    }

    async fn on_response(
        &self,
        _ctx: &RequestContext,
        _response: &mut Response<Body>,
    ) -> Result<(), GatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterSpecError {
    #[error("unknown filter '{0}'")]
    Unknown(String),
    #[error("filter '{0}' requires an argument")]
    MissingArgument(String),
    #[error("filter '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },
}

/// A parsed filter reference from route config.
///
/// Written as `name` or `name=args`. Names are matched ignoring case and
/// dashes, so `StripPrefix=1` and `strip-prefix=1` are the same filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSpec {
    StripPrefix(usize),
    PrefixPath(String),
    RewritePrefix { from: String, to: String },
    AddRequestHeader(HeaderName, HeaderValue),
    RemoveRequestHeader(HeaderName),
    AddResponseHeader(HeaderName, HeaderValue),
    RemoveResponseHeader(HeaderName),
    TokenRelay,
    SetRequestBearer(String),
}

impl FromStr for FilterSpec {
    type Err = FilterSpecError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match raw.split_once('=') {
            Some((n, a)) => (n.trim(), Some(a.trim())),
            None => (raw.trim(), None),
        };
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        let require = |arg: Option<&str>| -> Result<String, FilterSpecError> {
            match arg {
                Some(a) if !a.is_empty() => Ok(a.to_string()),
                _ => Err(FilterSpecError::MissingArgument(name.to_string())),
            }
        };
        let invalid = |reason: String| FilterSpecError::InvalidArgument {
            name: name.to_string(),
            reason,
        };

        match normalized.as_str() {
            "stripprefix" => {
                let n = require(arg)?
                    .parse::<usize>()
                    .map_err(|_| invalid("expected a segment count".into()))?;
                Ok(FilterSpec::StripPrefix(n))
            }
            "prefixpath" => Ok(FilterSpec::PrefixPath(absolute_path(&require(arg)?).map_err(invalid)?)),
            "rewriteprefix" => {
                let arg = require(arg)?;
                let (from, to) = arg
                    .split_once(',')
                    .ok_or_else(|| invalid("expected '/from,/to'".into()))?;
                Ok(FilterSpec::RewritePrefix {
                    from: absolute_path(from.trim()).map_err(invalid)?,
                    to: absolute_path(to.trim()).map_err(invalid)?,
                })
            }
            "addrequestheader" => {
                let (n, v) = header_pair(&require(arg)?).map_err(invalid)?;
                Ok(FilterSpec::AddRequestHeader(n, v))
            }
            "removerequestheader" => {
                Ok(FilterSpec::RemoveRequestHeader(header_name(&require(arg)?).map_err(invalid)?))
            }
            "addresponseheader" => {
                let (n, v) = header_pair(&require(arg)?).map_err(invalid)?;
                Ok(FilterSpec::AddResponseHeader(n, v))
            }
            "removeresponseheader" => {
                Ok(FilterSpec::RemoveResponseHeader(header_name(&require(arg)?).map_err(invalid)?))
            }
            "tokenrelay" => Ok(FilterSpec::TokenRelay),
            "setrequestbearer" => {
                let token = require(arg)?;
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| invalid("token is not a valid header value".into()))?;
                Ok(FilterSpec::SetRequestBearer(token))
            }
            _ => Err(FilterSpecError::Unknown(name.to_string())),
        }
    }
}

fn absolute_path(p: &str) -> Result<String, String> {
    if p.starts_with('/') {
        Ok(p.trim_end_matches('/').to_string())
    } else {
        Err(format!("path '{p}' must start with '/'"))
    }
}

fn header_name(raw: &str) -> Result<HeaderName, String> {
    HeaderName::from_bytes(raw.trim().as_bytes()).map_err(|_| format!("'{raw}' is not a header name"))
}

fn header_pair(raw: &str) -> Result<(HeaderName, HeaderValue), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name:Value', got '{raw}'"))?;
    let value = HeaderValue::from_str(value.trim()).map_err(|_| format!("'{value}' is not a header value"))?;
    Ok((header_name(name)?, value))
}
