//! Gateway error taxonomy.
//!
//! # Responsibilities
//! - Classify every failure a request can hit inside the gateway
//! - Map each class to exactly one HTTP status
//! - Render a gateway-generated JSON body at the server boundary
//!
//! # Design Decisions
//! - Upstream 4xx/5xx responses are NOT errors here; they are relayed verbatim
//!   and only classified as [`ErrorKind::UpstreamError`] for logs and metrics
//! - Connectivity failures are always gateway-classified (502/503/504)

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Why an upstream could not be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// TCP connect failed (refused, unreachable, DNS failure).
    Connect,
    /// The upstream did not answer within the dispatch timeout.
    Timeout,
    /// The discovery collaborator had no healthy instance for the service.
    NoHealthyInstance,
    /// The connection broke after the request was sent.
    Transport,
}

impl UnavailableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnavailableReason::Connect => "connect",
            UnavailableReason::Timeout => "timeout",
            UnavailableReason::NoHealthyInstance => "no_healthy_instance",
            UnavailableReason::Transport => "transport",
        }
    }
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while handling a request.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no route matches {method} {path}")]
    NoRouteMatch { method: String, path: String },

    #[error("authentication required: {0}")]
    AuthRejected(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("upstream {target} unavailable ({reason})")]
    UpstreamUnavailable {
        target: String,
        reason: UnavailableReason,
    },

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// The inbound request could not be read (broken or malformed body).
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal gateway fault: {0}")]
    InternalFault(String),
}

/// Coarse classification used for metrics labels and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoRouteMatch,
    AuthRejected,
    Forbidden,
    UpstreamUnavailable,
    /// Upstream answered with 4xx/5xx; relayed unchanged.
    UpstreamError,
    PayloadTooLarge,
    BadRequest,
    InternalFault,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoRouteMatch => "no_route_match",
            ErrorKind::AuthRejected => "auth_rejected",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::UpstreamError => "upstream_error",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::InternalFault => "internal_fault",
        }
    }

    /// Classify a status code the upstream returned.
    pub fn from_upstream_status(status: StatusCode) -> Option<Self> {
        if status.is_client_error() || status.is_server_error() {
            Some(ErrorKind::UpstreamError)
        } else {
            None
        }
    }
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::NoRouteMatch { .. } => ErrorKind::NoRouteMatch,
            GatewayError::AuthRejected(_) => ErrorKind::AuthRejected,
            GatewayError::Forbidden(_) => ErrorKind::Forbidden,
            GatewayError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            GatewayError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            GatewayError::BadRequest(_) => ErrorKind::BadRequest,
            GatewayError::InternalFault(_) => ErrorKind::InternalFault,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NoRouteMatch { .. } => StatusCode::NOT_FOUND,
            GatewayError::AuthRejected(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::UpstreamUnavailable { reason, .. } => match reason {
                UnavailableReason::Timeout => StatusCode::GATEWAY_TIMEOUT,
                UnavailableReason::NoHealthyInstance => StatusCode::SERVICE_UNAVAILABLE,
                UnavailableReason::Connect | UnavailableReason::Transport => {
                    StatusCode::BAD_GATEWAY
                }
            },
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::InternalFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn unavailable(target: impl Into<String>, reason: UnavailableReason) -> Self {
        GatewayError::UpstreamUnavailable {
            target: target.into(),
            reason,
        }
    }

    /// Render the error with the request id embedded in the body.
    pub fn to_response(&self, request_id: Option<&str>) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.kind().as_str(),
            message: self.to_string(),
            status: status.as_u16(),
            request_id,
        };
        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    message: String,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.to_response(None)
    }
}
