//! Request identification.
//!
//! # Design Decisions
//! - Request ID assigned as early as possible (outermost layer) for tracing
//! - A client-supplied `x-request-id` is kept; otherwise a UUID v4 is generated
//! - The same id is echoed on the response and forwarded upstream

use axum::http::{HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request ids for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Read the request id a layer (or the client) put on the request.
pub fn request_id_of<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
