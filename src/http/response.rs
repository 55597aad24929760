//! Gateway-generated responses.
//!
//! # Design Decisions
//! - Every gateway error becomes a JSON body carrying the request id
//! - The ErrorKind is attached as a response extension so the server can label
//!   metrics without re-parsing the body
//! - Upstream responses never pass through here; they are relayed as received

use axum::body::Body;
use axum::http::Response;

use crate::error::GatewayError;

pub fn error_response(request_id: Option<&str>, err: &GatewayError) -> Response<Body> {
    let status = err.status();
    if status.is_server_error() {
        tracing::warn!(request_id = request_id.unwrap_or("-"), status = status.as_u16(), error = %err, "Gateway error");
    } else {
        tracing::debug!(request_id = request_id.unwrap_or("-"), status = status.as_u16(), error = %err, "Gateway rejection");
    }
    let mut response = err.to_response(request_id);
    response.extensions_mut().insert(err.kind());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, UnavailableReason};
    use axum::http::{header, StatusCode};

    #[tokio::test]
    async fn json_body_with_request_id() {
        let err = GatewayError::unavailable("lb://users", UnavailableReason::Timeout);
        let response = error_response(Some("req-7"), &err);
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(response.extensions().get::<ErrorKind>(), Some(&ErrorKind::UpstreamUnavailable));
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "upstream_unavailable");
        assert_eq!(json["status"], 504);
        assert_eq!(json["request_id"], "req-7");
    }
}
