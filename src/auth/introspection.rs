//! RFC 7662 token introspection collaborator.
//!
//! # Responsibilities
//! - POST the token to the introspection endpoint (form encoded)
//! - Map `active: false` to an invalid credential
//! - Map transport failures, timeouts and non-2xx answers to Unavailable
//!
//! # Design Decisions
//! - Client credentials are sent in the form body (client_secret_post)
//! - One attempt per request, bounded by `timeout_ms`

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;

use crate::auth::{AuthRejection, Authenticator, Credential, Principal};
use crate::config::IntrospectionConfig;

/// Upper bound on the introspection response we are willing to buffer.
const MAX_RESPONSE_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

pub struct IntrospectionAuthenticator {
    client: Client<HttpConnector, Body>,
    config: IntrospectionConfig,
}

impl IntrospectionAuthenticator {
    pub fn new(config: IntrospectionConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client, config }
    }

    fn form(&self, credential: &Credential) -> String {
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        form.append_pair("token", credential.token());
        form.append_pair("token_type_hint", "access_token");
        if let Some(id) = &self.config.client_id {
            form.append_pair("client_id", id);
        }
        if let Some(secret) = &self.config.client_secret {
            form.append_pair("client_secret", secret);
        }
        form.finish()
    }

    async fn introspect(&self, credential: &Credential) -> Result<IntrospectionResponse, AuthRejection> {
        let unavailable = AuthRejection::Unavailable;

        let request = Request::builder()
            .method(Method::POST)
            .uri(&self.config.url)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::ACCEPT, "application/json")
            .body(Body::from(self.form(credential)))
            .map_err(|e| unavailable(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unavailable(format!("introspection returned {}", response.status())));
        }

        let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| unavailable(format!("malformed response: {e}")))
    }
}

#[async_trait]
impl Authenticator for IntrospectionAuthenticator {
    async fn validate(&self, credential: &Credential) -> Result<Principal, AuthRejection> {
        let limit = Duration::from_millis(self.config.timeout_ms);
        let response = tokio::time::timeout(limit, self.introspect(credential))
            .await
            .map_err(|_| AuthRejection::Unavailable(format!("no answer within {limit:?}")))??;

        if !response.active {
            return Err(AuthRejection::Invalid("token is not active".to_string()));
        }
        let subject = response
            .sub
            .or(response.username)
            .ok_or_else(|| AuthRejection::Invalid("token has no subject".to_string()))?;
        Ok(Principal::new(subject, credential.clone()).with_claims(response.extra))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Form, Json, Router};
    use std::collections::HashMap;

    async fn start_introspection() -> String {
        let app = Router::new().route(
            "/introspect",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                let body = match form.get("token").map(String::as_str) {
                    Some("live") => serde_json::json!({
                        "active": true,
                        "sub": "u1",
                        "scope": "read",
                        "client": form.get("client_id"),
                    }),
                    _ => serde_json::json!({ "active": false }),
                };
                Json(body)
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/introspect")
    }

    fn authenticator(url: String) -> IntrospectionAuthenticator {
        IntrospectionAuthenticator::new(IntrospectionConfig {
            url,
            client_id: Some("gateway".into()),
            client_secret: Some("s3cret".into()),
            timeout_ms: 1_000,
        })
    }

    #[tokio::test]
    async fn active_token_becomes_principal() {
        let auth = authenticator(start_introspection().await);
        let principal = auth.validate(&Credential::Bearer("live".into())).await.unwrap();
        assert_eq!(principal.subject, "u1");
        assert_eq!(principal.claims["scope"], "read");
        assert_eq!(principal.claims["client"], "gateway");
    }

    #[tokio::test]
    async fn inactive_token_is_invalid() {
        let auth = authenticator(start_introspection().await);
        assert!(matches!(
            auth.validate(&Credential::Bearer("revoked".into())).await,
            Err(AuthRejection::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let auth = authenticator(format!("http://{addr}/introspect"));
        assert!(matches!(
            auth.validate(&Credential::Bearer("live".into())).await,
            Err(AuthRejection::Unavailable(_))
        ));
    }
}
