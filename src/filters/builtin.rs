//! Built-in filters referenced by name from route config.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Response};

use crate::error::GatewayError;
use crate::filters::{Filter, FilterOutcome, FilterSpec};
use crate::http::context::RequestContext;

impl FilterSpec {
    pub fn build(&self) -> Arc<dyn Filter> {
        match self.clone() {
            FilterSpec::StripPrefix(parts) => Arc::new(StripPrefix { parts }),
            FilterSpec::PrefixPath(prefix) => Arc::new(PrefixPath { prefix }),
            FilterSpec::RewritePrefix { from, to } => Arc::new(RewritePrefix { from, to }),
            FilterSpec::AddRequestHeader(name, value) => Arc::new(AddRequestHeader { name, value }),
            FilterSpec::RemoveRequestHeader(name) => Arc::new(RemoveRequestHeader { name }),
            FilterSpec::AddResponseHeader(name, value) => Arc::new(AddResponseHeader { name, value }),
            FilterSpec::RemoveResponseHeader(name) => Arc::new(RemoveResponseHeader { name }),
            FilterSpec::TokenRelay => Arc::new(TokenRelay),
            FilterSpec::SetRequestBearer(token) => Arc::new(SetRequestBearer { token }),
        }
    }
}

/// Replace `ctx.path`, recording the previous value under `<owner>.previous_path`.
fn rewrite_path(owner: &'static str, ctx: &mut RequestContext, next: String) -> FilterOutcome {
    let key = format!("{owner}.previous_path");
    if let Err(conflict) = ctx.attributes.insert(owner, key, ctx.path.clone()) {
        return FilterOutcome::Fail(GatewayError::InternalFault(conflict.to_string()));
    }
    ctx.path = next;
    FilterOutcome::Continue
}

/// Drops the first N path segments: `/api/users/1` with N=1 becomes `/users/1`.
#[derive(Debug)]
pub struct StripPrefix {
    parts: usize,
}

#[async_trait]
impl Filter for StripPrefix {
    fn name(&self) -> &'static str {
        "strip-prefix"
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterOutcome {
        let rest: Vec<&str> = ctx
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .skip(self.parts)
            .collect();
        let mut next = format!("/{}", rest.join("/"));
        if ctx.path.ends_with('/') && next.len() > 1 {
            next.push('/');
        }
        rewrite_path(self.name(), ctx, next)
    }
}

#[derive(Debug)]
pub struct PrefixPath {
    prefix: String,
}

#[async_trait]
impl Filter for PrefixPath {
    fn name(&self) -> &'static str {
        "prefix-path"
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterOutcome {
        let next = format!("{}{}", self.prefix, ctx.path);
        rewrite_path(self.name(), ctx, next)
    }
}

/// Replaces a leading path prefix on a segment boundary.
///
/// `/api/auth` → `/api/users` rewrites `/api/auth/login` but not `/api/authz`.
#[derive(Debug)]
pub struct RewritePrefix {
    from: String,
    to: String,
}

impl RewritePrefix {
    fn rewrite(&self, path: &str) -> Option<String> {
        let rest = path.strip_prefix(&self.from)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        let next = format!("{}{}", self.to, rest);
        Some(if next.is_empty() { "/".to_string() } else { next })
    }
}

#[async_trait]
impl Filter for RewritePrefix {
    fn name(&self) -> &'static str {
        "rewrite-prefix"
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterOutcome {
        match self.rewrite(&ctx.path) {
            Some(next) => rewrite_path(self.name(), ctx, next),
            None => FilterOutcome::Continue,
        }
    }
}

#[derive(Debug)]
pub struct AddRequestHeader {
    name: HeaderName,
    value: HeaderValue,
}

#[async_trait]
impl Filter for AddRequestHeader {
    fn name(&self) -> &'static str {
        "add-request-header"
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterOutcome {
        ctx.headers.append(self.name.clone(), self.value.clone());
        FilterOutcome::Continue
    }
}

#[derive(Debug)]
pub struct RemoveRequestHeader {
    name: HeaderName,
}

#[async_trait]
impl Filter for RemoveRequestHeader {
    fn name(&self) -> &'static str {
        "remove-request-header"
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterOutcome {
        ctx.headers.remove(&self.name);
        FilterOutcome::Continue
    }
}

#[derive(Debug)]
pub struct AddResponseHeader {
    name: HeaderName,
    value: HeaderValue,
}

#[async_trait]
impl Filter for AddResponseHeader {
    fn name(&self) -> &'static str {
        "add-response-header"
    }

    async fn on_response(
        &self,
        _ctx: &RequestContext,
        response: &mut Response<Body>,
    ) -> Result<(), GatewayError> {
        response.headers_mut().append(self.name.clone(), self.value.clone());
        Ok(())
    }
}

#[derive(Debug)]
pub struct RemoveResponseHeader {
    name: HeaderName,
}

#[async_trait]
impl Filter for RemoveResponseHeader {
    fn name(&self) -> &'static str {
        "remove-response-header"
    }

    async fn on_response(
        &self,
        _ctx: &RequestContext,
        response: &mut Response<Body>,
    ) -> Result<(), GatewayError> {
        response.headers_mut().remove(&self.name);
        Ok(())
    }
}

/// Forwards the authenticated caller's credential as a bearer token.
///
/// Without a principal (public route, no credential) the request is left as is.
#[derive(Debug)]
pub struct TokenRelay;

#[async_trait]
impl Filter for TokenRelay {
    fn name(&self) -> &'static str {
        "token-relay"
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterOutcome {
        let Some(principal) = ctx.principal() else {
            return FilterOutcome::Continue;
        };
        match HeaderValue::from_str(&format!("Bearer {}", principal.credential.token())) {
            Ok(value) => {
                ctx.headers.insert(header::AUTHORIZATION, value);
                FilterOutcome::Continue
            }
            Err(_) => FilterOutcome::Fail(GatewayError::InternalFault(
                "credential is not a valid header value".to_string(),
            )),
        }
    }
}

/// Replaces the Authorization header with a fixed service token.
#[derive(Debug)]
pub struct SetRequestBearer {
    token: String,
}

#[async_trait]
impl Filter for SetRequestBearer {
    fn name(&self) -> &'static str {
        "set-request-bearer"
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterOutcome {
        match HeaderValue::from_str(&format!("Bearer {}", self.token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                ctx.headers.insert(header::AUTHORIZATION, value);
                FilterOutcome::Continue
            }
            Err(_) => FilterOutcome::Fail(GatewayError::InternalFault(
                "service token is not a valid header value".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthState, Credential, Principal};
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Method};

    fn ctx(path: &str) -> RequestContext {
        RequestContext::new(Method::GET, &path.parse().unwrap(), HeaderMap::new(), Bytes::new())
    }

    async fn run(spec: &str, ctx: &mut RequestContext) -> FilterOutcome {
        spec.parse::<FilterSpec>().unwrap().build().on_request(ctx).await
    }

    #[tokio::test]
    async fn strip_prefix_drops_leading_segments() {
        let mut request = ctx("/api/users/1");
        assert!(run("strip-prefix=1", &mut request).await.is_continue());
        assert_eq!(request.path, "/users/1");
        assert_eq!(
            request.attributes.get("strip-prefix.previous_path"),
            Some(&serde_json::json!("/api/users/1"))
        );

        let mut request = ctx("/api");
        run("strip-prefix=3", &mut request).await;
        assert_eq!(request.path, "/");
    }

    #[tokio::test]
    async fn attribute_conflict_leaves_path_untouched() {
        let mut request = ctx("/api/users/1");
        request
            .attributes
            .insert("token-relay", "strip-prefix.previous_path", "/elsewhere")
            .unwrap();

        let outcome = run("strip-prefix=1", &mut request).await;
        assert!(matches!(outcome, FilterOutcome::Fail(GatewayError::InternalFault(_))));
        assert_eq!(request.path, "/api/users/1");
        assert_eq!(
            request.attributes.get("strip-prefix.previous_path"),
            Some(&serde_json::json!("/elsewhere"))
        );
    }

    #[tokio::test]
    async fn rewrite_prefix_respects_segment_boundaries() {
        let mut request = ctx("/api/auth/register");
        run("rewrite-prefix=/api/auth,/api/users", &mut request).await;
        assert_eq!(request.path, "/api/users/register");
        assert_eq!(request.original_path(), "/api/auth/register");

        let mut request = ctx("/api/authz");
        run("rewrite-prefix=/api/auth,/api/users", &mut request).await;
        assert_eq!(request.path, "/api/authz");
        assert!(request.attributes.is_empty());
    }

    #[tokio::test]
    async fn prefix_path_prepends() {
        let mut request = ctx("/users");
        run("prefix-path=/v1", &mut request).await;
        assert_eq!(request.path, "/v1/users");
    }

    #[tokio::test]
    async fn request_header_filters() {
        let mut request = ctx("/");
        request.headers.insert("x-debug", HeaderValue::from_static("1"));
        run("add-request-header=X-Source:gateway", &mut request).await;
        run("remove-request-header=X-Debug", &mut request).await;
        assert_eq!(request.headers.get("x-source").unwrap(), "gateway");
        assert!(request.headers.get("x-debug").is_none());
    }

    #[tokio::test]
    async fn response_header_filters() {
        let request = ctx("/");
        let mut response = Response::new(Body::empty());
        response.headers_mut().insert("server", HeaderValue::from_static("upstream/1.0"));

        for spec in ["add-response-header=X-Gateway:1", "remove-response-header=Server"] {
            let filter = spec.parse::<FilterSpec>().unwrap().build();
            filter.on_response(&request, &mut response).await.unwrap();
        }
        assert_eq!(response.headers().get("x-gateway").unwrap(), "1");
        assert!(response.headers().get("server").is_none());
    }

    #[tokio::test]
    async fn token_relay_forwards_principal_credential() {
        let mut request = ctx("/api/users/me");
        request.headers.insert(header::COOKIE, HeaderValue::from_static("SESSION=abc"));
        request.advance_auth(AuthState::Authenticating);
        request.attach_principal(Principal::new("u1", Credential::SessionCookie("abc".into())));

        assert!(run("token-relay", &mut request).await.is_continue());
        assert_eq!(request.headers.get(header::AUTHORIZATION).unwrap(), "Bearer abc");
    }

    #[tokio::test]
    async fn token_relay_without_principal_is_noop() {
        let mut request = ctx("/api/public");
        assert!(run("token-relay", &mut request).await.is_continue());
        assert!(request.headers.get(header::AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn path_attribute_owned_by_first_writer() {
        let mut request = ctx("/a/b/c");
        request
            .attributes
            .insert("other", "strip-prefix.previous_path", "/x")
            .unwrap();
        let outcome = run("strip-prefix=1", &mut request).await;
        assert!(matches!(outcome, FilterOutcome::Fail(GatewayError::InternalFault(_))));
    }
}
