//! Outbound call to the resolved upstream.
//!
//! # Responsibilities
//! - Resolve the target (static pass-through or discovery collaborator)
//! - Build the outbound request from the filtered RequestContext
//! - Bound every attempt with the upstream timeout
//! - Classify failures: connect → 502, timeout → 504, no instance → 503
//! - Relay upstream responses verbatim, including 4xx/5xx
//! - Bound the relayed body: each chunk must arrive within the upstream timeout
//!
//! # Design Decisions
//! - One pooled hyper client, built at startup and shared by handle
//! - The dispatch future owns the outbound call; dropping it (client went away)
//!   drops the call and closes the upstream connection
//! - Retries only on connect failure for GET/HEAD (see resilience::retries)
//! - The relayed body owns the instance guard, so a streaming response keeps
//!   counting against the instance's connection cap until it ends

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, BodyDataStream};
use axum::http::{header, HeaderValue, Request, Response, Uri};
use futures_util::StreamExt;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::config::{GatewayConfig, TimeoutConfig};
use crate::discovery::{Discovery, DiscoveryError, ResolvedInstance};
use crate::error::{ErrorKind, GatewayError, UnavailableReason};
use crate::filters::Dispatch;
use crate::http::context::RequestContext;
use crate::http::request::X_REQUEST_ID;
use crate::observability::metrics;
use crate::resilience::{within, RetryPolicy};
use crate::upstream::headers::{add_forwarded, strip_hop_by_hop, IdentityHeaders};
use crate::upstream::{upstream_uri, UpstreamTarget};

pub type HttpClient = Client<HttpConnector, Body>;

/// Build the shared outbound client.
pub fn build_client(timeouts: &TimeoutConfig) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_millis(timeouts.connect_ms)));
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Logs and counts dispatches abandoned before they completed.
struct InFlight<'a> {
    request_id: &'a str,
    target: &'a UpstreamTarget,
    done: bool,
}

impl<'a> InFlight<'a> {
    fn new(request_id: &'a str, target: &'a UpstreamTarget) -> Self {
        Self {
            request_id,
            target,
            done: false,
        }
    }

    fn finish(&mut self) {
        self.done = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            tracing::info!(
                request_id = %self.request_id,
                upstream = %self.target,
                "Client disconnected, upstream call cancelled"
            );
            metrics::record_upstream_cancelled();
        }
    }
}

/// A resolved destination for one attempt.
struct Endpoint {
    base: String,
    instance: Option<ResolvedInstance>,
}

pub struct Dispatcher {
    client: HttpClient,
    discovery: Arc<dyn Discovery>,
    upstream_timeout: Duration,
    retry: RetryPolicy,
    identity: IdentityHeaders,
    add_forwarded: bool,
    forwarded_proto: &'static str,
}

impl Dispatcher {
    pub fn new(
        client: HttpClient,
        discovery: Arc<dyn Discovery>,
        upstream_timeout: Duration,
        retry: RetryPolicy,
        identity: IdentityHeaders,
    ) -> Self {
        Self {
            client,
            discovery,
            upstream_timeout,
            retry,
            identity,
            add_forwarded: true,
            forwarded_proto: "http",
        }
    }

    pub fn from_config(
        config: &GatewayConfig,
        discovery: Arc<dyn Discovery>,
    ) -> Result<Self, header::InvalidHeaderName> {
        let mut dispatcher = Self::new(
            build_client(&config.timeouts),
            discovery,
            Duration::from_millis(config.timeouts.upstream_ms),
            RetryPolicy::from_config(&config.retries),
            IdentityHeaders::from_config(&config.forwarding)?,
        );
        dispatcher.add_forwarded = config.forwarding.add_forwarded_headers;
        dispatcher.forwarded_proto = if config.listener.tls.is_some() { "https" } else { "http" };
        Ok(dispatcher)
    }

    async fn resolve(&self, target: &UpstreamTarget) -> Result<Endpoint, GatewayError> {
        match target {
            UpstreamTarget::Static(url) => Ok(Endpoint {
                base: url.as_str().trim_end_matches('/').to_string(),
                instance: None,
            }),
            UpstreamTarget::Discovered(service) => {
                let instance = self.discovery.resolve(service).await.map_err(|err| {
                    tracing::warn!(service = %service, error = %err, "Discovery failed");
                    let reason = match err {
                        DiscoveryError::Lookup { .. } => UnavailableReason::Connect,
                        DiscoveryError::NoHealthyInstance(_) | DiscoveryError::UnknownService(_) => {
                            UnavailableReason::NoHealthyInstance
                        }
                    };
                    metrics::record_upstream_failure(reason);
                    GatewayError::unavailable(target.to_string(), reason)
                })?;
                Ok(Endpoint {
                    base: instance.base_url(),
                    instance: Some(instance),
                })
            }
        }
    }

    fn build_request(&self, ctx: &RequestContext, base: &str) -> Result<Request<Body>, GatewayError> {
        let uri: Uri = upstream_uri(base, &ctx.path, ctx.query.as_deref())
            .parse()
            .map_err(|e| GatewayError::InternalFault(format!("invalid upstream URI: {e}")))?;

        let mut headers = ctx.headers.clone();
        strip_hop_by_hop(&mut headers);
        self.identity.sanitize(&mut headers);
        let forward_principal = ctx.route().map(|r| r.forward_principal).unwrap_or(false);
        if forward_principal {
            if let Some(principal) = ctx.principal() {
                self.identity.apply(&mut headers, principal);
            }
        }
        if self.add_forwarded {
            add_forwarded(&mut headers, ctx.client_addr(), self.forwarded_proto);
        }
        // The client derives Host from the outbound URI.
        headers.remove(header::HOST);
        if let Ok(id) = HeaderValue::from_str(ctx.request_id()) {
            headers.insert(X_REQUEST_ID, id);
        }

        let mut request = Request::builder()
            .method(ctx.method.clone())
            .uri(uri)
            .body(Body::from(ctx.body.clone()))
            .map_err(|e| GatewayError::InternalFault(format!("failed to build upstream request: {e}")))?;
        *request.headers_mut() = headers;
        Ok(request)
    }

    fn report(&self, target: &UpstreamTarget, endpoint: &Endpoint, success: bool) {
        if let (Some(service), Some(instance)) = (target.service(), &endpoint.instance) {
            self.discovery.report(service, instance.addr, success);
        }
    }

    /// Send the request upstream and relay the answer.
    pub async fn dispatch(
        &self,
        ctx: &RequestContext,
        target: &UpstreamTarget,
    ) -> Result<Response<Body>, GatewayError> {
        let mut in_flight = InFlight::new(ctx.request_id(), target);
        let result = self.attempts(ctx, target).await;
        in_flight.finish();
        result
    }

    async fn attempts(
        &self,
        ctx: &RequestContext,
        target: &UpstreamTarget,
    ) -> Result<Response<Body>, GatewayError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let endpoint = self.resolve(target).await?;
            let request = self.build_request(ctx, &endpoint.base)?;

            tracing::debug!(
                request_id = %ctx.request_id(),
                upstream = %request.uri(),
                attempt,
                "Dispatching upstream"
            );

            let reason = match within(self.upstream_timeout, self.client.request(request)).await {
                Ok(Ok(response)) => {
                    self.report(target, &endpoint, true);
                    return Ok(relay(ctx, response, endpoint.instance, self.upstream_timeout));
                }
                Ok(Err(err)) => {
                    let reason = if err.is_connect() {
                        UnavailableReason::Connect
                    } else {
                        UnavailableReason::Transport
                    };
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        upstream = %target,
                        attempt,
                        error = %err,
                        reason = %reason,
                        "Upstream call failed"
                    );
                    reason
                }
                Err(_) => {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        upstream = %target,
                        timeout = ?self.upstream_timeout,
                        "Upstream call timed out"
                    );
                    UnavailableReason::Timeout
                }
            };

            self.report(target, &endpoint, false);
            // Release the connection slot before backing off.
            drop(endpoint);

            if self.retry.should_retry(&ctx.method, attempt, reason) {
                let delay = self.retry.backoff(attempt);
                tracing::info!(request_id = %ctx.request_id(), attempt, delay = ?delay, "Retrying after connect failure");
                tokio::time::sleep(delay).await;
                continue;
            }

            metrics::record_upstream_failure(reason);
            return Err(GatewayError::unavailable(target.to_string(), reason));
        }
    }
}

/// Upstream answers are relayed unchanged apart from hop-by-hop headers.
fn relay(
    ctx: &RequestContext,
    response: Response<hyper::body::Incoming>,
    instance: Option<ResolvedInstance>,
    idle: Duration,
) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    if let Some(kind) = ErrorKind::from_upstream_status(parts.status) {
        tracing::debug!(
            request_id = %ctx.request_id(),
            status = parts.status.as_u16(),
            "Relaying upstream error status"
        );
        parts.extensions.insert(kind);
    }
    let body = guarded_body(body, instance, idle, ctx.request_id().to_string());
    Response::from_parts(parts, body)
}

struct BodyRelay {
    data: BodyDataStream,
    _instance: Option<ResolvedInstance>,
    idle: Duration,
    request_id: String,
}

/// Stream the upstream body, failing it when no chunk arrives within `idle`.
/// Trailers are not relayed.
fn guarded_body(
    body: hyper::body::Incoming,
    instance: Option<ResolvedInstance>,
    idle: Duration,
    request_id: String,
) -> Body {
    let relay = BodyRelay {
        data: Body::new(body).into_data_stream(),
        _instance: instance,
        idle,
        request_id,
    };
    let stream = futures_util::stream::unfold(Some(relay), |state| async move {
        let mut relay = state?;
        match within(relay.idle, relay.data.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(relay))),
            Ok(Some(Err(err))) => {
                tracing::warn!(request_id = %relay.request_id, error = %err, "Upstream body failed");
                Some((Err(io::Error::other(err)), None))
            }
            Ok(None) => None,
            Err(_) => {
                tracing::warn!(
                    request_id = %relay.request_id,
                    timeout = ?relay.idle,
                    "Upstream body stalled"
                );
                metrics::record_upstream_failure(UnavailableReason::Timeout);
                Some((
                    Err(io::Error::new(io::ErrorKind::TimedOut, "upstream body stalled")),
                    None,
                ))
            }
        }
    });
    Body::from_stream(stream)
}

#[async_trait]
impl Dispatch for Dispatcher {
    async fn forward(&self, ctx: &RequestContext) -> Result<Response<Body>, GatewayError> {
        let route = ctx
            .route()
            .cloned()
            .ok_or_else(|| GatewayError::InternalFault("dispatch without a matched route".into()))?;
        self.dispatch(ctx, &route.target).await
    }
}
