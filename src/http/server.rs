//! HTTP server setup and the per-request pipeline.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all handler
//! - Wire up middleware (request id, tracing, concurrency limit)
//! - Bound each request by `timeouts.request_secs`; expiry is a 504 gateway error
//! - Build a RequestContext from each request (body buffered, size-limited)
//! - Run Matcher → Filter Chain (gate first) → Dispatcher → reverse chain
//! - Convert every failure into an HTTP response at this boundary
//! - Graceful shutdown on the broadcast signal
//!
//! # Design Decisions
//! - Route table, filter chains and dispatcher are built once and shared via Arc
//! - Filter chains are indexed by route position, so lookup is a vector index
//! - Concurrency is bounded by a global semaphore layer (backpressure)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::{header, Request, Response},
    routing::any,
    Router,
};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::auth::{authenticator_from_config, AuthenticationGate, Authenticator};
use crate::config::{validate_config, ConfigError, GatewayConfig};
use crate::discovery::{discovery_from_config, Discovery, StaticRegistry};
use crate::error::{GatewayError, UnavailableReason};
use crate::filters::{Filter, FilterChain};
use crate::http::context::RequestContext;
use crate::http::request::{request_id_of, MakeRequestUuid};
use crate::http::response::error_response;
use crate::observability::metrics;
use crate::resilience::within;
use crate::routing::{RouteBuildError, RouteTable};
use crate::upstream::Dispatcher;

/// Time in-flight requests get to finish once shutdown starts (TLS listener).
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Routes(#[from] RouteBuildError),
    #[error("invalid forwarding header: {0}")]
    Header(#[from] header::InvalidHeaderName),
}

/// The compiled request pipeline.
pub struct Gateway {
    table: RouteTable,
    chains: Vec<FilterChain>,
    dispatcher: Dispatcher,
    max_body_size: usize,
    request_timeout: Duration,
    registry: Option<Arc<StaticRegistry>>,
}

/// Why the inbound body could not be buffered.
enum BodyError {
    TooLarge,
    Read(String),
}

async fn buffer_body(body: Body, limit: usize) -> Result<Bytes, BodyError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => Err(BodyError::TooLarge),
        Err(err) => Err(BodyError::Read(err.to_string())),
    }
}

impl Gateway {
    /// Validate the config and build the pipeline with the configured collaborators.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, StartupError> {
        validate_config(config).map_err(ConfigError::Validation)?;
        let setup = discovery_from_config(config);
        let mut gateway =
            Self::with_collaborators(config, authenticator_from_config(&config.auth), setup.discovery)?;
        gateway.registry = setup.registry;
        Ok(gateway)
    }

    /// Build the pipeline around caller-supplied collaborators.
    pub fn with_collaborators(
        config: &GatewayConfig,
        authenticator: Arc<dyn Authenticator>,
        discovery: Arc<dyn Discovery>,
    ) -> Result<Self, StartupError> {
        let table = RouteTable::from_config(&config.routes)?;
        let gate: Arc<dyn Filter> = Arc::new(AuthenticationGate::new(
            authenticator,
            config.auth.session_cookie.clone(),
        ));

        let chains = table
            .routes()
            .iter()
            .map(|route| {
                let mut filters = Vec::with_capacity(route.filters.len() + 1);
                filters.push(gate.clone());
                filters.extend(route.filters.iter().map(|spec| spec.build()));
                let chain = FilterChain::new(filters);
                tracing::debug!(route = %route.id, filters = ?chain.names(), "Filter chain built");
                chain
            })
            .collect();

        Ok(Self {
            table,
            chains,
            dispatcher: Dispatcher::from_config(config, discovery)?,
            max_body_size: config.security.max_body_size,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
            registry: None,
        })
    }

    pub fn routes(&self) -> &RouteTable {
        &self.table
    }

    /// Registry backing discovery, when running in registry mode.
    pub fn registry(&self) -> Option<&Arc<StaticRegistry>> {
        self.registry.as_ref()
    }

    /// Handle one request end to end. Never fails: errors become responses.
    pub async fn handle(&self, request: Request<Body>, client_addr: Option<SocketAddr>) -> Response<Body> {
        let start = Instant::now();
        let request_id = request_id_of(&request);
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        match within(self.request_timeout, self.process(request, client_addr, start)).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(
                    request_id = request_id.as_deref().unwrap_or("-"),
                    method = %method,
                    path = %path,
                    timeout = ?self.request_timeout,
                    "Request deadline exceeded"
                );
                metrics::record_request("none", method.as_str(), 504, start);
                let err = GatewayError::unavailable(path, UnavailableReason::Timeout);
                error_response(request_id.as_deref(), &err)
            }
        }
    }

    async fn process(
        &self,
        request: Request<Body>,
        client_addr: Option<SocketAddr>,
        start: Instant,
    ) -> Response<Body> {
        let request_id = request_id_of(&request);
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        // 1. Buffer body
        let (parts, body) = request.into_parts();
        let declared = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        let too_large = GatewayError::PayloadTooLarge {
            limit: self.max_body_size,
        };
        if declared.is_some_and(|len| len > self.max_body_size) {
            metrics::record_request("none", method.as_str(), 413, start);
            return error_response(request_id.as_deref(), &too_large);
        }
        let body = match buffer_body(body, self.max_body_size).await {
            Ok(bytes) => bytes,
            Err(BodyError::TooLarge) => {
                metrics::record_request("none", method.as_str(), 413, start);
                return error_response(request_id.as_deref(), &too_large);
            }
            Err(BodyError::Read(message)) => {
                tracing::debug!(error = %message, "Failed to read request body");
                metrics::record_request("none", method.as_str(), 400, start);
                return error_response(request_id.as_deref(), &GatewayError::BadRequest(message));
            }
        };

        let mut ctx = RequestContext::from_parts(parts, body);
        if let Some(id) = request_id {
            ctx = ctx.with_request_id(id);
        }
        if let Some(addr) = client_addr {
            ctx = ctx.with_client_addr(addr);
        }

        // 2. Match route
        let route = match self.table.match_request(&ctx) {
            Ok(route) => route,
            Err(err) => {
                tracing::info!(request_id = %ctx.request_id(), method = %method, path = %path, "No route matched");
                metrics::record_request("none", method.as_str(), err.status().as_u16(), start);
                return error_response(Some(ctx.request_id()), &err);
            }
        };
        if let Err(err) = ctx.set_route(route.clone()) {
            return error_response(Some(ctx.request_id()), &err);
        }
        let Some(chain) = self.chains.get(route.index) else {
            let err = GatewayError::InternalFault(format!("no filter chain for route '{}'", route.id));
            return error_response(Some(ctx.request_id()), &err);
        };

        // 3. Filters, dispatch, reverse filters
        let response = chain.execute(&mut ctx, &self.dispatcher).await;

        let status = response.status();
        metrics::record_request(&route.id, method.as_str(), status.as_u16(), start);
        tracing::info!(
            request_id = %ctx.request_id(),
            route = %route.id,
            method = %method,
            path = %path,
            upstream_path = %ctx.path,
            status = status.as_u16(),
            error_kind = response.extensions().get::<crate::error::ErrorKind>().map(|k| k.as_str()),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    gateway: Arc<Gateway>,
    config: GatewayConfig,
}

impl HttpServer {
    pub fn new(config: GatewayConfig) -> Result<Self, StartupError> {
        let gateway = Gateway::from_config(&config)?;
        Ok(Self::from_gateway(gateway, config))
    }

    pub fn from_gateway(gateway: Gateway, config: GatewayConfig) -> Self {
        Self {
            gateway: Arc::new(gateway),
            config,
        }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(self.gateway.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(GlobalConcurrencyLimitLayer::new(self.config.listener.max_connections)),
            )
    }

    /// Serve plain HTTP until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.gateway.routes().len(),
            "HTTP server starting"
        );

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until the shutdown signal fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(
            address = %addr,
            routes = self.gateway.routes().len(),
            "HTTPS server starting"
        );

        let handle = Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTPS server draining");
            drain.graceful_shutdown(Some(DRAIN_TIMEOUT));
        });

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls).handle(handle).serve(app).await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

async fn gateway_handler(State(gateway): State<Arc<Gateway>>, request: Request<Body>) -> Response<Body> {
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    gateway.handle(request, client_addr).await
}
