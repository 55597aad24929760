//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from TOML files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Route definitions, evaluated in declaration order.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration for idempotent requests.
    pub retries: RetryConfig,

    /// Credential validation.
    pub auth: AuthConfig,

    /// Identity and forwarding headers sent upstream.
    pub forwarding: ForwardingConfig,

    /// How logical service names are resolved.
    pub discovery: DiscoveryConfig,

    /// Static service registry used by `discovery.mode = "registry"`.
    pub services: Vec<ServiceConfig>,

    /// Active health check settings for registry instances.
    pub health_check: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// A single route: predicates, filters and the upstream target.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub id: String,

    /// Glob patterns; the route matches when ANY of them matches the path.
    #[serde(alias = "pathPatterns")]
    pub path_patterns: Vec<String>,

    /// Allowed methods. Empty means any method.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Header predicates, all of which must hold.
    #[serde(default)]
    pub headers: Vec<HeaderPredicateConfig>,

    /// Filter references, applied in order after the authentication gate.
    #[serde(default)]
    pub filters: Vec<String>,

    /// Where matched requests are sent.
    pub target: TargetConfig,

    /// Public routes skip credential validation.
    #[serde(default)]
    pub public: bool,

    /// Send the authenticated principal upstream as identity headers.
    #[serde(default = "default_true", alias = "forwardPrincipal")]
    pub forward_principal: bool,
}

/// Header presence (no value) or exact value predicate.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeaderPredicateConfig {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// Upstream target as written in config.
///
/// Accepts `"http://host:port"`, `"lb://service"`, `{ static = "..." }`
/// or `{ discover = "service" }`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TargetConfig {
    Uri(String),
    Table(TargetTable),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetTable {
    Static(String),
    Discover(String),
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Bound on each upstream dispatch attempt (until response headers).
    pub upstream_ms: u64,

    /// Total time for the whole inbound request in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 2_000,
            upstream_ms: 10_000,
            request_secs: 30,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries of GET/HEAD after connect failures.
    pub enabled: bool,

    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 2,
            base_delay_ms: 50,
            max_delay_ms: 500,
        }
    }
}

/// Which authorization collaborator validates credentials.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Static,
    Introspection,
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,

    /// Cookie consulted when no bearer token is present.
    pub session_cookie: String,

    /// Token table for `mode = "static"`.
    pub tokens: Vec<StaticTokenConfig>,

    /// Introspection endpoint for `mode = "introspection"`.
    pub introspection: Option<IntrospectionConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Static,
            session_cookie: "SESSION".to_string(),
            tokens: Vec::new(),
            introspection: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticTokenConfig {
    pub token: String,
    pub subject: String,
    #[serde(default)]
    pub claims: BTreeMap<String, serde_json::Value>,
}

/// RFC 7662 token introspection endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntrospectionConfig {
    pub url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_introspection_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_introspection_timeout_ms() -> u64 {
    2_000
}

/// Headers carrying gateway-derived identity to upstreams.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Receives the principal's subject.
    pub principal_header: String,

    /// Receives the principal's claims as JSON.
    pub claims_header: String,

    /// Extra client-supplied headers that are never forwarded.
    pub strip_headers: Vec<String>,

    /// Add X-Forwarded-For / -Proto / -Host.
    pub add_forwarded_headers: bool,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            principal_header: "x-user-id".to_string(),
            claims_header: "x-user-claims".to_string(),
            strip_headers: Vec::new(),
            add_forwarded_headers: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// Instances listed under `[[services]]`, health checked.
    #[default]
    Registry,
    /// Service names resolved through DNS.
    Dns,
}

/// Discovery collaborator settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub mode: DiscoveryMode,

    /// How long a DNS answer is reused.
    pub ttl_secs: u64,

    /// Port used when a DNS service name carries none.
    pub default_port: u16,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::Registry,
            ttl_secs: 30,
            default_port: 80,
        }
    }
}

/// A logical service and its instances.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Logical name referenced by `discover` targets.
    pub name: String,

    /// Instance addresses (e.g., "127.0.0.1:9090").
    pub instances: Vec<String>,

    /// Maximum concurrent requests per instance.
    #[serde(default = "default_max_instance_conns")]
    pub max_connections: usize,
}

fn default_max_instance_conns() -> usize {
    100
}

fn default_true() -> bool {
    true
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Path to probe for HTTP health checks.
    pub path: String,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_secs: 5,
            path: "/health".to_string(),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Request hardening.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum buffered request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

impl GatewayConfig {
    /// Look up a registry service by name.
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }
}
