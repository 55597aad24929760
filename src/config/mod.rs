//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, GATEWAY_* env overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → compiled into the route table, filter chains and dispatcher
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AuthConfig, AuthMode, DiscoveryConfig, DiscoveryMode, ForwardingConfig, GatewayConfig,
    HeaderPredicateConfig, HealthCheckConfig, IntrospectionConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, RetryConfig, RouteConfig, SecurityConfig, ServiceConfig,
    StaticTokenConfig, TargetConfig, TargetTable, TimeoutConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
