//! Rust API Gateway Library
//!
//! Routes inbound HTTP requests to upstream services through an ordered
//! route table, per-route filter chains and an authentication gate.

pub mod auth;
pub mod config;
pub mod discovery;
pub mod error;
pub mod filters;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod upstream;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use http::{Gateway, HttpServer};
pub use lifecycle::Shutdown;
