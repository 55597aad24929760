//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! listener.bind_address
//!     → listener.rs (parse + bind, plain HTTP)
//!     → tls.rs (load PEM cert/key, HTTPS via axum-server)
//!     → Hand off to the HTTP layer
//! ```
//!
//! # Design Decisions
//! - Concurrency is bounded in the HTTP layer, not at accept time
//! - TLS is optional and terminates at the gateway

pub mod listener;
pub mod tls;

pub use listener::{bind, parse_bind_address, ListenerError};
pub use tls::{load_tls_config, TlsError};
