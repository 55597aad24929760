//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream attempt:
//!     → timeouts.rs (every attempt bounded)
//!     → On connect failure: retries.rs (idempotent method? attempts left?)
//!     → backoff.rs (jittered exponential delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries only for GET/HEAD, and only when the request never reached the upstream
//! - No retry after a timeout: the upstream may already have acted on the request

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use backoff::calculate_backoff;
pub use retries::RetryPolicy;
pub use timeouts::within;
