//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe each registry instance
//!     → Instance health state (discovery::instance)
//!
//! Passive health checks:
//!     Dispatch outcome (connect failure / timeout / response)
//!     → Discovery::report
//!     → Instance health state
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary and share thresholds
//! - State transitions require consecutive successes/failures
//! - Upstream 4xx/5xx answers count as reachable, not failures

pub mod active;

pub use active::HealthMonitor;
