//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, headers)
//!     → router.rs (route lookup, declaration order)
//!     → matcher.rs (evaluate predicates, AND semantics)
//!     → Return: matched RouteDefinition or NoRouteMatch (404)
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Parse globs, methods, header predicates, filter specs, target
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (segment globs only)
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by declaration)

pub mod matcher;
pub mod router;

pub use router::{Explanation, RouteBuildError, RouteDefinition, RouteTable};
