//! Timeout enforcement.
//!
//! # Design Decisions
//! - Uses Tokio's timer; the wrapped future is dropped on expiry, which aborts
//!   the in-flight call
//! - Timeout errors are distinct from other errors (504, never retried)

use std::future::Future;
use std::time::Duration;

use tokio::time::error::Elapsed;

/// Run `fut` with a deadline of `limit`.
pub async fn within<F: Future>(limit: Duration, fut: F) -> Result<F::Output, Elapsed> {
    tokio::time::timeout(limit, fut).await
}
