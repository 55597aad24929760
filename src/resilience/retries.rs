//! Retry policy.
//!
//! # Responsibilities
//! - Decide whether a failed attempt may be retried
//! - Compute the delay before the next attempt
//!
//! # Design Decisions
//! - Never retry POST/PUT/PATCH/DELETE (non-idempotent)
//! - Only connect failures are retryable: the request never left the gateway
//! - Attempts are bounded by `max_attempts` (total, including the first)

use std::time::Duration;

use axum::http::Method;

use crate::config::RetryConfig;
use crate::error::UnavailableReason;
use crate::resilience::backoff::calculate_backoff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    enabled: bool,
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn is_retryable_method(method: &Method) -> bool {
        method == Method::GET || method == Method::HEAD
    }

    /// May attempt number `attempt` (1-based), which failed with `reason`, be retried?
    pub fn should_retry(&self, method: &Method, attempt: u32, reason: UnavailableReason) -> bool {
        self.enabled
            && attempt < self.max_attempts
            && reason == UnavailableReason::Connect
            && Self::is_retryable_method(method)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms)
    }
}
