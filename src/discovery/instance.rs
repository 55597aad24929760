//! A single service instance.
//!
//! # Responsibilities
//! - Track in-flight calls and enforce the per-instance connection cap
//! - Track health with consecutive success/failure thresholds
//!
//! # State Transitions
//! ```text
//! Unknown/Healthy → Unhealthy: consecutive failures >= unhealthy_threshold
//! Unknown/Unhealthy → Healthy: consecutive successes >= healthy_threshold
//! ```

use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// Hysteresis thresholds shared by active and passive checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub healthy: usize,
    pub unhealthy: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            healthy: 2,
            unhealthy: 3,
        }
    }
}

#[derive(Debug)]
pub struct Instance {
    pub addr: SocketAddr,
    pub max_connections: usize,
    active_connections: AtomicUsize,
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
}

impl Instance {
    pub fn new(addr: SocketAddr, max_connections: usize) -> Self {
        Self {
            addr,
            max_connections,
            active_connections: AtomicUsize::new(0),
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Reserve a connection slot; None when the instance is at capacity.
    pub fn try_acquire(self: &Arc<Self>) -> Option<InstanceGuard> {
        let mut prev = self.active_connections.load(Ordering::Relaxed);
        loop {
            if prev >= self.max_connections {
                return None;
            }
            match self.active_connections.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        Some(InstanceGuard {
            instance: self.clone(),
        })
    }

    pub fn state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Healthy or not yet probed.
    pub fn is_healthy(&self) -> bool {
        self.state() != HealthState::Unhealthy
    }

    /// Record a success. Returns true when this flips the instance to Healthy.
    pub fn mark_success(&self, thresholds: Thresholds) -> bool {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if self.state() == HealthState::Healthy {
            return false;
        }
        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= thresholds.healthy {
            self.consecutive_successes.store(0, Ordering::Relaxed);
            self.state.store(HealthState::Healthy as u8, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// Record a failure. Returns true when this flips the instance to Unhealthy.
    pub fn mark_failure(&self, thresholds: Thresholds) -> bool {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        if self.state() == HealthState::Unhealthy {
            return false;
        }
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= thresholds.unhealthy {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
            return true;
        }
        false
    }
}

/// Holds a connection slot for the lifetime of one dispatch.
#[derive(Debug)]
pub struct InstanceGuard {
    instance: Arc<Instance>,
}

impl Deref for InstanceGuard {
    type Target = Instance;
    fn deref(&self) -> &Self::Target {
        &self.instance
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.instance.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}
