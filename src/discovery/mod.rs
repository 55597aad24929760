//! Service discovery collaborator.
//!
//! # Data Flow
//! ```text
//! UpstreamTarget::Discovered("user-service")
//!     → Discovery::resolve
//!         - registry.rs: static instances, round robin over healthy ones
//!         - dns.rs: DNS lookup with a TTL cache
//!     → ResolvedInstance (address + optional connection slot)
//!     → dispatch outcome reported back for passive health
//! ```
//!
//! # Design Decisions
//! - The gateway only consumes this trait; a real registry client can replace both
//! - Resolution is async and never blocks a worker
//! - No healthy instance is a 503, never a silent fallback

pub mod dns;
pub mod instance;
pub mod registry;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{DiscoveryMode, GatewayConfig};

pub use dns::DnsDiscovery;
pub use instance::{HealthState, Instance, InstanceGuard, Thresholds};
pub use registry::StaticRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("unknown service '{0}'")]
    UnknownService(String),
    #[error("no healthy instance of '{0}'")]
    NoHealthyInstance(String),
    #[error("lookup of '{service}' failed: {message}")]
    Lookup { service: String, message: String },
}

/// A physical address chosen for one dispatch.
#[derive(Debug)]
pub struct ResolvedInstance {
    pub addr: SocketAddr,
    /// Held for the duration of the call when the collaborator tracks capacity.
    pub guard: Option<InstanceGuard>,
}

impl ResolvedInstance {
    pub fn unguarded(addr: SocketAddr) -> Self {
        Self { addr, guard: None }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

#[async_trait]
pub trait Discovery: Send + Sync {
    async fn resolve(&self, service: &str) -> Result<ResolvedInstance, DiscoveryError>;

    /// Passive health feedback from the dispatcher.
    fn report(&self, _service: &str, _addr: SocketAddr, _success: bool) {}
}

/// Discovery collaborator plus, in registry mode, the registry for active health checks.
pub struct DiscoverySetup {
    pub discovery: Arc<dyn Discovery>,
    pub registry: Option<Arc<StaticRegistry>>,
}

pub fn discovery_from_config(config: &GatewayConfig) -> DiscoverySetup {
    match config.discovery.mode {
        DiscoveryMode::Registry => {
            let registry = Arc::new(StaticRegistry::from_config(
                &config.services,
                Thresholds {
                    healthy: config.health_check.healthy_threshold as usize,
                    unhealthy: config.health_check.unhealthy_threshold as usize,
                },
            ));
            DiscoverySetup {
                discovery: registry.clone(),
                registry: Some(registry),
            }
        }
        DiscoveryMode::Dns => DiscoverySetup {
            discovery: Arc::new(DnsDiscovery::from_config(&config.discovery)),
            registry: None,
        },
    }
}
