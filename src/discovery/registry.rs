//! Static instance registry with round-robin selection.
//!
//! # Responsibilities
//! - Hold the configured instances per service
//! - Rotate through healthy instances with free capacity
//! - Apply passive health reports

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ServiceConfig;
use crate::discovery::{Discovery, DiscoveryError, Instance, ResolvedInstance, Thresholds};
use crate::observability::metrics;

#[derive(Debug, Default)]
struct Pool {
    instances: Vec<Arc<Instance>>,
    cursor: AtomicUsize,
}

impl Pool {
    fn next(&self) -> Option<ResolvedInstance> {
        let len = self.instances.len();
        if len == 0 {
            return None;
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        (0..len)
            .map(|i| &self.instances[(start + i) % len])
            .filter(|instance| instance.is_healthy())
            .find_map(|instance| instance.try_acquire())
            .map(|guard| ResolvedInstance {
                addr: guard.addr,
                guard: Some(guard),
            })
    }
}

#[derive(Debug, Default)]
pub struct StaticRegistry {
    services: HashMap<String, Pool>,
    thresholds: Thresholds,
}

impl StaticRegistry {
    pub fn from_config(services: &[ServiceConfig], thresholds: Thresholds) -> Self {
        let services = services
            .iter()
            .map(|service| {
                let instances = service
                    .instances
                    .iter()
                    .filter_map(|raw| match raw.parse::<SocketAddr>() {
                        Ok(addr) => Some(Arc::new(Instance::new(addr, service.max_connections))),
                        Err(_) => {
                            tracing::warn!(service = %service.name, instance = %raw, "Invalid instance address, skipped");
                            None
                        }
                    })
                    .collect();
                (
                    service.name.clone(),
                    Pool {
                        instances,
                        cursor: AtomicUsize::new(0),
                    },
                )
            })
            .collect();
        Self {
            services,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Every (service, instance) pair, for active health checking.
    pub fn instances(&self) -> Vec<(String, Arc<Instance>)> {
        self.services
            .iter()
            .flat_map(|(name, pool)| pool.instances.iter().map(move |i| (name.clone(), i.clone())))
            .collect()
    }

    fn find(&self, service: &str, addr: SocketAddr) -> Option<&Arc<Instance>> {
        self.services
            .get(service)?
            .instances
            .iter()
            .find(|i| i.addr == addr)
    }
}

#[async_trait]
impl Discovery for StaticRegistry {
    async fn resolve(&self, service: &str) -> Result<ResolvedInstance, DiscoveryError> {
        let pool = self
            .services
            .get(service)
            .ok_or_else(|| DiscoveryError::UnknownService(service.to_string()))?;
        pool.next().ok_or_else(|| {
            tracing::debug!(service = %service, instances = pool.instances.len(), "No healthy instance with free capacity");
            DiscoveryError::NoHealthyInstance(service.to_string())
        })
    }

    fn report(&self, service: &str, addr: SocketAddr, success: bool) {
        let Some(instance) = self.find(service, addr) else {
            return;
        };
        let flipped = if success {
            instance.mark_success(self.thresholds)
        } else {
            instance.mark_failure(self.thresholds)
        };
        if flipped {
            tracing::warn!(
                service = %service,
                instance = %addr,
                healthy = instance.is_healthy(),
                "Instance health changed (passive)"
            );
            metrics::record_instance_health(service, &addr.to_string(), instance.is_healthy());
        }
    }
}
