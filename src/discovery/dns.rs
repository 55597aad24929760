//! DNS-backed discovery with a TTL cache.
//!
//! Service names are resolved as `host[:port]`; the configured default port
//! applies when none is given. Addresses are cached for `ttl_secs` and rotated
//! round robin. A failed dispatch evicts the cached entry so the next request
//! looks the name up again.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::config::DiscoveryConfig;
use crate::discovery::{Discovery, DiscoveryError, ResolvedInstance};

#[derive(Debug, Clone)]
struct CachedAddrs {
    addrs: Vec<SocketAddr>,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct DnsDiscovery {
    ttl: Duration,
    default_port: u16,
    cache: DashMap<String, CachedAddrs>,
    cursor: AtomicUsize,
}

impl DnsDiscovery {
    pub fn new(ttl: Duration, default_port: u16) -> Self {
        Self {
            ttl,
            default_port,
            cache: DashMap::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.default_port)
    }

    fn lookup_target(&self, service: &str) -> String {
        let has_port = service
            .rsplit_once(':')
            .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
        if has_port {
            service.to_string()
        } else {
            format!("{service}:{}", self.default_port)
        }
    }

    fn cached(&self, service: &str) -> Option<Vec<SocketAddr>> {
        let entry = self.cache.get(service)?;
        (entry.expires_at > Instant::now()).then(|| entry.addrs.clone())
    }

    pub fn is_cached(&self, service: &str) -> bool {
        self.cached(service).is_some()
    }

    async fn lookup(&self, service: &str) -> Result<Vec<SocketAddr>, DiscoveryError> {
        if let Some(addrs) = self.cached(service) {
            return Ok(addrs);
        }

        let target = self.lookup_target(service);
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&target)
            .await
            .map_err(|e| DiscoveryError::Lookup {
                service: service.to_string(),
                message: e.to_string(),
            })?
            .collect();

        tracing::debug!(service = %service, addrs = addrs.len(), "DNS lookup");
        if !addrs.is_empty() {
            self.cache.insert(
                service.to_string(),
                CachedAddrs {
                    addrs: addrs.clone(),
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
        Ok(addrs)
    }
}

#[async_trait]
impl Discovery for DnsDiscovery {
    async fn resolve(&self, service: &str) -> Result<ResolvedInstance, DiscoveryError> {
        let addrs = self.lookup(service).await?;
        if addrs.is_empty() {
            return Err(DiscoveryError::NoHealthyInstance(service.to_string()));
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % addrs.len();
        Ok(ResolvedInstance::unguarded(addrs[index]))
    }

    fn report(&self, service: &str, addr: SocketAddr, success: bool) {
        if !success && self.cache.remove(service).is_some() {
            tracing::debug!(service = %service, instance = %addr, "Evicted DNS cache entry after failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_literal_with_explicit_port() {
        let dns = DnsDiscovery::new(Duration::from_secs(30), 80);
        let instance = dns.resolve("127.0.0.1:8080").await.unwrap();
        assert_eq!(instance.addr, "127.0.0.1:8080".parse().unwrap());
        assert!(dns.is_cached("127.0.0.1:8080"));
    }

    #[tokio::test]
    async fn default_port_applies() {
        let dns = DnsDiscovery::new(Duration::from_secs(30), 8081);
        let instance = dns.resolve("127.0.0.1").await.unwrap();
        assert_eq!(instance.addr.port(), 8081);
    }

    #[tokio::test]
    async fn failure_evicts_and_ttl_expires() {
        let dns = DnsDiscovery::new(Duration::from_secs(30), 80);
        let addr = dns.resolve("127.0.0.1:9000").await.unwrap().addr;
        dns.report("127.0.0.1:9000", addr, false);
        assert!(!dns.is_cached("127.0.0.1:9000"));

        let expired = DnsDiscovery::new(Duration::ZERO, 80);
        expired.resolve("127.0.0.1:9000").await.unwrap();
        assert!(!expired.is_cached("127.0.0.1:9000"));
    }

    #[tokio::test]
    async fn unresolvable_name_is_a_lookup_error() {
        let dns = DnsDiscovery::new(Duration::from_secs(30), 80);
        assert!(matches!(
            dns.resolve("no-such-host.invalid").await,
            Err(DiscoveryError::Lookup { .. })
        ));
    }
}
