//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every registry instance
//! - Update instance health state and the health gauge

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::discovery::{Instance, StaticRegistry};
use crate::observability::metrics;

pub struct HealthMonitor {
    registry: Arc<StaticRegistry>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<StaticRegistry>, config: HealthCheckConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            registry,
            config,
            client,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.check_all().await,
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor stopping");
                    break;
                }
            }
        }
    }

    /// Probe every instance once.
    pub async fn check_all(&self) {
        for (service, instance) in self.registry.instances() {
            let healthy = self.probe(&instance).await;
            let thresholds = self.registry.thresholds();
            let flipped = if healthy {
                instance.mark_success(thresholds)
            } else {
                instance.mark_failure(thresholds)
            };
            if flipped {
                tracing::warn!(
                    service = %service,
                    instance = %instance.addr,
                    healthy = instance.is_healthy(),
                    "Instance health changed (active)"
                );
            }
            metrics::record_instance_health(&service, &instance.addr.to_string(), instance.is_healthy());
        }
    }

    async fn probe(&self, instance: &Instance) -> bool {
        let addr = instance.addr;
        let request = match Request::get(format!("http://{}{}", addr, self.config.path))
            .header(header::USER_AGENT, "api-gateway-health-check")
            .body(Body::empty())
        {
            Ok(request) => request,
            Err(err) => {
                tracing::error!(error = %err, "Failed to build health check request");
                return false;
            }
        };

        let timeout = Duration::from_secs(self.config.timeout_secs);
        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) if response.status().is_success() => true,
            Ok(Ok(response)) => {
                tracing::debug!(addr = %addr, status = %response.status(), "Health check failed: non-success status");
                false
            }
            Ok(Err(err)) => {
                tracing::debug!(addr = %addr, error = %err, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::debug!(addr = %addr, "Health check failed: timeout");
                false
            }
        }
    }
}
