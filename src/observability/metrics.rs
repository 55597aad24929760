//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, method, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency by route
//! - `gateway_upstream_failures_total` (counter): connectivity failures by reason
//! - `gateway_auth_decisions_total` (counter): gate decisions
//! - `gateway_upstream_cancelled_total` (counter): dispatches dropped by client disconnect
//! - `gateway_instance_health` (gauge): 1=healthy, 0=unhealthy, per service instance
//!
//! # Design Decisions
//! - `metrics` facade; the Prometheus exporter is installed only when enabled
//! - Labels stay low-cardinality: route ids, not paths

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::error::UnavailableReason;

/// Install the Prometheus recorder with its own HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

pub fn record_request(route: &str, method: &str, status: u16, start: Instant) {
    let route = route.to_string();
    counter!(
        "gateway_requests_total",
        "route" => route.clone(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_failure(reason: UnavailableReason) {
    counter!("gateway_upstream_failures_total", "reason" => reason.as_str()).increment(1);
}

pub fn record_auth_decision(decision: &'static str) {
    counter!("gateway_auth_decisions_total", "decision" => decision).increment(1);
}

pub fn record_upstream_cancelled() {
    counter!("gateway_upstream_cancelled_total").increment(1);
}

pub fn record_instance_health(service: &str, instance: &str, healthy: bool) {
    gauge!(
        "gateway_instance_health",
        "service" => service.to_string(),
        "instance" => instance.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}
