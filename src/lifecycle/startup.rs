//! Startup orchestration.
//!
//! # Responsibilities
//! - Install the metrics exporter when enabled
//! - Build the request pipeline from the validated config
//! - Start the active health monitor (registry mode)
//! - Bind the listener and serve until shutdown

use std::path::Path;

use crate::config::GatewayConfig;
use crate::health::HealthMonitor;
use crate::http::server::{HttpServer, StartupError};
use crate::lifecycle::Shutdown;
use crate::net::{self, ListenerError, TlsError};
use crate::observability::metrics;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Run the gateway until `shutdown` fires.
pub async fn start(config: GatewayConfig, shutdown: Shutdown) -> Result<(), RunError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(err) = metrics::init_metrics(addr) {
                    tracing::error!(error = %err, "Failed to install metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(config)?;

    if let Some(registry) = server.gateway().registry() {
        let monitor = HealthMonitor::new(registry.clone(), server.config().health_check.clone());
        tokio::spawn(monitor.run(shutdown.subscribe()));
    }

    let tls = server.config().listener.tls.clone();
    match tls {
        Some(tls) => {
            let addr = net::parse_bind_address(&server.config().listener)?;
            let rustls = net::load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
            server.run_tls(addr, rustls, shutdown.subscribe()).await?;
        }
        None => {
            let listener = net::bind(&server.config().listener).await?;
            server.run(listener, shutdown.subscribe()).await?;
        }
    }
    Ok(())
}
