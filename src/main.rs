//! Rust API Gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────────┐
//!                    │                       API GATEWAY                         │
//!                    │                                                           │
//!  Client Request    │  ┌─────────┐   ┌─────────┐   ┌─────────┐   ┌──────────┐   │
//!  ──────────────────┼─▶│   net   │──▶│  http   │──▶│ routing │──▶│ filters  │   │
//!                    │  │listener │   │ server  │   │  table  │   │  + auth  │   │
//!                    │  └─────────┘   └─────────┘   └─────────┘   └────┬─────┘   │
//!                    │                                                 │         │
//!                    │                                                 ▼         │
//!  Client Response   │                 ┌───────────┐             ┌──────────┐    │
//!  ◀─────────────────┼─────────────────│ post-     │◀────────────│ upstream │◀───┼──── Service
//!                    │                 │ filters   │             │dispatcher│    │
//!                    │                 └───────────┘             └────┬─────┘    │
//!                    │                                                 │         │
//!                    │                                           ┌─────▼─────┐   │
//!                    │                                           │ discovery │   │
//!                    │                                           │ + health  │   │
//!                    │                                           └───────────┘   │
//!                    └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use api_gateway::config::loader::{apply_bind_override, ENV_CONFIG_PATH};
use api_gateway::config::load_config;
use api_gateway::lifecycle::{self, signals};
use api_gateway::observability::logging;
use api_gateway::Shutdown;

#[derive(Parser)]
#[command(name = "api-gateway", version, about = "HTTP API gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = ENV_CONFIG_PATH, default_value = "config/gateway.toml")]
    config: PathBuf,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load {}: {err}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };
    if let Some(bind) = cli.bind {
        if let Err(err) = apply_bind_override(&mut config, bind) {
            eprintln!("invalid --bind: {err}");
            return ExitCode::FAILURE;
        }
    }

    if cli.check {
        println!("configuration OK: {} routes", config.routes.len());
        return ExitCode::SUCCESS;
    }

    if let Err(err) = logging::init_logging(&config.observability) {
        eprintln!("failed to initialise logging: {err}");
        return ExitCode::FAILURE;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        max_connections = config.listener.max_connections,
        upstream_timeout_ms = config.timeouts.upstream_ms,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    match lifecycle::start(config, shutdown).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "Gateway failed");
            ExitCode::FAILURE
        }
    }
}
