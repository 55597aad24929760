//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_CONFIG_PATH: &str = "GATEWAY_CONFIG";
pub const ENV_BIND_ADDRESS: &str = "GATEWAY_BIND_ADDRESS";
pub const ENV_UPSTREAM_TIMEOUT_MS: &str = "GATEWAY_UPSTREAM_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "GATEWAY_LOG_LEVEL";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML source text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: GatewayConfig = toml::from_str(&content)?;
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(path = %path.display(), routes = config.routes.len(), "Configuration file parsed");
    Ok(config)
}

/// Replace the listener address and re-validate the result.
pub fn apply_bind_override(config: &mut GatewayConfig, bind: String) -> Result<(), ConfigError> {
    config.listener.bind_address = bind;
    validate_config(config).map_err(ConfigError::Validation)
}

/// Apply `GATEWAY_*` overrides using the given variable lookup.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(bind) = lookup(ENV_BIND_ADDRESS) {
        config.listener.bind_address = bind;
    }
    if let Some(raw) = lookup(ENV_UPSTREAM_TIMEOUT_MS) {
        config.timeouts.upstream_ms = raw.parse().map_err(|_| ConfigError::Env {
            var: ENV_UPSTREAM_TIMEOUT_MS,
            value: raw.clone(),
        })?;
    }
    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.observability.log_level = level;
    }
    Ok(())
}
