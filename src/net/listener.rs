//! TCP listener binding.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ListenerConfig;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid bind address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

pub fn parse_bind_address(config: &ListenerConfig) -> Result<SocketAddr, ListenerError> {
    config
        .bind_address
        .parse()
        .map_err(|source| ListenerError::InvalidAddress {
            address: config.bind_address.clone(),
            source,
        })
}

/// Bind the configured address.
pub async fn bind(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let address = parse_bind_address(config)?;
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| ListenerError::Bind { address, source })?;

    let local = listener.local_addr().map_err(|source| ListenerError::Bind { address, source })?;
    tracing::info!(
        address = %local,
        max_connections = config.max_connections,
        "Listener bound"
    );
    Ok(listener)
}
