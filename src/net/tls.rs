//! TLS configuration and certificate loading.

use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("certificate file not found: {0}")]
    MissingCertificate(PathBuf),
    #[error("private key file not found: {0}")]
    MissingKey(PathBuf),
    #[error("failed to load TLS material: {0}")]
    Load(#[from] std::io::Error),
}

/// Load a rustls config from PEM certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, TlsError> {
    if !cert_path.exists() {
        return Err(TlsError::MissingCertificate(cert_path.to_path_buf()));
    }
    if !key_path.exists() {
        return Err(TlsError::MissingKey(key_path.to_path_buf()));
    }
    Ok(RustlsConfig::from_pem_file(cert_path, key_path).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_files_are_reported() {
        let result =
            load_tls_config(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem")).await;
        assert!(matches!(result, Err(TlsError::MissingCertificate(_))));
    }
}
