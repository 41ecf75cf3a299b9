//! TLS certificate loading for the HTTPS listener.

use std::io;
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

use crate::config::TlsConfig;

/// Load a PEM certificate chain and private key.
pub async fn load_tls_config(config: &TlsConfig) -> Result<RustlsConfig, io::Error> {
    let cert_path = Path::new(&config.cert_path);
    let key_path = Path::new(&config.key_path);

    for (what, path) in [("Certificate", cert_path), ("Private key", key_path)] {
        if !path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} file not found: {:?}", what, path),
            ));
        }
    }

    RustlsConfig::from_pem_file(cert_path, key_path).await
}
