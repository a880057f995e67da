//! TLS configuration loading.
//!
//! When both a key file and a certificate file are configured, listeners
//! wrap accepted connections in a TLS acceptor built from this material.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::config::SslConfig;
use crate::error::{Result, ServeError};

/// Loads the certificate chain from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|err| ServeError::ConfigError(format!("certificate {}: {err}", path.display())))?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|err| ServeError::ConfigError(format!("certificate {}: {err}", path.display())))?;

    if certs.is_empty() {
        return Err(ServeError::ConfigError(format!(
            "certificate {}: no certificates found",
            path.display()
        )));
    }
    Ok(certs)
}

/// Loads the private key from a PEM file (PKCS#8, PKCS#1 or SEC1).
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|err| ServeError::ConfigError(format!("key {}: {err}", path.display())))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|err| ServeError::ConfigError(format!("key {}: {err}", path.display())))?
        .ok_or_else(|| {
            ServeError::ConfigError(format!("key {}: no private key found", path.display()))
        })
}

/// Builds a TLS acceptor from the configured key material.
pub fn acceptor(ssl: &SslConfig) -> Result<TlsAcceptor> {
    let certs = load_certs(Path::new(&ssl.cert_file))?;
    let key = load_private_key(Path::new(&ssl.key_file))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| ServeError::ConfigError(format!("TLS configuration: {err}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_error() {
        assert!(load_certs(Path::new("/nonexistent/cert.pem")).is_err());
        assert!(load_private_key(Path::new("/nonexistent/key.pem")).is_err());

        let ssl = SslConfig {
            key_file: "/nonexistent/key.pem".into(),
            cert_file: "/nonexistent/cert.pem".into(),
        };
        assert!(acceptor(&ssl).is_err());
    }

    #[test]
    fn test_empty_pem_rejected() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        assert!(load_certs(tmp.path()).is_err());
        assert!(load_private_key(tmp.path()).is_err());
    }
}
