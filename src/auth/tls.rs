// mTLS credential loading for the gRPC channel

use std::path::{Path, PathBuf};

use tonic::transport::{Certificate, ClientTlsConfig, Identity};

use crate::error::{BenchError, Result};

/// Locations of the client identity and the trusted server/CA certificate
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    pub ca_cert: PathBuf,
    /// Overrides the name checked against the server certificate
    pub domain: Option<String>,
}

impl Default for TlsPaths {
    fn default() -> Self {
        Self {
            client_cert: PathBuf::from("./client.crt"),
            client_key: PathBuf::from("./client.key"),
            ca_cert: PathBuf::from("./server.crt"),
            domain: None,
        }
    }
}

/// Load the client certificate/key pair and the server CA, and build the
/// channel's TLS config. Every file is parsed up front so a bad file fails
/// here instead of during the handshake.
pub fn load_tls_credentials(paths: &TlsPaths) -> Result<ClientTlsConfig> {
    let cert_pem = read_pem(&paths.client_cert)?;
    let key_pem = read_pem(&paths.client_key)?;
    let ca_pem = read_pem(&paths.ca_cert)?;

    let client_certs = count_certificates(&cert_pem, &paths.client_cert)?;
    ensure_private_key(&key_pem, &paths.client_key)?;
    let ca_certs = count_certificates(&ca_pem, &paths.ca_cert)?;

    tracing::debug!(
        client_certs,
        ca_certs,
        "Loaded mTLS credentials from {}, {}, {}",
        paths.client_cert.display(),
        paths.client_key.display(),
        paths.ca_cert.display()
    );

    let mut config = ClientTlsConfig::new()
        .identity(Identity::from_pem(cert_pem, key_pem))
        .ca_certificate(Certificate::from_pem(ca_pem));

    if let Some(domain) = &paths.domain {
        config = config.domain_name(domain.clone());
    }

    Ok(config)
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| BenchError::Tls(format!("failed to read {}: {}", path.display(), e)))
}

fn count_certificates(pem: &[u8], path: &Path) -> Result<usize> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| BenchError::Tls(format!("failed to parse {}: {}", path.display(), e)))?;

    if certs.is_empty() {
        return Err(BenchError::Tls(format!(
            "no PEM certificate found in {}",
            path.display()
        )));
    }
    Ok(certs.len())
}

fn ensure_private_key(pem: &[u8], path: &Path) -> Result<()> {
    match rustls_pemfile::private_key(&mut &pem[..]) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(BenchError::Tls(format!(
            "no private key found in {}",
            path.display()
        ))),
        Err(e) => Err(BenchError::Tls(format!(
            "failed to parse {}: {}",
            path.display(),
            e
        ))),
    }
}
