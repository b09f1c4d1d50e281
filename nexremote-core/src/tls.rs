//! Secure transport endpoint (spec §4.B): self-signed certificate cache
//! and a `tokio-rustls` acceptor. Client certificate verification is
//! disabled; trust is established at the application layer (approval
//! flow in §4.C), not at the TLS layer.

use crate::error::{ProtocolError, Result};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SanType};
use std::path::Path;
use std::sync::Arc;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::info;

/// A self-signed certificate/key pair in PEM, generated once and cached
/// on disk (10-year validity, CN=localhost, SAN includes 127.0.0.1).
pub struct CertificateCache {
    pub cert_pem: String,
    pub key_pem: String,
}

impl CertificateCache {
    /// Loads `certs/server.crt` + `certs/server.key` under `app_dir`, or
    /// generates and persists a fresh pair if either is missing.
    pub fn load_or_generate(app_dir: &Path) -> Result<Self> {
        let certs_dir = app_dir.join("certs");
        let cert_path = certs_dir.join("server.crt");
        let key_path = certs_dir.join("server.key");

        if cert_path.exists() && key_path.exists() {
            let cert_pem = std::fs::read_to_string(&cert_path)
                .map_err(|e| ProtocolError::Persistence(format!("reading server.crt: {e}")))?;
            let key_pem = std::fs::read_to_string(&key_path)
                .map_err(|e| ProtocolError::Persistence(format!("reading server.key: {e}")))?;
            return Ok(Self { cert_pem, key_pem });
        }

        info!("generating self-signed TLS certificate (10-year validity, CN=localhost)");
        let mut params = CertificateParams::new(vec!["localhost".to_string()])
            .map_err(|e| ProtocolError::Certificate(format!("cert params: {e}")))?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "localhost");
        params.distinguished_name = dn;
        params.subject_alt_names = vec![
            SanType::DnsName("localhost".try_into().unwrap()),
            SanType::IpAddress(std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1))),
        ];
        let not_before = time::OffsetDateTime::now_utc();
        params.not_before = not_before;
        params.not_after = not_before + time::Duration::days(3650);

        let key_pair = KeyPair::generate()
            .map_err(|e| ProtocolError::Certificate(format!("key generation: {e}")))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| ProtocolError::Certificate(format!("self-signing: {e}")))?;

        let cert_pem = cert.pem();
        let key_pem = key_pair.serialize_pem();

        std::fs::create_dir_all(&certs_dir)
            .map_err(|e| ProtocolError::Persistence(format!("creating certs dir: {e}")))?;
        std::fs::write(&cert_path, &cert_pem)
            .map_err(|e| ProtocolError::Persistence(format!("writing server.crt: {e}")))?;
        std::fs::write(&key_path, &key_pem)
            .map_err(|e| ProtocolError::Persistence(format!("writing server.key: {e}")))?;

        Ok(Self { cert_pem, key_pem })
    }

    /// Builds a TLS 1.3-only acceptor with client authentication disabled.
    pub fn into_acceptor(self) -> Result<TlsAcceptor> {
        let certs: Vec<CertificateDer<'static>> =
            rustls_pemfile::certs(&mut self.cert_pem.as_bytes())
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| ProtocolError::Certificate(format!("parsing server.crt: {e}")))?;
        let key: PrivateKeyDer<'static> =
            rustls_pemfile::private_key(&mut self.key_pem.as_bytes())
                .map_err(|e| ProtocolError::Certificate(format!("parsing server.key: {e}")))?
                .ok_or_else(|| ProtocolError::Certificate("no private key found".into()))?;

        let config = ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ProtocolError::Tls(e))?;

        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_caches_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let first = CertificateCache::load_or_generate(dir.path()).unwrap();
        assert!(first.cert_pem.contains("BEGIN CERTIFICATE"));
        let second = CertificateCache::load_or_generate(dir.path()).unwrap();
        assert_eq!(first.cert_pem, second.cert_pem, "cached cert should be reused");
    }

    #[test]
    fn builds_tls13_acceptor() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CertificateCache::load_or_generate(dir.path()).unwrap();
        cache.into_acceptor().expect("acceptor should build from generated cert");
    }
}
