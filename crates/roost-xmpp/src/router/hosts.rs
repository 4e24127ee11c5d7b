//! TLS credentials of locally hosted domains.

use std::fs::File;
use std::io::BufReader;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls_pemfile::{certs, pkcs8_private_keys};
use tracing::{debug, info};

use super::config::HostConfig;
use crate::XmppError;

/// Domain served when no hosts are configured.
pub const DEFAULT_DOMAIN: &str = "localhost";

/// Certificate chain and private key served for one domain.
#[derive(Debug)]
pub struct HostCertificate {
    pub domain: String,
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub private_key: PrivateKeyDer<'static>,
}

impl HostCertificate {
    /// Load the credential for a configured host.
    ///
    /// Hosts without TLS files get a freshly generated self-signed certificate.
    pub fn from_config(host: &HostConfig) -> Result<Self, XmppError> {
        match &host.tls {
            Some(tls) => Self::load_pem(&host.name, &tls.cert_path, &tls.privkey_path),
            None => Self::self_signed(&host.name),
        }
    }

    /// Load a PEM certificate chain and PKCS#8 key from disk.
    pub fn load_pem(domain: &str, cert_path: &str, privkey_path: &str) -> Result<Self, XmppError> {
        let cert_file = File::open(cert_path).map_err(|e| {
            XmppError::config(format!("Failed to open cert file {}: {}", cert_path, e))
        })?;
        let key_file = File::open(privkey_path).map_err(|e| {
            XmppError::config(format!("Failed to open key file {}: {}", privkey_path, e))
        })?;

        let cert_chain: Vec<CertificateDer<'static>> = certs(&mut BufReader::new(cert_file))
            .collect::<Result<_, _>>()
            .map_err(|e| XmppError::tls(format!("Invalid certificate in {}: {}", cert_path, e)))?;
        if cert_chain.is_empty() {
            return Err(XmppError::tls(format!("No certificate found in {}", cert_path)));
        }

        let key = pkcs8_private_keys(&mut BufReader::new(key_file))
            .next()
            .ok_or_else(|| XmppError::tls(format!("No private key found in {}", privkey_path)))?
            .map_err(|e| XmppError::tls(format!("Invalid private key in {}: {}", privkey_path, e)))?;

        debug!(domain = %domain, certs = cert_chain.len(), "Loaded host certificate");

        Ok(Self {
            domain: domain.to_string(),
            cert_chain,
            private_key: PrivateKeyDer::Pkcs8(key),
        })
    }

    /// Generate a self-signed credential for `domain`.
    pub fn self_signed(domain: &str) -> Result<Self, XmppError> {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec![domain.to_string()])
                .map_err(|e| XmppError::tls(format!("Failed to generate certificate: {}", e)))?;

        info!(domain = %domain, "Generated self-signed certificate");

        Ok(Self {
            domain: domain.to_string(),
            cert_chain: vec![cert.der().clone()],
            private_key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::config::TlsConfig;
    use std::io::Write;

    #[test]
    fn test_self_signed_credential() {
        let cert = HostCertificate::self_signed("example.com").unwrap();
        assert_eq!(cert.domain, "example.com");
        assert_eq!(cert.cert_chain.len(), 1);
    }

    #[test]
    fn test_load_pem_files() {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["example.com".to_string()]).unwrap();

        let mut cert_file = tempfile::NamedTempFile::new().unwrap();
        cert_file.write_all(cert.pem().as_bytes()).unwrap();
        let mut key_file = tempfile::NamedTempFile::new().unwrap();
        key_file.write_all(key_pair.serialize_pem().as_bytes()).unwrap();

        let host = HostConfig {
            name: "example.com".to_string(),
            tls: Some(TlsConfig {
                cert_path: cert_file.path().to_string_lossy().into_owned(),
                privkey_path: key_file.path().to_string_lossy().into_owned(),
            }),
        };
        let loaded = HostCertificate::from_config(&host).unwrap();
        assert_eq!(loaded.domain, "example.com");
        assert_eq!(loaded.cert_chain.len(), 1);
    }

    #[test]
    fn test_missing_cert_file_is_config_error() {
        let result = HostCertificate::load_pem("example.com", "/nonexistent.crt", "/nonexistent.key");
        assert!(matches!(result, Err(XmppError::Config(_))));
    }
}
