//! Router configuration.

use serde::Deserialize;

/// TLS credential files for a hosted domain.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM certificate chain
    pub cert_path: String,
    /// PEM PKCS#8 private key
    pub privkey_path: String,
}

/// One locally hosted domain.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HostConfig {
    pub name: String,
    /// Omit to generate a self-signed credential.
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

/// Router settings.
///
/// An empty host list serves `localhost` with a self-signed certificate.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RouterConfig {
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}
