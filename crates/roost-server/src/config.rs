//! Server configuration file.
//!
//! ```toml
//! [[router.hosts]]
//! name = "example.org"
//! tls = { cert_path = "certs/example.org.pem", privkey_path = "certs/example.org.key" }
//!
//! [modules]
//! enabled = ["roster", "offline", "blocking_command", "ping"]
//!
//! [shutdown]
//! timeout_secs = 30
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use roost_xmpp::{ModulesConfig, RouterConfig};
use serde::Deserialize;
use tracing::debug;

/// Config file read when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "roost.toml";

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub router: RouterConfig,
    pub modules: ModulesConfig,
    pub shutdown: ShutdownConfig,
}

/// Graceful shutdown settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShutdownConfig {
    pub timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ServerConfig {
    /// Load configuration from `path`, or from [`DEFAULT_CONFIG_PATH`] when
    /// none is given.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let mut config = if !explicit && !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        } else {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::parse(&raw).with_context(|| format!("Invalid config file {}", path.display()))?
        };

        config.apply_env(std::env::var("ROOST_SHUTDOWN_TIMEOUT_SECS").ok().as_deref())?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env(&mut self, shutdown_timeout: Option<&str>) -> Result<()> {
        if let Some(value) = shutdown_timeout {
            self.shutdown.timeout_secs = value
                .parse()
                .with_context(|| format!("ROOST_SHUTDOWN_TIMEOUT_SECS is not a number: {value}"))?;
        }
        Ok(())
    }
}
