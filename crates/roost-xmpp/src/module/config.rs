//! Extension handler configuration.

use std::collections::HashSet;

use serde::Deserialize;

/// Optional extension handlers. Service discovery is always on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleName {
    Roster,
    LastActivity,
    Private,
    Vcard,
    Registration,
    Version,
    Offline,
    BlockingCommand,
    Ping,
}

/// Offline storage settings (XEP-0160).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct OfflineConfig {
    /// Maximum queued messages per user
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

fn default_queue_size() -> usize {
    2500
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
        }
    }
}

/// In-band registration settings (XEP-0077).
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Unauthenticated streams may create accounts
    pub allow_registration: bool,
    /// Authenticated users may change their password
    pub allow_change: bool,
    /// Authenticated users may delete their account
    pub allow_cancel: bool,
}

/// Software version settings (XEP-0092).
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VersionConfig {
    pub show_os: bool,
}

/// Extension handler selection and settings.
///
/// Roster and ping take no settings; unknown sections are rejected.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ModulesConfig {
    pub enabled: HashSet<ModuleName>,
    pub offline: OfflineConfig,
    pub registration: RegistrationConfig,
    pub version: VersionConfig,
}

impl ModulesConfig {
    pub fn is_enabled(&self, name: ModuleName) -> bool {
        self.enabled.contains(&name)
    }
}
