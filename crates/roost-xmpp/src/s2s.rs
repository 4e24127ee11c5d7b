//! Outbound federation contract.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::stanza::Stanza;

/// Errors provisioning an outbound server-to-server channel.
#[derive(Debug, Error)]
pub enum S2sError {
    /// The remote domain could not be reached.
    #[error("Remote domain unreachable: {0}")]
    Unreachable(String),

    /// The remote server rejected authentication.
    #[error("Remote authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Any other provider failure.
    #[error("S2S error: {0}")]
    Other(String),
}

/// An established outbound federation channel.
pub trait S2sOut: Send + Sync {
    /// Queue a stanza for the remote server. Must not block.
    fn send_element(&self, stanza: Stanza);
}

/// Supplies outbound channels keyed by (local domain, remote domain).
#[async_trait]
pub trait S2sOutProvider: Send + Sync {
    async fn get_s2s_out(
        &self,
        local_domain: &str,
        remote_domain: &str,
    ) -> Result<Arc<dyn S2sOut>, S2sError>;
}
