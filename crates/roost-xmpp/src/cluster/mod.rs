//! Cluster propagation of resource bindings and stanza deliveries.
//!
//! Nodes exchange three messages: `bind` and `unbind` announce resources
//! connected to the sending node, `send` forwards a stanza to a resource
//! connected to the receiving node. The transport and membership layer sit
//! behind [`Cluster`]; incoming traffic enters through [`ClusterDelegate`].

mod delegate;
mod message;
mod remote;

pub use delegate::{ClusterDelegate, RouterClusterDelegate};
pub use message::{ClusterMessage, MessageType};
pub use remote::RemoteC2s;

use thiserror::Error;

use crate::router::RouterError;

/// Errors raised while encoding, decoding or applying cluster messages.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Failed to encode cluster message: {0}")]
    Encode(#[source] bincode::Error),

    #[error("Failed to decode cluster message: {0}")]
    Decode(#[source] bincode::Error),

    #[error("Invalid JID in cluster message: {0}")]
    InvalidJid(String),

    #[error("Invalid stanza in cluster message: {0}")]
    InvalidStanza(String),

    #[error("Failed to route clustered stanza: {0}")]
    Route(#[from] RouterError),
}

/// A member of the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    pub name: String,
    pub address: Option<String>,
}

impl ClusterNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
        }
    }
}

/// Outbound side of the cluster transport.
///
/// Both operations hand the payload off and return; delivery failures are the
/// transport's concern.
pub trait Cluster: Send + Sync {
    /// Name of this node.
    fn local_node(&self) -> &str;

    /// Send a payload to every other node.
    fn broadcast(&self, payload: Vec<u8>);

    /// Send a payload to one node.
    fn send(&self, node: &str, payload: Vec<u8>);
}
