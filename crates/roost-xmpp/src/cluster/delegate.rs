//! Inbound cluster traffic and membership events.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::{Cluster, ClusterError, ClusterMessage, ClusterNode, RemoteC2s};
use crate::jid_match::{node_of, resource_of};
use crate::router::Router;
use crate::stanza::Stanza;

/// Callbacks invoked by the cluster transport and membership layer.
#[async_trait]
pub trait ClusterDelegate: Send + Sync {
    /// Apply a payload received from another node.
    async fn notify_message(&self, payload: &[u8]) -> Result<(), ClusterError>;

    async fn node_joined(&self, node: &ClusterNode);

    async fn node_updated(&self, node: &ClusterNode);

    async fn node_left(&self, node: &ClusterNode);
}

/// Applies cluster traffic to a [`Router`].
pub struct RouterClusterDelegate {
    router: Arc<Router>,
    cluster: Arc<dyn Cluster>,
}

impl RouterClusterDelegate {
    pub fn new(router: Arc<Router>, cluster: Arc<dyn Cluster>) -> Self {
        Self { router, cluster }
    }
}

#[async_trait]
impl ClusterDelegate for RouterClusterDelegate {
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    async fn notify_message(&self, payload: &[u8]) -> Result<(), ClusterError> {
        let message = ClusterMessage::decode(payload).map_err(|e| {
            warn!(error = %e, "Dropping undecodable cluster message");
            e
        })?;

        match message {
            ClusterMessage::Bind { node, jids } => {
                for jid in jids {
                    match RemoteC2s::new(jid.clone(), node.as_str(), Arc::clone(&self.cluster)) {
                        Some(stream) => self.router.bind(Arc::new(stream)),
                        None => warn!(jid = %jid, node = %node, "Ignoring remote bind without resource"),
                    }
                }
            }
            ClusterMessage::Unbind { node, jids } => {
                for jid in jids {
                    self.router
                        .remove_binding(node_of(&jid), resource_of(&jid), Some(node.as_str()));
                }
                info!(node = %node, "Applied remote unbind");
            }
            ClusterMessage::Send { node, element } => {
                let stanza = Stanza::try_from(element)
                    .map_err(|e| ClusterError::InvalidStanza(e.to_string()))?;
                self.router.route_from_cluster(stanza).await.map_err(|e| {
                    warn!(node = %node, error = %e, "Failed to deliver clustered stanza");
                    e
                })?;
            }
        }
        Ok(())
    }

    async fn node_joined(&self, node: &ClusterNode) {
        info!(node = %node.name, address = ?node.address, "Cluster node joined");

        let jids = self.router.local_jids();
        if jids.is_empty() {
            return;
        }
        let message = ClusterMessage::Bind {
            node: self.cluster.local_node().to_string(),
            jids,
        };
        match message.encode() {
            Ok(payload) => self.cluster.send(&node.name, payload),
            Err(e) => warn!(node = %node.name, error = %e, "Failed to encode bindings for joined node"),
        }
    }

    async fn node_updated(&self, node: &ClusterNode) {
        info!(node = %node.name, address = ?node.address, "Cluster node updated");
    }

    async fn node_left(&self, node: &ClusterNode) {
        let removed = self.router.unbind_node(&node.name);
        info!(node = %node.name, removed, "Cluster node left");
    }
}
