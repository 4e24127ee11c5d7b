//! Streams bound on other cluster nodes.

use std::fmt;
use std::sync::Arc;

use jid::Jid;
use tracing::{debug, error};
use xmpp_parsers::presence::Presence;

use super::{Cluster, ClusterMessage};
use crate::c2s::C2sStream;
use crate::jid_match::{domain_of, node_of, resource_of};
use crate::stanza::Stanza;

/// A resource connected to another node, as announced by a `bind` message.
///
/// Stanzas delivered to it are forwarded to the owning node in a `send`
/// message addressed to the resource's full JID.
pub struct RemoteC2s {
    jid: Jid,
    username: String,
    domain: String,
    resource: String,
    node: String,
    cluster: Arc<dyn Cluster>,
}

impl RemoteC2s {
    /// Create a handle for `jid` bound on `node`.
    ///
    /// Returns `None` unless `jid` carries both a node and a resource.
    pub fn new(jid: Jid, node: impl Into<String>, cluster: Arc<dyn Cluster>) -> Option<Self> {
        let username = node_of(&jid).to_string();
        let resource = resource_of(&jid).to_string();
        if username.is_empty() || resource.is_empty() {
            return None;
        }
        Some(Self {
            domain: domain_of(&jid).to_string(),
            username,
            resource,
            jid,
            node: node.into(),
            cluster,
        })
    }
}

impl fmt::Debug for RemoteC2s {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteC2s")
            .field("jid", &self.jid)
            .field("node", &self.node)
            .finish()
    }
}

impl C2sStream for RemoteC2s {
    fn username(&self) -> &str {
        &self.username
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn resource(&self) -> &str {
        &self.resource
    }

    fn presence(&self) -> Option<Presence> {
        None
    }

    fn send_element(&self, stanza: Stanza) {
        let message = ClusterMessage::Send {
            node: self.cluster.local_node().to_string(),
            element: stanza.with_to(self.jid.clone()).into(),
        };
        match message.encode() {
            Ok(payload) => {
                debug!(jid = %self.jid, node = %self.node, "Forwarding stanza to cluster node");
                self.cluster.send(&self.node, payload);
            }
            Err(e) => error!(jid = %self.jid, error = %e, "Failed to encode forwarded stanza"),
        }
    }

    fn jid(&self) -> Option<Jid> {
        Some(self.jid.clone())
    }

    fn origin_node(&self) -> Option<&str> {
        Some(&self.node)
    }
}
