//! Stanza routing table and delivery engine.
//!
//! The [`Router`] owns the hosted domains, the per-user list of bound
//! streams and a lazily populated cache of per-user blocking lists. Routing
//! follows RFC 6121 §8.5 server rules:
//!
//! 1. Stanzas from a sender on the recipient's blocking list are refused
//!    (unless blocking is bypassed).
//! 2. Non-hosted domains are handed to the outbound federation provider.
//! 3. A full JID is delivered to the matching resource only.
//! 4. A bare JID receives messages on its highest-priority resource and every
//!    other stanza on all resources.
//!
//! The routing table and the blocking-list cache sit behind two independent
//! locks. Neither lock is held while a stream's `send_element` runs. A cache
//! miss fills the entry while holding only the blocking-list lock, so a
//! concurrent [`Router::reload_block_list`] waits for the fill and then drops
//! it.

pub mod config;
pub mod hosts;

pub use config::{HostConfig, RouterConfig, TlsConfig};
pub use hosts::{HostCertificate, DEFAULT_DOMAIN};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use jid::{BareJid, Jid};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::c2s::C2sStream;
use crate::cluster::{Cluster, ClusterMessage};
use crate::jid_match::{self, JidShape};
use crate::s2s::S2sOutProvider;
use crate::stanza::Stanza;
use crate::storage::{Storage, StorageError};
use crate::XmppError;

/// Routing failures returned to the stanza-processing layer.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The sender is on the recipient's blocking list.
    #[error("Destination JID is blocked")]
    BlockedJid,

    /// The destination account does not exist.
    #[error("Account does not exist")]
    NotExistingAccount,

    /// The destination account exists but has no bound resource.
    #[error("User not authenticated")]
    NotAuthenticated,

    /// The addressed resource is not bound.
    #[error("Resource not found")]
    ResourceNotFound,

    /// No outbound federation channel could be obtained.
    #[error("Failed remote connection")]
    FailedRemoteConnect,

    /// The stanza has no `to` address.
    #[error("Stanza has no destination")]
    MissingDestination,

    /// A remote route needs the sender's domain.
    #[error("Stanza has no sender")]
    MissingSender,

    /// Account lookup failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Per-call routing switches.
#[derive(Debug, Clone, Copy, Default)]
struct RouteOptions {
    ignore_blocking: bool,
    /// Skip streams bound on other cluster nodes.
    local_only: bool,
}

/// State guarded by the routing lock.
struct RoutingTable {
    hosts: HashMap<String, Arc<HostCertificate>>,
    streams: HashMap<String, Vec<Arc<dyn C2sStream>>>,
    s2s_out_provider: Option<Arc<dyn S2sOutProvider>>,
    cluster: Option<Arc<dyn Cluster>>,
}

/// XMPP stanza router.
pub struct Router {
    table: RwLock<RoutingTable>,
    block_lists: tokio::sync::RwLock<HashMap<String, Vec<Jid>>>,
    storage: Arc<dyn Storage>,
}

impl Router {
    /// Create a router serving the configured hosts.
    ///
    /// With no hosts configured the router serves [`DEFAULT_DOMAIN`] with a
    /// self-signed certificate.
    pub fn new(config: &RouterConfig, storage: Arc<dyn Storage>) -> Result<Self, XmppError> {
        let mut hosts = HashMap::new();
        if config.hosts.is_empty() {
            let cert = HostCertificate::self_signed(DEFAULT_DOMAIN)?;
            hosts.insert(DEFAULT_DOMAIN.to_string(), Arc::new(cert));
        } else {
            for host in &config.hosts {
                let name = normalize_host(&host.name)?;
                let cert = HostCertificate::from_config(host)?;
                hosts.insert(name, Arc::new(cert));
            }
        }

        info!(hosts = hosts.len(), "Router initialized");

        Ok(Self {
            table: RwLock::new(RoutingTable {
                hosts,
                streams: HashMap::new(),
                s2s_out_provider: None,
                cluster: None,
            }),
            block_lists: tokio::sync::RwLock::new(HashMap::new()),
            storage,
        })
    }

    /// Names of all hosted domains.
    pub fn host_names(&self) -> Vec<String> {
        let table = self.table.read().expect("routing table lock poisoned");
        table.hosts.keys().cloned().collect()
    }

    /// Whether `domain` is hosted by this server.
    pub fn is_local_host(&self, domain: &str) -> bool {
        let table = self.table.read().expect("routing table lock poisoned");
        table.hosts.contains_key(domain)
    }

    /// Credentials of all hosted domains.
    pub fn certificates(&self) -> Vec<Arc<HostCertificate>> {
        let table = self.table.read().expect("routing table lock poisoned");
        table.hosts.values().cloned().collect()
    }

    /// Set the provider used for stanzas addressed to other servers.
    pub fn set_s2s_out_provider(&self, provider: Arc<dyn S2sOutProvider>) {
        let mut table = self.table.write().expect("routing table lock poisoned");
        table.s2s_out_provider = Some(provider);
    }

    /// Join a cluster: local binds and unbinds are announced to it from now on.
    pub fn set_cluster(&self, cluster: Arc<dyn Cluster>) {
        let mut table = self.table.write().expect("routing table lock poisoned");
        table.cluster = Some(cluster);
    }

    /// Mark a stream as bound.
    ///
    /// Streams without a resource are ignored. Binding the same resource twice
    /// without unbinding leaves both entries in the list.
    pub fn bind(&self, stream: Arc<dyn C2sStream>) {
        if stream.resource().is_empty() {
            return;
        }
        let cluster = {
            let mut table = self.table.write().expect("routing table lock poisoned");
            table
                .streams
                .entry(stream.username().to_string())
                .or_default()
                .push(Arc::clone(&stream));
            table.cluster.clone()
        };

        info!(
            username = %stream.username(),
            resource = %stream.resource(),
            origin = ?stream.origin_node(),
            "Bound c2s stream"
        );

        if stream.origin_node().is_none() {
            if let Some(cluster) = cluster {
                announce(cluster.as_ref(), stream.as_ref(), true);
            }
        }
    }

    /// Remove a previously bound stream.
    ///
    /// The first entry carrying the same resource and origin is removed; the
    /// user disappears from the table with their last resource.
    pub fn unbind(&self, stream: &dyn C2sStream) {
        if stream.resource().is_empty() {
            return;
        }
        let removed = self.remove_binding(stream.username(), stream.resource(), stream.origin_node());
        if removed.is_none() {
            debug!(
                username = %stream.username(),
                resource = %stream.resource(),
                "Unbind of unknown stream"
            );
            return;
        }

        info!(
            username = %stream.username(),
            resource = %stream.resource(),
            origin = ?stream.origin_node(),
            "Unbound c2s stream"
        );

        if stream.origin_node().is_none() {
            let cluster = {
                let table = self.table.read().expect("routing table lock poisoned");
                table.cluster.clone()
            };
            if let Some(cluster) = cluster {
                announce(cluster.as_ref(), stream, false);
            }
        }
    }

    /// Remove the binding of `username/resource` owned by `origin`.
    pub(crate) fn remove_binding(
        &self,
        username: &str,
        resource: &str,
        origin: Option<&str>,
    ) -> Option<Arc<dyn C2sStream>> {
        let mut table = self.table.write().expect("routing table lock poisoned");
        let streams = table.streams.get_mut(username)?;
        let index = streams
            .iter()
            .position(|s| s.resource() == resource && s.origin_node() == origin)?;
        let removed = streams.remove(index);
        if streams.is_empty() {
            table.streams.remove(username);
        }
        Some(removed)
    }

    /// Drop every binding announced by cluster node `node`.
    ///
    /// Returns the number of removed bindings.
    pub fn unbind_node(&self, node: &str) -> usize {
        let mut table = self.table.write().expect("routing table lock poisoned");
        let mut removed = 0;
        table.streams.retain(|_, streams| {
            let before = streams.len();
            streams.retain(|s| s.origin_node() != Some(node));
            removed += before - streams.len();
            !streams.is_empty()
        });
        drop(table);

        if removed > 0 {
            info!(node = %node, removed, "Removed bindings of cluster node");
        }
        removed
    }

    /// Snapshot of the streams bound for `username`, in bind order.
    pub fn user_streams(&self, username: &str) -> Vec<Arc<dyn C2sStream>> {
        let table = self.table.read().expect("routing table lock poisoned");
        table.streams.get(username).cloned().unwrap_or_default()
    }

    /// Full JIDs of every locally connected bound stream.
    pub fn local_jids(&self) -> Vec<Jid> {
        let table = self.table.read().expect("routing table lock poisoned");
        table
            .streams
            .values()
            .flatten()
            .filter(|s| s.origin_node().is_none())
            .filter_map(|s| s.jid())
            .collect()
    }

    /// Whether `jid` matches an entry of `username`'s blocking list.
    pub async fn is_blocked_jid(&self, jid: &Jid, username: &str) -> bool {
        self.block_list(username)
            .await
            .iter()
            .any(|blocked| jid_match::matches_blocked(jid, blocked))
    }

    /// Drop the cached blocking list of `username`; the next check refetches it.
    pub async fn reload_block_list(&self, username: &str) {
        let mut lists = self.block_lists.write().await;
        lists.remove(username);
        info!(username = %username, "Block list reloaded");
    }

    async fn block_list(&self, username: &str) -> Vec<Jid> {
        {
            let lists = self.block_lists.read().await;
            if let Some(list) = lists.get(username) {
                return list.clone();
            }
        }

        let mut lists = self.block_lists.write().await;
        // Filled by another caller while waiting for the write guard
        if let Some(list) = lists.get(username) {
            return list.clone();
        }

        let items = match self.storage.fetch_block_list_items(username).await {
            Ok(items) => items,
            Err(e) => {
                warn!(username = %username, error = %e, "Failed to fetch block list");
                return Vec::new();
            }
        };

        let list: Vec<Jid> = items
            .iter()
            .filter_map(|item| match item.jid.parse::<Jid>() {
                Ok(jid) => Some(jid),
                Err(e) => {
                    warn!(username = %username, jid = %item.jid, error = %e, "Skipping invalid block list entry");
                    None
                }
            })
            .collect();

        lists.insert(username.to_string(), list.clone());
        list
    }

    /// Route a stanza, enforcing the recipient's blocking list.
    #[instrument(skip(self, stanza), fields(kind = stanza.name(), to = ?stanza.to()))]
    pub async fn route(&self, stanza: Stanza) -> Result<(), RouterError> {
        self.route_with(stanza, RouteOptions::default()).await
    }

    /// Route a stanza without consulting blocking lists.
    ///
    /// Used for server-generated stanzas.
    #[instrument(skip(self, stanza), fields(kind = stanza.name(), to = ?stanza.to()))]
    pub async fn must_route(&self, stanza: Stanza) -> Result<(), RouterError> {
        self.route_with(
            stanza,
            RouteOptions {
                ignore_blocking: true,
                ..Default::default()
            },
        )
        .await
    }

    /// Route a stanza forwarded by another cluster node.
    ///
    /// Blocking was enforced at the origin node and only locally connected
    /// streams are considered, so forwarded stanzas never bounce between nodes.
    #[instrument(skip(self, stanza), fields(kind = stanza.name(), to = ?stanza.to()))]
    pub async fn route_from_cluster(&self, stanza: Stanza) -> Result<(), RouterError> {
        self.route_with(
            stanza,
            RouteOptions {
                ignore_blocking: true,
                local_only: true,
            },
        )
        .await
    }

    async fn route_with(&self, stanza: Stanza, opts: RouteOptions) -> Result<(), RouterError> {
        let to = stanza.to().cloned().ok_or(RouterError::MissingDestination)?;

        if !opts.ignore_blocking && !jid_match::is_server(&to) {
            if let Some(from) = stanza.from() {
                if self.is_blocked_jid(from, jid_match::node_of(&to)).await {
                    debug!(from = %from, "Sender is blocked by recipient");
                    return Err(RouterError::BlockedJid);
                }
            }
        }

        if !self.is_local_host(jid_match::domain_of(&to)) {
            return self.remote_route(stanza, &to).await;
        }

        let username = jid_match::node_of(&to);
        let mut recipients = self.user_streams(username);
        if opts.local_only {
            recipients.retain(|s| s.origin_node().is_none());
        }

        if recipients.is_empty() {
            return if self.storage.user_exists(username).await? {
                Err(RouterError::NotAuthenticated)
            } else {
                Err(RouterError::NotExistingAccount)
            };
        }

        if jid_match::shape(&to) == JidShape::FullWithUser {
            let resource = jid_match::resource_of(&to);
            let target = recipients
                .iter()
                .filter(|s| s.resource() == resource)
                .min_by_key(|s| s.origin_node().is_some())
                .ok_or(RouterError::ResourceNotFound)?;
            debug!(resource = %resource, "Delivering to bound resource");
            target.send_element(stanza);
            return Ok(());
        }

        if stanza.is_message() {
            let target = highest_priority(&recipients);
            debug!(resource = %target.resource(), "Delivering message to highest priority resource");
            target.send_element(stanza);
        } else {
            debug!(count = recipients.len(), "Broadcasting to all bound resources");
            for stream in &recipients {
                stream.send_element(stanza.clone());
            }
        }
        Ok(())
    }

    async fn remote_route(&self, stanza: Stanza, to: &Jid) -> Result<(), RouterError> {
        let provider = {
            let table = self.table.read().expect("routing table lock poisoned");
            table.s2s_out_provider.clone()
        };
        let Some(provider) = provider else {
            debug!(domain = %jid_match::domain_of(to), "No s2s provider configured");
            return Err(RouterError::FailedRemoteConnect);
        };
        let from = stanza.from().ok_or(RouterError::MissingSender)?;
        let local_domain = jid_match::domain_of(from).to_string();
        let remote_domain = jid_match::domain_of(to);

        match provider.get_s2s_out(&local_domain, remote_domain).await {
            Ok(out) => {
                debug!(local = %local_domain, remote = %remote_domain, "Routing to remote server");
                out.send_element(stanza);
                Ok(())
            }
            Err(e) => {
                error!(local = %local_domain, remote = %remote_domain, error = %e, "Failed to obtain s2s connection");
                Err(RouterError::FailedRemoteConnect)
            }
        }
    }
}

/// Pick the stream with the highest presence priority; the earliest bound wins ties.
fn highest_priority(streams: &[Arc<dyn C2sStream>]) -> &Arc<dyn C2sStream> {
    let mut target = &streams[0];
    let mut highest = target.priority();
    for stream in &streams[1..] {
        let priority = stream.priority();
        if priority > highest {
            target = stream;
            highest = priority;
        }
    }
    target
}

/// The configured host name in the form JID parsing gives incoming domains.
fn normalize_host(name: &str) -> Result<String, XmppError> {
    let jid: BareJid = name
        .parse()
        .map_err(|e| XmppError::config(format!("Invalid host name {}: {}", name, e)))?;
    if jid.node().is_some() {
        return Err(XmppError::config(format!("Host name {} has a local part", name)));
    }
    Ok(jid.domain().as_str().to_string())
}

/// Broadcast a bind or unbind of a local stream to the cluster.
fn announce(cluster: &dyn Cluster, stream: &dyn C2sStream, bound: bool) {
    let Some(jid) = stream.jid() else {
        warn!(username = %stream.username(), "Cannot announce stream without a valid JID");
        return;
    };
    let node = cluster.local_node().to_string();
    let message = if bound {
        ClusterMessage::Bind {
            node,
            jids: vec![jid],
        }
    } else {
        ClusterMessage::Unbind {
            node,
            jids: vec![jid],
        }
    };
    match message.encode() {
        Ok(payload) => cluster.broadcast(payload),
        Err(e) => error!(error = %e, "Failed to encode cluster message"),
    }
}
