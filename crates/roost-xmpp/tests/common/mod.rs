//! Test doubles for exercising the router, cluster and modules through the
//! public API.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use minidom::Element;
use roost_xmpp::cluster::Cluster;
use roost_xmpp::module::{IqHandler, Module};
use roost_xmpp::s2s::{S2sError, S2sOut, S2sOutProvider};
use roost_xmpp::storage::{BlockListItem, InMemoryStorage, RosterItem, Storage, StorageError, User};
use roost_xmpp::{iq_result, C2sStream, Router, RouterConfig, Stanza};
use tokio::sync::Notify;
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::presence::{Presence, Type as PresenceType};

/// Initialize test logging once.
pub fn init_test() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

/// A client stream that records every stanza delivered to it.
pub struct MockC2s {
    pub username: String,
    pub domain: String,
    pub resource: String,
    pub priority: Option<i8>,
    pub origin: Option<String>,
    sent: Mutex<Vec<Stanza>>,
}

impl MockC2s {
    pub fn new(username: &str, resource: &str) -> Self {
        Self {
            username: username.to_string(),
            domain: "localhost".to_string(),
            resource: resource.to_string(),
            priority: None,
            origin: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_priority(mut self, priority: i8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_origin(mut self, node: &str) -> Self {
        self.origin = Some(node.to_string());
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn sent(&self) -> Vec<Stanza> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl C2sStream for MockC2s {
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
        self.priority.map(|priority| {
            let mut presence = Presence::new(PresenceType::None);
            presence.priority = priority;
            presence
        })
    }

    fn send_element(&self, stanza: Stanza) {
        self.sent.lock().unwrap().push(stanza);
    }

    fn origin_node(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

/// Outbound federation channel recording stanzas.
#[derive(Default)]
pub struct MockS2sOut {
    sent: Mutex<Vec<Stanza>>,
}

impl MockS2sOut {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl S2sOut for MockS2sOut {
    fn send_element(&self, stanza: Stanza) {
        self.sent.lock().unwrap().push(stanza);
    }
}

/// Provider handing out one shared channel, or failing every request.
pub struct MockS2sProvider {
    pub out: Arc<MockS2sOut>,
    pub fail: bool,
    pub requests: Mutex<Vec<(String, String)>>,
}

impl MockS2sProvider {
    pub fn new() -> Self {
        Self {
            out: Arc::new(MockS2sOut::default()),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl S2sOutProvider for MockS2sProvider {
    async fn get_s2s_out(&self, local: &str, remote: &str) -> Result<Arc<dyn S2sOut>, S2sError> {
        self.requests
            .lock()
            .unwrap()
            .push((local.to_string(), remote.to_string()));
        if self.fail {
            return Err(S2sError::Unreachable(remote.to_string()));
        }
        Ok(self.out.clone())
    }
}

/// Cluster transport recording outgoing payloads.
pub struct MockCluster {
    pub node: String,
    pub broadcasts: Mutex<Vec<Vec<u8>>>,
    pub sends: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockCluster {
    pub fn new(node: &str) -> Arc<Self> {
        Arc::new(Self {
            node: node.to_string(),
            broadcasts: Mutex::new(Vec::new()),
            sends: Mutex::new(Vec::new()),
        })
    }

    pub fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn sends(&self) -> Vec<(String, Vec<u8>)> {
        self.sends.lock().unwrap().clone()
    }
}

impl Cluster for MockCluster {
    fn local_node(&self) -> &str {
        &self.node
    }

    fn broadcast(&self, payload: Vec<u8>) {
        self.broadcasts.lock().unwrap().push(payload);
    }

    fn send(&self, node: &str, payload: Vec<u8>) {
        self.sends.lock().unwrap().push((node.to_string(), payload));
    }
}

/// In-memory storage with switchable failures and a pausable block-list fetch.
#[derive(Default)]
pub struct ControlledStorage {
    pub inner: InMemoryStorage,
    pub fail_block_list: bool,
    pub fail_user_exists: bool,
    pub block_list_gate: Option<Arc<FetchGate>>,
}

/// Pauses the first fetch that passes through it until released.
pub struct FetchGate {
    armed: AtomicBool,
    /// Notified once the paused fetch has read storage.
    pub reached: Notify,
    pub release: Notify,
}

impl FetchGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            armed: AtomicBool::new(true),
            reached: Notify::new(),
            release: Notify::new(),
        })
    }

    async fn pass(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
    }
}

fn unavailable() -> StorageError {
    StorageError::Internal("backend unavailable".to_string())
}

#[async_trait]
impl Storage for ControlledStorage {
    async fn user_exists(&self, username: &str) -> Result<bool, StorageError> {
        if self.fail_user_exists {
            return Err(unavailable());
        }
        self.inner.user_exists(username).await
    }

    async fn fetch_user(&self, username: &str) -> Result<Option<User>, StorageError> {
        self.inner.fetch_user(username).await
    }

    async fn upsert_user(&self, user: User) -> Result<(), StorageError> {
        self.inner.upsert_user(user).await
    }

    async fn delete_user(&self, username: &str) -> Result<(), StorageError> {
        self.inner.delete_user(username).await
    }

    async fn fetch_block_list_items(&self, username: &str) -> Result<Vec<BlockListItem>, StorageError> {
        if self.fail_block_list {
            return Err(unavailable());
        }
        let items = self.inner.fetch_block_list_items(username).await?;
        if let Some(gate) = &self.block_list_gate {
            gate.pass().await;
        }
        Ok(items)
    }

    async fn insert_block_list_items(&self, items: &[BlockListItem]) -> Result<(), StorageError> {
        self.inner.insert_block_list_items(items).await
    }

    async fn delete_block_list_items(&self, items: &[BlockListItem]) -> Result<(), StorageError> {
        self.inner.delete_block_list_items(items).await
    }

    async fn clear_block_list(&self, username: &str) -> Result<(), StorageError> {
        self.inner.clear_block_list(username).await
    }

    async fn fetch_roster_items(&self, username: &str) -> Result<Vec<RosterItem>, StorageError> {
        self.inner.fetch_roster_items(username).await
    }

    async fn fetch_roster_item(&self, username: &str, jid: &str) -> Result<Option<RosterItem>, StorageError> {
        self.inner.fetch_roster_item(username, jid).await
    }

    async fn upsert_roster_item(&self, item: RosterItem) -> Result<(), StorageError> {
        self.inner.upsert_roster_item(item).await
    }

    async fn delete_roster_item(&self, username: &str, jid: &str) -> Result<(), StorageError> {
        self.inner.delete_roster_item(username, jid).await
    }

    async fn fetch_private_xml(&self, username: &str, namespace: &str) -> Result<Option<Element>, StorageError> {
        self.inner.fetch_private_xml(username, namespace).await
    }

    async fn upsert_private_xml(&self, username: &str, namespace: &str, xml: Element) -> Result<(), StorageError> {
        self.inner.upsert_private_xml(username, namespace, xml).await
    }

    async fn fetch_vcard(&self, username: &str) -> Result<Option<Element>, StorageError> {
        self.inner.fetch_vcard(username).await
    }

    async fn upsert_vcard(&self, username: &str, vcard: Element) -> Result<(), StorageError> {
        self.inner.upsert_vcard(username, vcard).await
    }

    async fn count_offline_messages(&self, username: &str) -> Result<usize, StorageError> {
        self.inner.count_offline_messages(username).await
    }

    async fn insert_offline_message(&self, username: &str, message: Element) -> Result<(), StorageError> {
        self.inner.insert_offline_message(username, message).await
    }

    async fn take_offline_messages(&self, username: &str) -> Result<Vec<Element>, StorageError> {
        self.inner.take_offline_messages(username).await
    }
}

/// Module recording when its shutdown ran.
pub struct OrderModule {
    pub name: &'static str,
    pub log: Arc<Mutex<Vec<&'static str>>>,
    pub delay: Duration,
}

#[async_trait]
impl Module for OrderModule {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn shutdown(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.log.lock().unwrap().push(self.name);
    }
}

/// IQ handler taking requests whose payload is in `namespace`, recording
/// every consultation and every request it handled.
pub struct RecordingIqHandler {
    pub name: &'static str,
    pub namespace: Option<&'static str>,
    pub consulted: Mutex<usize>,
    pub handled: Mutex<Vec<String>>,
}

impl RecordingIqHandler {
    pub fn new(name: &'static str, namespace: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            name,
            namespace,
            consulted: Mutex::new(0),
            handled: Mutex::new(Vec::new()),
        })
    }

    pub fn consulted(&self) -> usize {
        *self.consulted.lock().unwrap()
    }

    pub fn handled(&self) -> Vec<String> {
        self.handled.lock().unwrap().clone()
    }
}

#[async_trait]
impl Module for RecordingIqHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn as_iq_handler(&self) -> Option<&dyn IqHandler> {
        Some(self)
    }
}

#[async_trait]
impl IqHandler for RecordingIqHandler {
    fn matches_iq(&self, iq: &Iq) -> bool {
        *self.consulted.lock().unwrap() += 1;
        let payload = match &iq.payload {
            IqType::Get(elem) | IqType::Set(elem) => elem,
            _ => return false,
        };
        self.namespace.is_some_and(|ns| payload.ns() == ns)
    }

    async fn process_iq(&self, iq: Iq, stream: Arc<dyn C2sStream>) {
        self.handled.lock().unwrap().push(iq.id.clone());
        stream.send_element(iq_result(&iq, None).into());
    }
}

/// A router on `localhost` backed by `storage`.
pub fn router(storage: Arc<dyn Storage>) -> Arc<Router> {
    Arc::new(Router::new(&RouterConfig::default(), storage).unwrap())
}

pub async fn create_user(storage: &dyn Storage, username: &str) {
    storage
        .upsert_user(User {
            username: username.to_string(),
            password: "secret".to_string(),
        })
        .await
        .unwrap();
}
