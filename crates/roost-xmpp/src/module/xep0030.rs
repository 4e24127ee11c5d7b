//! XEP-0030: Service Discovery
//!
//! Answers disco#info for the server and for local accounts, and disco#items
//! with an empty item list. Other handlers register the features they
//! implement at construction time.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use jid::Jid;
use minidom::Element;
use tracing::debug;
use xmpp_parsers::iq::{Iq, IqType};

use super::{send_reply, IqHandler, Module};
use crate::c2s::C2sStream;
use crate::error::iq_result;
use crate::jid_match;
use crate::router::Router;
use crate::storage::Storage;
use crate::XmppError;

/// Service Discovery info namespace.
pub const NS_DISCO_INFO: &str = "http://jabber.org/protocol/disco#info";

/// Service Discovery items namespace.
pub const NS_DISCO_ITEMS: &str = "http://jabber.org/protocol/disco#items";

/// Identity element of a disco#info response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub category: String,
    pub type_: String,
    pub name: Option<String>,
}

impl Identity {
    pub fn new(category: &str, type_: &str, name: Option<&str>) -> Self {
        Self {
            category: category.to_string(),
            type_: type_.to_string(),
            name: name.map(|s| s.to_string()),
        }
    }

    /// Server identity (category="server", type="im").
    pub fn server() -> Self {
        Self::new("server", "im", Some("roost"))
    }

    /// Registered account identity (category="account", type="registered").
    pub fn account() -> Self {
        Self::new("account", "registered", None)
    }
}

/// Service discovery handler.
pub struct DiscoInfo {
    router: Arc<Router>,
    storage: Arc<dyn Storage>,
    server_features: RwLock<Vec<String>>,
    account_features: RwLock<Vec<String>>,
}

impl DiscoInfo {
    pub fn new(router: Arc<Router>, storage: Arc<dyn Storage>) -> Self {
        let disco = Self {
            router,
            storage,
            server_features: RwLock::new(Vec::new()),
            account_features: RwLock::new(Vec::new()),
        };
        disco.register_server_feature(NS_DISCO_INFO);
        disco.register_server_feature(NS_DISCO_ITEMS);
        disco.register_account_feature(NS_DISCO_INFO);
        disco.register_account_feature(NS_DISCO_ITEMS);
        disco
    }

    /// Advertise a feature on the server entity.
    pub fn register_server_feature(&self, feature: &str) {
        let mut features = self.server_features.write().expect("disco features lock poisoned");
        if !features.iter().any(|f| f == feature) {
            features.push(feature.to_string());
        }
    }

    /// Advertise a feature on every account entity.
    pub fn register_account_feature(&self, feature: &str) {
        let mut features = self.account_features.write().expect("disco features lock poisoned");
        if !features.iter().any(|f| f == feature) {
            features.push(feature.to_string());
        }
    }

    pub fn server_features(&self) -> Vec<String> {
        self.server_features.read().expect("disco features lock poisoned").clone()
    }

    pub fn account_features(&self) -> Vec<String> {
        self.account_features.read().expect("disco features lock poisoned").clone()
    }

    async fn handle(&self, iq: &Iq, stream: &dyn C2sStream) -> Result<Iq, XmppError> {
        let IqType::Get(query) = &iq.payload else {
            return Err(XmppError::bad_request(None));
        };
        let node = query.attr("node");

        if query.ns() == NS_DISCO_ITEMS {
            return Ok(iq_result(iq, Some(build_query(NS_DISCO_ITEMS, node, &[], &[]))));
        }

        let target: Option<Jid> = iq.to.clone();
        let username = target.as_ref().map(jid_match::node_of).unwrap_or("");
        let domain = target
            .as_ref()
            .map(jid_match::domain_of)
            .unwrap_or_else(|| stream.domain());

        if !self.router.is_local_host(domain) {
            return Err(XmppError::item_not_found(None));
        }

        let (identity, features) = if username.is_empty() {
            (Identity::server(), self.server_features())
        } else {
            if !self.storage.user_exists(username).await? {
                return Err(XmppError::item_not_found(None));
            }
            (Identity::account(), self.account_features())
        };

        debug!(target = ?target, features = features.len(), "Answering disco#info");
        Ok(iq_result(
            iq,
            Some(build_query(NS_DISCO_INFO, node, &[identity], &features)),
        ))
    }
}

/// Build a disco `<query/>` payload.
fn build_query(ns: &str, node: Option<&str>, identities: &[Identity], features: &[String]) -> Element {
    let mut builder = Element::builder("query", ns);
    if let Some(n) = node {
        builder = builder.attr("node", n);
    }
    for identity in identities {
        let mut id_builder = Element::builder("identity", ns)
            .attr("category", &identity.category)
            .attr("type", &identity.type_);
        if let Some(ref name) = identity.name {
            id_builder = id_builder.attr("name", name);
        }
        builder = builder.append(id_builder.build());
    }
    for feature in features {
        builder = builder.append(Element::builder("feature", ns).attr("var", feature).build());
    }
    builder.build()
}

#[async_trait]
impl Module for DiscoInfo {
    fn name(&self) -> &'static str {
        "disco"
    }

    fn as_iq_handler(&self) -> Option<&dyn IqHandler> {
        Some(self)
    }
}

#[async_trait]
impl IqHandler for DiscoInfo {
    fn matches_iq(&self, iq: &Iq) -> bool {
        match &iq.payload {
            IqType::Get(elem) => {
                elem.name() == "query" && (elem.ns() == NS_DISCO_INFO || elem.ns() == NS_DISCO_ITEMS)
            }
            _ => false,
        }
    }

    async fn process_iq(&self, iq: Iq, stream: Arc<dyn C2sStream>) {
        let outcome = self.handle(&iq, stream.as_ref()).await;
        send_reply(stream.as_ref(), &iq, outcome);
    }
}
