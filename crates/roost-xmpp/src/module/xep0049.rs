//! XEP-0049: Private XML Storage
//!
//! Allows users to store arbitrary XML data on the server, keyed by the
//! namespace of the stored element. Namespaces under `jabber:` are reserved.

use std::sync::Arc;

use async_trait::async_trait;
use minidom::Element;
use tracing::debug;
use xmpp_parsers::iq::{Iq, IqType};

use super::{send_reply, IqHandler, Module};
use crate::c2s::C2sStream;
use crate::error::iq_result;
use crate::jid_match;
use crate::storage::Storage;
use crate::XmppError;

/// Namespace for private XML storage.
pub const NS_PRIVATE: &str = "jabber:iq:private";

/// Private XML storage handler.
pub struct Private {
    storage: Arc<dyn Storage>,
}

impl Private {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    async fn handle(&self, iq: &Iq, stream: &dyn C2sStream) -> Result<Iq, XmppError> {
        if let Some(to) = &iq.to {
            if jid_match::node_of(to) != stream.username() {
                return Err(XmppError::forbidden(None));
            }
        }

        let (query, is_set) = match &iq.payload {
            IqType::Get(query) => (query, false),
            IqType::Set(query) => (query, true),
            _ => return Err(XmppError::bad_request(None)),
        };

        let mut children = query.children();
        let child = children
            .next()
            .ok_or_else(|| XmppError::not_acceptable(Some("Missing storage element".to_string())))?;
        if children.next().is_some() {
            return Err(XmppError::not_acceptable(Some(
                "Exactly one storage element is allowed".to_string(),
            )));
        }

        let namespace = child.ns();
        if namespace.is_empty() || namespace.starts_with("jabber:") {
            return Err(XmppError::not_acceptable(Some(format!(
                "Namespace {} cannot be stored",
                namespace
            ))));
        }

        let username = stream.username();
        if is_set {
            debug!(username = %username, namespace = %namespace, "Storing private XML");
            self.storage
                .upsert_private_xml(username, &namespace, child.clone())
                .await?;
            return Ok(iq_result(iq, None));
        }

        let stored = self.storage.fetch_private_xml(username, &namespace).await?;
        let payload = stored.unwrap_or_else(|| Element::builder(child.name(), namespace.as_str()).build());
        let query = Element::builder("query", NS_PRIVATE).append(payload).build();
        Ok(iq_result(iq, Some(query)))
    }
}

#[async_trait]
impl Module for Private {
    fn name(&self) -> &'static str {
        "private"
    }

    fn as_iq_handler(&self) -> Option<&dyn IqHandler> {
        Some(self)
    }
}

#[async_trait]
impl IqHandler for Private {
    fn matches_iq(&self, iq: &Iq) -> bool {
        match &iq.payload {
            IqType::Get(elem) | IqType::Set(elem) => elem.is("query", NS_PRIVATE),
            _ => false,
        }
    }

    async fn process_iq(&self, iq: Iq, stream: Arc<dyn C2sStream>) {
        let outcome = self.handle(&iq, stream.as_ref()).await;
        send_reply(stream.as_ref(), &iq, outcome);
    }
}
