//! XEP-0054: vcard-temp
//!
//! Users may read any local user's vCard and replace their own.

use std::sync::Arc;

use async_trait::async_trait;
use minidom::Element;
use tracing::{debug, info};
use xmpp_parsers::iq::{Iq, IqType};

use super::{send_reply, DiscoInfo, IqHandler, Module};
use crate::c2s::C2sStream;
use crate::error::iq_result;
use crate::jid_match;
use crate::storage::Storage;
use crate::XmppError;

/// Namespace for vCard queries.
pub const NS_VCARD: &str = "vcard-temp";

/// vCard handler.
pub struct VCard {
    storage: Arc<dyn Storage>,
}

impl VCard {
    pub fn new(disco: &DiscoInfo, storage: Arc<dyn Storage>) -> Self {
        disco.register_server_feature(NS_VCARD);
        Self { storage }
    }

    async fn handle(&self, iq: &Iq, stream: &dyn C2sStream) -> Result<Iq, XmppError> {
        let target = iq
            .to
            .as_ref()
            .map(jid_match::node_of)
            .filter(|node| !node.is_empty())
            .unwrap_or_else(|| stream.username());

        match &iq.payload {
            IqType::Get(_) => {
                let vcard = self
                    .storage
                    .fetch_vcard(target)
                    .await?
                    .unwrap_or_else(|| Element::builder("vCard", NS_VCARD).build());
                debug!(username = %target, "Sending vCard");
                Ok(iq_result(iq, Some(vcard)))
            }
            IqType::Set(vcard) => {
                if target != stream.username() {
                    return Err(XmppError::forbidden(None));
                }
                self.storage.upsert_vcard(target, vcard.clone()).await?;
                info!(username = %target, "vCard updated");
                Ok(iq_result(iq, None))
            }
            _ => Err(XmppError::bad_request(None)),
        }
    }
}

#[async_trait]
impl Module for VCard {
    fn name(&self) -> &'static str {
        "vcard"
    }

    fn as_iq_handler(&self) -> Option<&dyn IqHandler> {
        Some(self)
    }
}

#[async_trait]
impl IqHandler for VCard {
    fn matches_iq(&self, iq: &Iq) -> bool {
        match &iq.payload {
            IqType::Get(elem) | IqType::Set(elem) => elem.is("vCard", NS_VCARD),
            _ => false,
        }
    }

    async fn process_iq(&self, iq: Iq, stream: Arc<dyn C2sStream>) {
        let outcome = self.handle(&iq, stream.as_ref()).await;
        send_reply(stream.as_ref(), &iq, outcome);
    }
}
