//! XEP-0092: Software Version
//!
//! Only requests addressed to the server itself are answered; requests for a
//! user's client version are routed to that client instead.

use std::sync::Arc;

use async_trait::async_trait;
use minidom::Element;
use tracing::debug;
use xmpp_parsers::iq::{Iq, IqType};

use super::{send_reply, DiscoInfo, IqHandler, Module, VersionConfig};
use crate::c2s::C2sStream;
use crate::error::iq_result;
use crate::jid_match;
use crate::XmppError;

/// Namespace for XEP-0092 Software Version.
pub const NS_VERSION: &str = "jabber:iq:version";

/// Software name reported to clients.
pub const SERVER_NAME: &str = "roost";

/// Software version handler.
pub struct Version {
    config: VersionConfig,
}

impl Version {
    pub fn new(disco: &DiscoInfo, config: VersionConfig) -> Self {
        disco.register_server_feature(NS_VERSION);
        Self { config }
    }

    fn handle(&self, iq: &Iq) -> Result<Iq, XmppError> {
        if !matches!(iq.payload, IqType::Get(_)) {
            return Err(XmppError::bad_request(None));
        }

        let mut query = Element::builder("query", NS_VERSION)
            .append(Element::builder("name", NS_VERSION).append(SERVER_NAME).build())
            .append(
                Element::builder("version", NS_VERSION)
                    .append(env!("CARGO_PKG_VERSION"))
                    .build(),
            );
        if self.config.show_os {
            query = query.append(
                Element::builder("os", NS_VERSION)
                    .append(std::env::consts::OS)
                    .build(),
            );
        }
        debug!(show_os = self.config.show_os, "Answering version query");
        Ok(iq_result(iq, Some(query.build())))
    }
}

#[async_trait]
impl Module for Version {
    fn name(&self) -> &'static str {
        "version"
    }

    fn as_iq_handler(&self) -> Option<&dyn IqHandler> {
        Some(self)
    }
}

#[async_trait]
impl IqHandler for Version {
    fn matches_iq(&self, iq: &Iq) -> bool {
        let to_server = iq.to.as_ref().map_or(true, jid_match::is_server);
        match &iq.payload {
            IqType::Get(elem) | IqType::Set(elem) => to_server && elem.is("query", NS_VERSION),
            _ => false,
        }
    }

    async fn process_iq(&self, iq: Iq, stream: Arc<dyn C2sStream>) {
        let outcome = self.handle(&iq);
        send_reply(stream.as_ref(), &iq, outcome);
    }
}
