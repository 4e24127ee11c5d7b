//! XEP-0199: XMPP Ping

use std::sync::Arc;

use async_trait::async_trait;
use xmpp_parsers::iq::{Iq, IqType};

use super::{send_reply, DiscoInfo, IqHandler, Module};
use crate::c2s::C2sStream;
use crate::error::iq_result;

/// Namespace for XEP-0199 Ping.
pub const NS_PING: &str = "urn:xmpp:ping";

/// Ping handler. Answers every ping with an empty result.
pub struct Ping;

impl Ping {
    pub fn new(disco: &DiscoInfo) -> Self {
        disco.register_server_feature(NS_PING);
        Self
    }
}

#[async_trait]
impl Module for Ping {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn as_iq_handler(&self) -> Option<&dyn IqHandler> {
        Some(self)
    }
}

#[async_trait]
impl IqHandler for Ping {
    fn matches_iq(&self, iq: &Iq) -> bool {
        match &iq.payload {
            IqType::Get(elem) => elem.is("ping", NS_PING),
            _ => false,
        }
    }

    async fn process_iq(&self, iq: Iq, stream: Arc<dyn C2sStream>) {
        send_reply(stream.as_ref(), &iq, Ok(iq_result(&iq, None)));
    }
}
