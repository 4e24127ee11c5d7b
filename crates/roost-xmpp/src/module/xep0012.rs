//! XEP-0012: Last Activity
//!
//! Queries addressed to the server report its uptime; queries addressed to a
//! local account report zero idle seconds while the account has a bound
//! resource.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use minidom::Element;
use tracing::debug;
use xmpp_parsers::iq::{Iq, IqType};

use super::{send_reply, DiscoInfo, IqHandler, Module};
use crate::c2s::C2sStream;
use crate::error::iq_result;
use crate::jid_match;
use crate::router::Router;
use crate::XmppError;

/// Namespace for last activity queries.
pub const NS_LAST: &str = "jabber:iq:last";

/// Last activity handler.
pub struct LastActivity {
    router: Arc<Router>,
    started_at: DateTime<Utc>,
}

impl LastActivity {
    pub fn new(disco: &DiscoInfo, router: Arc<Router>) -> Self {
        disco.register_server_feature(NS_LAST);
        Self {
            router,
            started_at: Utc::now(),
        }
    }

    fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }

    fn handle(&self, iq: &Iq) -> Result<Iq, XmppError> {
        let seconds = match &iq.to {
            Some(to) if !jid_match::node_of(to).is_empty() => {
                if !self.router.is_local_host(jid_match::domain_of(to)) {
                    return Err(XmppError::service_unavailable(None));
                }
                if self.router.user_streams(jid_match::node_of(to)).is_empty() {
                    return Err(XmppError::item_not_found(None));
                }
                0
            }
            _ => self.uptime_secs(),
        };

        debug!(to = ?iq.to, seconds, "Answering last activity");
        let query = Element::builder("query", NS_LAST)
            .attr("seconds", seconds.to_string())
            .build();
        Ok(iq_result(iq, Some(query)))
    }
}

#[async_trait]
impl Module for LastActivity {
    fn name(&self) -> &'static str {
        "last_activity"
    }

    fn as_iq_handler(&self) -> Option<&dyn IqHandler> {
        Some(self)
    }
}

#[async_trait]
impl IqHandler for LastActivity {
    fn matches_iq(&self, iq: &Iq) -> bool {
        match &iq.payload {
            IqType::Get(elem) => elem.is("query", NS_LAST),
            _ => false,
        }
    }

    async fn process_iq(&self, iq: Iq, stream: Arc<dyn C2sStream>) {
        let outcome = self.handle(&iq);
        send_reply(stream.as_ref(), &iq, outcome);
    }
}
