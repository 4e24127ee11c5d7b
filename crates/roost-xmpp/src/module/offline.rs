//! XEP-0160: Best Practices for Handling Offline Messages
//!
//! Messages addressed to an account with no bound resource are queued in
//! storage, stamped with an XEP-0203 `<delay/>`, and flushed to the first
//! stream that comes online. Only `chat` and `normal` messages carrying a
//! body are kept.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use minidom::Element;
use tracing::{debug, info, warn};
use xmpp_parsers::message::{Message, MessageType};

use super::{DiscoInfo, Module};
use crate::c2s::C2sStream;
use crate::jid_match;
use crate::router::Router;
use crate::stanza::Stanza;
use crate::storage::Storage;
use crate::XmppError;

/// Disco feature advertised for offline storage.
pub const FEATURE_MSGOFFLINE: &str = "msgoffline";

/// Namespace for XEP-0203 Delayed Delivery.
pub const NS_DELAY: &str = "urn:xmpp:delay";

/// Offline message storage.
pub struct Offline {
    router: Arc<Router>,
    storage: Arc<dyn Storage>,
    queue_size: usize,
}

impl Offline {
    pub fn new(
        disco: &DiscoInfo,
        router: Arc<Router>,
        storage: Arc<dyn Storage>,
        queue_size: usize,
    ) -> Self {
        disco.register_server_feature(FEATURE_MSGOFFLINE);
        Self {
            router,
            storage,
            queue_size,
        }
    }

    /// Queue a message for its offline recipient.
    ///
    /// Returns `true` when the message was stored. When the recipient's queue
    /// is full the sender receives a `service-unavailable` error instead.
    pub async fn archive_message(&self, message: &Message) -> Result<bool, XmppError> {
        if !is_archivable(message) {
            return Ok(false);
        }
        let Some(to) = &message.to else {
            return Ok(false);
        };
        let username = jid_match::node_of(to);
        if username.is_empty() {
            return Ok(false);
        }

        let queued = self.storage.count_offline_messages(username).await?;
        if queued >= self.queue_size {
            info!(username = %username, queued, "Offline queue full, bouncing message");
            self.bounce(message).await;
            return Ok(false);
        }

        let mut elem: Element = message.clone().into();
        elem.append_child(
            Element::builder("delay", NS_DELAY)
                .attr("from", jid_match::domain_of(to))
                .attr("stamp", Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string())
                .build(),
        );
        self.storage.insert_offline_message(username, elem).await?;
        debug!(username = %username, "Message archived for offline delivery");
        Ok(true)
    }

    /// Send every queued message to `stream`, emptying the queue.
    ///
    /// Returns the number of messages delivered.
    pub async fn deliver_offline_messages(&self, stream: &dyn C2sStream) -> Result<usize, XmppError> {
        let queued = self.storage.take_offline_messages(stream.username()).await?;
        let mut delivered = 0;
        for elem in queued {
            match Stanza::try_from(elem) {
                Ok(stanza) => {
                    stream.send_element(stanza);
                    delivered += 1;
                }
                Err(e) => {
                    warn!(username = %stream.username(), error = %e, "Dropping unparsable offline message");
                }
            }
        }
        if delivered > 0 {
            info!(username = %stream.username(), delivered, "Offline messages delivered");
        }
        Ok(delivered)
    }

    async fn bounce(&self, message: &Message) {
        let Some(sender) = message.from.clone() else {
            return;
        };
        let mut reply = Message::new(Some(sender));
        reply.from = message.to.clone();
        reply.id = message.id.clone();
        reply.type_ = MessageType::Error;
        reply
            .payloads
            .push(XmppError::service_unavailable(None).to_stanza_error().into());
        if let Err(e) = self.router.must_route(reply.into()).await {
            debug!(error = %e, "Could not deliver offline bounce");
        }
    }
}

fn is_archivable(message: &Message) -> bool {
    matches!(message.type_, MessageType::Chat | MessageType::Normal) && !message.bodies.is_empty()
}

#[async_trait]
impl Module for Offline {
    fn name(&self) -> &'static str {
        "offline"
    }
}
