//! XEP-0191: Blocking Command
//!
//! ## XML Format
//!
//! ```xml
//! <!-- Get blocklist -->
//! <iq type='get' id='blocklist1'>
//!   <blocklist xmlns='urn:xmpp:blocking'/>
//! </iq>
//!
//! <!-- Block a JID -->
//! <iq type='set' id='block1'>
//!   <block xmlns='urn:xmpp:blocking'>
//!     <item jid='romeo@montague.net'/>
//!   </block>
//! </iq>
//!
//! <!-- Unblock all JIDs -->
//! <iq type='set' id='unblock2'>
//!   <unblock xmlns='urn:xmpp:blocking'/>
//! </iq>
//! ```
//!
//! Every change is persisted, invalidates the router's cached list and is
//! pushed to all bound resources of the user. Blocking a contact that holds
//! a presence subscription to the user also sends that contact unavailable
//! presence from each bound resource.

use std::sync::Arc;

use async_trait::async_trait;
use jid::Jid;
use minidom::Element;
use tracing::{debug, info};
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::presence::{Presence, Type as PresenceType};

use super::{send_reply, DiscoInfo, IqHandler, Module, Roster};
use crate::c2s::C2sStream;
use crate::error::iq_result;
use crate::router::Router;
use crate::storage::{BlockListItem, Storage};
use crate::XmppError;

/// Namespace for XEP-0191 Blocking Command.
pub const NS_BLOCKING: &str = "urn:xmpp:blocking";

/// Request type for blocking operations.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockingRequest {
    GetBlocklist,
    /// Block one or more JIDs
    Block(Vec<Jid>),
    /// Unblock JIDs; empty means unblock all
    Unblock(Vec<Jid>),
}

fn parse_blocking_request(iq: &Iq) -> Result<BlockingRequest, XmppError> {
    match &iq.payload {
        IqType::Get(elem) if elem.is("blocklist", NS_BLOCKING) => Ok(BlockingRequest::GetBlocklist),
        IqType::Set(elem) if elem.is("block", NS_BLOCKING) => {
            let jids = extract_jids(elem)?;
            if jids.is_empty() {
                return Err(XmppError::bad_request(Some(
                    "Block request must contain at least one item".to_string(),
                )));
            }
            Ok(BlockingRequest::Block(jids))
        }
        IqType::Set(elem) if elem.is("unblock", NS_BLOCKING) => {
            Ok(BlockingRequest::Unblock(extract_jids(elem)?))
        }
        _ => Err(XmppError::bad_request(None)),
    }
}

fn extract_jids(elem: &Element) -> Result<Vec<Jid>, XmppError> {
    elem.children()
        .filter(|child| child.is("item", NS_BLOCKING))
        .map(|child| {
            child
                .attr("jid")
                .ok_or_else(|| XmppError::bad_request(Some("Item element missing jid attribute".to_string())))?
                .parse::<Jid>()
                .map_err(|_| XmppError::bad_request(Some("Malformed item jid".to_string())))
        })
        .collect()
}

fn items_element(name: &str, jids: &[Jid]) -> Element {
    let mut builder = Element::builder(name, NS_BLOCKING);
    for jid in jids {
        builder = builder.append(
            Element::builder("item", NS_BLOCKING)
                .attr("jid", jid.to_string())
                .build(),
        );
    }
    builder.build()
}

/// Blocking command handler.
pub struct BlockingCommand {
    roster: Option<Arc<Roster>>,
    router: Arc<Router>,
    storage: Arc<dyn Storage>,
}

impl BlockingCommand {
    pub fn new(
        disco: &DiscoInfo,
        roster: Option<Arc<Roster>>,
        router: Arc<Router>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        disco.register_server_feature(NS_BLOCKING);
        Self {
            roster,
            router,
            storage,
        }
    }

    async fn handle(&self, iq: &Iq, stream: &dyn C2sStream) -> Result<Iq, XmppError> {
        let username = stream.username();
        match parse_blocking_request(iq)? {
            BlockingRequest::GetBlocklist => {
                let items = self.storage.fetch_block_list_items(username).await?;
                let mut blocklist = Element::builder("blocklist", NS_BLOCKING);
                for item in &items {
                    blocklist = blocklist.append(
                        Element::builder("item", NS_BLOCKING)
                            .attr("jid", item.jid.as_str())
                            .build(),
                    );
                }
                debug!(username = %username, count = items.len(), "Sending blocklist");
                Ok(iq_result(iq, Some(blocklist.build())))
            }
            BlockingRequest::Block(jids) => {
                self.storage
                    .insert_block_list_items(&block_list_items(username, &jids))
                    .await?;
                self.router.reload_block_list(username).await;
                info!(username = %username, count = jids.len(), "JIDs blocked");

                self.send_unavailable_to_subscribers(username, &jids).await?;
                self.push(username, items_element("block", &jids));
                Ok(iq_result(iq, None))
            }
            BlockingRequest::Unblock(jids) => {
                if jids.is_empty() {
                    self.storage.clear_block_list(username).await?;
                } else {
                    self.storage
                        .delete_block_list_items(&block_list_items(username, &jids))
                        .await?;
                }
                self.router.reload_block_list(username).await;
                info!(username = %username, count = jids.len(), "JIDs unblocked");

                self.push(username, items_element("unblock", &jids));
                Ok(iq_result(iq, None))
            }
        }
    }

    /// Contacts subscribed to the user's presence stop seeing it once blocked.
    async fn send_unavailable_to_subscribers(&self, username: &str, jids: &[Jid]) -> Result<(), XmppError> {
        let Some(roster) = &self.roster else {
            return Ok(());
        };
        let streams = self.router.user_streams(username);

        for jid in jids {
            let Some(item) = roster.roster_item(username, &jid.to_bare()).await? else {
                continue;
            };
            if !item.subscription.is_from() {
                continue;
            }
            for stream in &streams {
                let mut presence = Presence::new(PresenceType::Unavailable);
                presence.from = stream.jid();
                presence.to = Some(jid.clone());
                if let Err(e) = self.router.must_route(presence.into()).await {
                    debug!(contact = %jid, error = %e, "Could not deliver unavailable presence");
                }
            }
        }
        Ok(())
    }

    /// Send a blocking push to every bound resource of `username`.
    fn push(&self, username: &str, payload: Element) {
        for stream in self.router.user_streams(username) {
            let Some(to) = stream.jid() else { continue };
            let push = Iq {
                from: Some(Jid::from(to.to_bare())),
                to: Some(to),
                id: format!("push-block-{}", uuid::Uuid::new_v4()),
                payload: IqType::Set(payload.clone()),
            };
            stream.send_element(push.into());
        }
    }
}

fn block_list_items(username: &str, jids: &[Jid]) -> Vec<BlockListItem> {
    jids.iter()
        .map(|jid| BlockListItem {
            username: username.to_string(),
            jid: jid.to_string(),
        })
        .collect()
}

#[async_trait]
impl Module for BlockingCommand {
    fn name(&self) -> &'static str {
        "blocking_command"
    }

    fn as_iq_handler(&self) -> Option<&dyn IqHandler> {
        Some(self)
    }
}

#[async_trait]
impl IqHandler for BlockingCommand {
    fn matches_iq(&self, iq: &Iq) -> bool {
        match &iq.payload {
            IqType::Get(elem) => elem.is("blocklist", NS_BLOCKING),
            IqType::Set(elem) => elem.is("block", NS_BLOCKING) || elem.is("unblock", NS_BLOCKING),
            _ => false,
        }
    }

    async fn process_iq(&self, iq: Iq, stream: Arc<dyn C2sStream>) {
        let outcome = self.handle(&iq, stream.as_ref()).await;
        send_reply(stream.as_ref(), &iq, outcome);
    }
}
