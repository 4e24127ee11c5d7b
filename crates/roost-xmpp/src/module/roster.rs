//! RFC 6121 roster management (`jabber:iq:roster`).
//!
//! Supports roster retrieval and single-item updates. Every change is pushed
//! to all bound resources of the owner.

use std::sync::Arc;

use async_trait::async_trait;
use jid::{BareJid, Jid};
use minidom::Element;
use tracing::{debug, info};
use xmpp_parsers::iq::{Iq, IqType};

use super::{send_reply, IqHandler, Module};
use crate::c2s::C2sStream;
use crate::error::iq_result;
use crate::jid_match;
use crate::router::Router;
use crate::storage::{RosterItem, Storage, Subscription};
use crate::XmppError;

/// Namespace for roster queries.
pub const NS_ROSTER: &str = "jabber:iq:roster";

/// A requested roster change.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RosterUpdate {
    Upsert {
        jid: BareJid,
        name: Option<String>,
        groups: Vec<String>,
    },
    Remove {
        jid: BareJid,
    },
}

/// Roster handler.
pub struct Roster {
    router: Arc<Router>,
    storage: Arc<dyn Storage>,
}

impl Roster {
    pub fn new(router: Arc<Router>, storage: Arc<dyn Storage>) -> Self {
        Self { router, storage }
    }

    /// Look up one contact of `username`'s roster.
    pub async fn roster_item(
        &self,
        username: &str,
        contact: &BareJid,
    ) -> Result<Option<RosterItem>, XmppError> {
        Ok(self
            .storage
            .fetch_roster_item(username, &contact.to_string())
            .await?)
    }

    async fn handle(&self, iq: &Iq, stream: &dyn C2sStream) -> Result<Iq, XmppError> {
        if let Some(to) = &iq.to {
            if jid_match::node_of(to) != stream.username() || jid_match::domain_of(to) != stream.domain() {
                return Err(XmppError::forbidden(None));
            }
        }

        match &iq.payload {
            IqType::Get(_) => {
                let items = self.storage.fetch_roster_items(stream.username()).await?;
                debug!(username = %stream.username(), count = items.len(), "Sending roster");
                let mut query = Element::builder("query", NS_ROSTER);
                for item in &items {
                    query = query.append(item_element(item));
                }
                Ok(iq_result(iq, Some(query.build())))
            }
            IqType::Set(query) => {
                let update = parse_update(query)?;
                let pushed = self.apply_update(stream.username(), update).await?;
                self.push(stream.username(), pushed);
                Ok(iq_result(iq, None))
            }
            _ => Err(XmppError::bad_request(None)),
        }
    }

    /// Persist an update, returning the item element to push.
    async fn apply_update(&self, username: &str, update: RosterUpdate) -> Result<Element, XmppError> {
        match update {
            RosterUpdate::Upsert { jid, name, groups } => {
                let jid = jid.to_string();
                let existing = self.storage.fetch_roster_item(username, &jid).await?;
                let (subscription, ask) = existing
                    .map(|item| (item.subscription, item.ask))
                    .unwrap_or((Subscription::None, false));
                let item = RosterItem {
                    username: username.to_string(),
                    jid,
                    name,
                    subscription,
                    ask,
                    groups,
                };
                self.storage.upsert_roster_item(item.clone()).await?;
                info!(username = %username, contact = %item.jid, "Roster item updated");
                Ok(item_element(&item))
            }
            RosterUpdate::Remove { jid } => {
                let jid = jid.to_string();
                self.storage.delete_roster_item(username, &jid).await?;
                info!(username = %username, contact = %jid, "Roster item removed");
                Ok(Element::builder("item", NS_ROSTER)
                    .attr("jid", jid)
                    .attr("subscription", "remove")
                    .build())
            }
        }
    }

    /// Send a roster push carrying `item` to every bound resource of `username`.
    fn push(&self, username: &str, item: Element) {
        for stream in self.router.user_streams(username) {
            let Some(to) = stream.jid() else { continue };
            let push = Iq {
                from: Some(Jid::from(to.to_bare())),
                to: Some(to),
                id: format!("push-roster-{}", uuid::Uuid::new_v4()),
                payload: IqType::Set(Element::builder("query", NS_ROSTER).append(item.clone()).build()),
            };
            stream.send_element(push.into());
        }
    }
}

fn item_element(item: &RosterItem) -> Element {
    let mut builder = Element::builder("item", NS_ROSTER)
        .attr("jid", item.jid.as_str())
        .attr("subscription", item.subscription.as_str());
    if let Some(name) = &item.name {
        builder = builder.attr("name", name.as_str());
    }
    if item.ask {
        builder = builder.attr("ask", "subscribe");
    }
    for group in &item.groups {
        builder = builder.append(Element::builder("group", NS_ROSTER).append(group.clone()).build());
    }
    builder.build()
}

fn parse_update(query: &Element) -> Result<RosterUpdate, XmppError> {
    let mut items = query.children().filter(|c| c.is("item", NS_ROSTER));
    let item = items
        .next()
        .ok_or_else(|| XmppError::bad_request(Some("Roster set requires an item".to_string())))?;
    if items.next().is_some() {
        return Err(XmppError::bad_request(Some(
            "Roster set must contain exactly one item".to_string(),
        )));
    }

    let jid: Jid = item
        .attr("jid")
        .ok_or_else(|| XmppError::bad_request(Some("Item missing jid attribute".to_string())))?
        .parse()
        .map_err(|_| XmppError::bad_request(Some("Malformed item jid".to_string())))?;
    let jid = jid.to_bare();

    if item.attr("subscription") == Some("remove") {
        return Ok(RosterUpdate::Remove { jid });
    }

    let groups = item
        .children()
        .filter(|c| c.is("group", NS_ROSTER))
        .map(|g| g.text())
        .filter(|g| !g.is_empty())
        .collect();

    Ok(RosterUpdate::Upsert {
        jid,
        name: item.attr("name").map(|n| n.to_string()),
        groups,
    })
}

#[async_trait]
impl Module for Roster {
    fn name(&self) -> &'static str {
        "roster"
    }

    fn as_iq_handler(&self) -> Option<&dyn IqHandler> {
        Some(self)
    }
}

#[async_trait]
impl IqHandler for Roster {
    fn matches_iq(&self, iq: &Iq) -> bool {
        match &iq.payload {
            IqType::Get(elem) | IqType::Set(elem) => elem.is("query", NS_ROSTER),
            _ => false,
        }
    }

    async fn process_iq(&self, iq: Iq, stream: Arc<dyn C2sStream>) {
        let outcome = self.handle(&iq, stream.as_ref()).await;
        send_reply(stream.as_ref(), &iq, outcome);
    }
}
