//! The three XMPP stanza kinds as one routable value.

use jid::Jid;
use minidom::Element;
use xmpp_parsers::iq::Iq;
use xmpp_parsers::message::Message;
use xmpp_parsers::presence::Presence;

use crate::XmppError;

/// Client namespace shared by all routed stanzas.
pub const NS_CLIENT: &str = "jabber:client";

/// A parsed stanza as it travels through the router.
#[derive(Debug, Clone)]
pub enum Stanza {
    Message(Message),
    Presence(Presence),
    Iq(Iq),
}

impl Stanza {
    /// Element name of the stanza kind.
    pub fn name(&self) -> &'static str {
        match self {
            Stanza::Message(_) => "message",
            Stanza::Presence(_) => "presence",
            Stanza::Iq(_) => "iq",
        }
    }

    /// Destination address.
    pub fn to(&self) -> Option<&Jid> {
        match self {
            Stanza::Message(m) => m.to.as_ref(),
            Stanza::Presence(p) => p.to.as_ref(),
            Stanza::Iq(iq) => iq.to.as_ref(),
        }
    }

    /// Sender address.
    pub fn from(&self) -> Option<&Jid> {
        match self {
            Stanza::Message(m) => m.from.as_ref(),
            Stanza::Presence(p) => p.from.as_ref(),
            Stanza::Iq(iq) => iq.from.as_ref(),
        }
    }

    /// Re-address the stanza.
    pub fn with_to(mut self, to: Jid) -> Self {
        match &mut self {
            Stanza::Message(m) => m.to = Some(to),
            Stanza::Presence(p) => p.to = Some(to),
            Stanza::Iq(iq) => iq.to = Some(to),
        }
        self
    }

    pub fn is_message(&self) -> bool {
        matches!(self, Stanza::Message(_))
    }
}

impl From<Message> for Stanza {
    fn from(message: Message) -> Self {
        Stanza::Message(message)
    }
}

impl From<Presence> for Stanza {
    fn from(presence: Presence) -> Self {
        Stanza::Presence(presence)
    }
}

impl From<Iq> for Stanza {
    fn from(iq: Iq) -> Self {
        Stanza::Iq(iq)
    }
}

impl From<Stanza> for Element {
    fn from(stanza: Stanza) -> Self {
        match stanza {
            Stanza::Message(m) => m.into(),
            Stanza::Presence(p) => p.into(),
            Stanza::Iq(iq) => iq.into(),
        }
    }
}

impl TryFrom<Element> for Stanza {
    type Error = XmppError;

    fn try_from(elem: Element) -> Result<Self, Self::Error> {
        match elem.name() {
            "message" => Message::try_from(elem)
                .map(Stanza::Message)
                .map_err(|e| XmppError::bad_request(Some(format!("Invalid message: {e:?}")))),
            "presence" => Presence::try_from(elem)
                .map(Stanza::Presence)
                .map_err(|e| XmppError::bad_request(Some(format!("Invalid presence: {e:?}")))),
            "iq" => Iq::try_from(elem)
                .map(Stanza::Iq)
                .map_err(|e| XmppError::bad_request(Some(format!("Invalid iq: {e:?}")))),
            other => Err(XmppError::bad_request(Some(format!(
                "Unknown stanza element: {other}"
            )))),
        }
    }
}
