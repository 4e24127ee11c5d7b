//! Binary codec for inter-node cluster messages.
//!
//! Layout, in field order: a `u32` type discriminant (bind=0, unbind=1,
//! send=2), the origin node name, then either a length-prefixed list of
//! `(node, domain, resource)` string triples or one recursively encoded
//! element (name, namespace, attributes, text, children). The format carries
//! no version field; any layout change breaks mixed-version clusters.

use jid::Jid;
use minidom::Element;
use serde::{Deserialize, Serialize};

use super::ClusterError;
use crate::jid_match::{self, domain_of, node_of, resource_of};

/// Kind of a cluster message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Bind = 0,
    Unbind = 1,
    Send = 2,
}

/// A decoded cluster message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterMessage {
    /// Resources newly bound on `node`.
    Bind { node: String, jids: Vec<Jid> },
    /// Resources no longer bound on `node`.
    Unbind { node: String, jids: Vec<Jid> },
    /// A stanza forwarded by `node` for local delivery.
    Send { node: String, element: Element },
}

impl ClusterMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ClusterMessage::Bind { .. } => MessageType::Bind,
            ClusterMessage::Unbind { .. } => MessageType::Unbind,
            ClusterMessage::Send { .. } => MessageType::Send,
        }
    }

    /// Name of the node that produced the message.
    pub fn node(&self) -> &str {
        match self {
            ClusterMessage::Bind { node, .. }
            | ClusterMessage::Unbind { node, .. }
            | ClusterMessage::Send { node, .. } => node,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ClusterError> {
        let wire = match self {
            ClusterMessage::Bind { node, jids } => WireMessage::Bind {
                node: node.clone(),
                jids: jids.iter().map(WireJid::from).collect(),
            },
            ClusterMessage::Unbind { node, jids } => WireMessage::Unbind {
                node: node.clone(),
                jids: jids.iter().map(WireJid::from).collect(),
            },
            ClusterMessage::Send { node, element } => WireMessage::Send {
                node: node.clone(),
                element: WireElement::from(element),
            },
        };
        bincode::serialize(&wire).map_err(ClusterError::Encode)
    }

    /// Decode a payload. Truncated or mistyped input is an error, never a
    /// partially filled message.
    pub fn decode(data: &[u8]) -> Result<Self, ClusterError> {
        let wire: WireMessage = bincode::deserialize(data).map_err(ClusterError::Decode)?;
        Ok(match wire {
            WireMessage::Bind { node, jids } => ClusterMessage::Bind {
                node,
                jids: decode_jids(jids)?,
            },
            WireMessage::Unbind { node, jids } => ClusterMessage::Unbind {
                node,
                jids: decode_jids(jids)?,
            },
            WireMessage::Send { node, element } => ClusterMessage::Send {
                node,
                element: element.into_element(),
            },
        })
    }
}

fn decode_jids(jids: Vec<WireJid>) -> Result<Vec<Jid>, ClusterError> {
    jids.into_iter()
        .map(|j| {
            jid_match::from_parts(&j.node, &j.domain, &j.resource)
                .map_err(|e| ClusterError::InvalidJid(format!("{}: {}", j.domain, e)))
        })
        .collect()
}

// Variant order is the wire discriminant.
#[derive(Debug, Serialize, Deserialize)]
enum WireMessage {
    Bind { node: String, jids: Vec<WireJid> },
    Unbind { node: String, jids: Vec<WireJid> },
    Send { node: String, element: WireElement },
}

#[derive(Debug, Serialize, Deserialize)]
struct WireJid {
    node: String,
    domain: String,
    resource: String,
}

impl From<&Jid> for WireJid {
    fn from(jid: &Jid) -> Self {
        Self {
            node: node_of(jid).to_string(),
            domain: domain_of(jid).to_string(),
            resource: resource_of(jid).to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireElement {
    name: String,
    ns: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<WireElement>,
}

impl From<&Element> for WireElement {
    fn from(elem: &Element) -> Self {
        Self {
            name: elem.name().to_string(),
            ns: elem.ns(),
            attrs: elem
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            text: elem.text(),
            children: elem.children().map(WireElement::from).collect(),
        }
    }
}

impl WireElement {
    fn into_element(self) -> Element {
        let mut builder = Element::builder(self.name, self.ns);
        for (k, v) in self.attrs {
            builder = builder.attr(k, v);
        }
        if !self.text.is_empty() {
            builder = builder.append(self.text);
        }
        for child in self.children {
            builder = builder.append(child.into_element());
        }
        builder.build()
    }
}
