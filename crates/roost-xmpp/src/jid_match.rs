//! JID shape classification and component matching.
//!
//! Blocking lists are matched with graduated specificity: the shape of the
//! blocked entry decides which components of the sender must be equal.
//!
//! | Blocked entry        | Shape              | Compared components      |
//! |----------------------|--------------------|--------------------------|
//! | `user@domain/res`    | full with user     | node, domain, resource   |
//! | `domain/res`         | full with server   | domain, resource         |
//! | `user@domain`        | bare               | node, domain             |
//! | `domain`             | server             | domain                   |

use std::ops::BitOr;

use jid::Jid;

/// Bitset selecting which JID components must be equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchMask(u8);

impl MatchMask {
    /// Compare the node (local part).
    pub const NODE: MatchMask = MatchMask(1);
    /// Compare the domain.
    pub const DOMAIN: MatchMask = MatchMask(1 << 1);
    /// Compare the resource.
    pub const RESOURCE: MatchMask = MatchMask(1 << 2);

    /// Whether every component in `other` is selected by this mask.
    pub fn contains(self, other: MatchMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MatchMask {
    type Output = MatchMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        MatchMask(self.0 | rhs.0)
    }
}

/// The addressing shape of a JID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JidShape {
    /// `node@domain/resource`
    FullWithUser,
    /// `domain/resource`
    FullWithServer,
    /// `node@domain`
    Bare,
    /// `domain`
    Server,
}

/// Local part of a JID, empty when absent.
pub fn node_of(jid: &Jid) -> &str {
    jid.node().map(|n| n.as_str()).unwrap_or("")
}

/// Domain part of a JID.
pub fn domain_of(jid: &Jid) -> &str {
    jid.domain().as_str()
}

/// Resource part of a JID, empty when absent.
pub fn resource_of(jid: &Jid) -> &str {
    jid.resource().map(|r| r.as_str()).unwrap_or("")
}

/// Classify a JID by which components it carries.
pub fn shape(jid: &Jid) -> JidShape {
    let has_node = !node_of(jid).is_empty();
    let has_resource = !resource_of(jid).is_empty();
    match (has_node, has_resource) {
        (true, true) => JidShape::FullWithUser,
        (false, true) => JidShape::FullWithServer,
        (true, false) => JidShape::Bare,
        (false, false) => JidShape::Server,
    }
}

/// Whether the JID addresses a server (no node, no resource).
pub fn is_server(jid: &Jid) -> bool {
    shape(jid) == JidShape::Server
}

/// Compare the components of two JIDs selected by `mask`.
///
/// Node and domain compare case-insensitively; resources are case-sensitive.
pub fn matches(jid: &Jid, other: &Jid, mask: MatchMask) -> bool {
    if mask.contains(MatchMask::NODE) && node_of(jid).to_lowercase() != node_of(other).to_lowercase()
    {
        return false;
    }
    if mask.contains(MatchMask::DOMAIN)
        && domain_of(jid).to_lowercase() != domain_of(other).to_lowercase()
    {
        return false;
    }
    if mask.contains(MatchMask::RESOURCE) && resource_of(jid) != resource_of(other) {
        return false;
    }
    true
}

/// The comparison mask implied by a blocked entry's shape.
pub fn blocking_mask(blocked: &Jid) -> MatchMask {
    match shape(blocked) {
        JidShape::FullWithUser => MatchMask::NODE | MatchMask::DOMAIN | MatchMask::RESOURCE,
        JidShape::FullWithServer => MatchMask::DOMAIN | MatchMask::RESOURCE,
        JidShape::Bare => MatchMask::NODE | MatchMask::DOMAIN,
        JidShape::Server => MatchMask::DOMAIN,
    }
}

/// Whether `jid` is caught by the blocking-list entry `blocked`.
pub fn matches_blocked(jid: &Jid, blocked: &Jid) -> bool {
    matches(jid, blocked, blocking_mask(blocked))
}

/// Build a JID from its three components, normalizing through the parser.
///
/// Empty node or resource components are omitted.
pub fn from_parts(node: &str, domain: &str, resource: &str) -> Result<Jid, jid::Error> {
    let mut s = String::with_capacity(node.len() + domain.len() + resource.len() + 2);
    if !node.is_empty() {
        s.push_str(node);
        s.push('@');
    }
    s.push_str(domain);
    if !resource.is_empty() {
        s.push('/');
        s.push_str(resource);
    }
    s.parse()
}
