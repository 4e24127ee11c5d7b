//! Client connection handle contract.

use jid::Jid;
use xmpp_parsers::presence::Presence;

use crate::jid_match;
use crate::stanza::Stanza;

/// A bound (or binding) client stream as seen by the router.
///
/// Implementations wrap a live connection or, for clustered deployments, a
/// resource bound on another node. `send_element` must not block: buffer or
/// drop instead.
pub trait C2sStream: Send + Sync {
    /// Account name, empty before authentication.
    fn username(&self) -> &str;

    /// Domain the stream is connected to.
    fn domain(&self) -> &str;

    /// Bound resource, empty before resource binding.
    fn resource(&self) -> &str;

    /// Last presence broadcast by the stream.
    fn presence(&self) -> Option<Presence>;

    /// Deliver a stanza to the client.
    fn send_element(&self, stanza: Stanza);

    /// Whether the stream has authenticated.
    fn is_authenticated(&self) -> bool {
        !self.username().is_empty()
    }

    /// Presence priority, zero when no presence has been sent.
    fn priority(&self) -> i8 {
        self.presence().map(|p| p.priority).unwrap_or(0)
    }

    /// Address of the stream, `None` if its components don't form a JID.
    fn jid(&self) -> Option<Jid> {
        jid_match::from_parts(self.username(), self.domain(), self.resource()).ok()
    }

    /// Cluster node owning the connection, `None` when connected locally.
    fn origin_node(&self) -> Option<&str> {
        None
    }
}
