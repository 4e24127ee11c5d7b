//! Persistence contract consumed by the router and the extension handlers.
//!
//! The router itself only needs [`Storage::user_exists`] and
//! [`Storage::fetch_block_list_items`]; the remaining operations back the
//! protocol-extension handlers. [`InMemoryStorage`] is the bundled backend.

mod memory;

pub use memory::InMemoryStorage;

use async_trait::async_trait;
use minidom::Element;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by a persistence backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The addressed record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Backend failure.
    #[error("Internal storage error: {0}")]
    Internal(String),
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
}

/// One entry of a user's blocking list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockListItem {
    /// Owner of the list
    pub username: String,
    /// Blocked address, in any JID shape
    pub jid: String,
}

/// Roster subscription state (RFC 6121 §2.1.2.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subscription {
    #[default]
    None,
    To,
    From,
    Both,
}

impl Subscription {
    /// Wire representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Subscription::None => "none",
            Subscription::To => "to",
            Subscription::From => "from",
            Subscription::Both => "both",
        }
    }

    /// Parse the wire representation, `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Subscription::None),
            "to" => Some(Subscription::To),
            "from" => Some(Subscription::From),
            "both" => Some(Subscription::Both),
            _ => None,
        }
    }

    /// Whether the contact receives the owner's presence.
    pub fn is_from(&self) -> bool {
        matches!(self, Subscription::From | Subscription::Both)
    }
}

/// A roster entry owned by `username`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterItem {
    pub username: String,
    /// Bare JID of the contact
    pub jid: String,
    pub name: Option<String>,
    pub subscription: Subscription,
    /// Pending outbound subscription request
    pub ask: bool,
    pub groups: Vec<String>,
}

/// Persistence backend.
///
/// All operations are async; implementations may perform I/O.
#[async_trait]
pub trait Storage: Send + Sync {
    // Accounts

    /// Whether an account named `username` exists.
    async fn user_exists(&self, username: &str) -> Result<bool, StorageError>;

    async fn fetch_user(&self, username: &str) -> Result<Option<User>, StorageError>;

    async fn upsert_user(&self, user: User) -> Result<(), StorageError>;

    async fn delete_user(&self, username: &str) -> Result<(), StorageError>;

    // Blocking lists

    /// Blocking list of `username`, in insertion order.
    async fn fetch_block_list_items(
        &self,
        username: &str,
    ) -> Result<Vec<BlockListItem>, StorageError>;

    /// Append items, skipping any already present.
    async fn insert_block_list_items(&self, items: &[BlockListItem]) -> Result<(), StorageError>;

    async fn delete_block_list_items(&self, items: &[BlockListItem]) -> Result<(), StorageError>;

    async fn clear_block_list(&self, username: &str) -> Result<(), StorageError>;

    // Rosters

    async fn fetch_roster_items(&self, username: &str) -> Result<Vec<RosterItem>, StorageError>;

    async fn fetch_roster_item(
        &self,
        username: &str,
        jid: &str,
    ) -> Result<Option<RosterItem>, StorageError>;

    async fn upsert_roster_item(&self, item: RosterItem) -> Result<(), StorageError>;

    async fn delete_roster_item(&self, username: &str, jid: &str) -> Result<(), StorageError>;

    // Private XML (XEP-0049), keyed by the payload's namespace

    async fn fetch_private_xml(
        &self,
        username: &str,
        namespace: &str,
    ) -> Result<Option<Element>, StorageError>;

    async fn upsert_private_xml(
        &self,
        username: &str,
        namespace: &str,
        xml: Element,
    ) -> Result<(), StorageError>;

    // vCards (XEP-0054)

    async fn fetch_vcard(&self, username: &str) -> Result<Option<Element>, StorageError>;

    async fn upsert_vcard(&self, username: &str, vcard: Element) -> Result<(), StorageError>;

    // Offline queue (XEP-0160)

    async fn count_offline_messages(&self, username: &str) -> Result<usize, StorageError>;

    async fn insert_offline_message(
        &self,
        username: &str,
        message: Element,
    ) -> Result<(), StorageError>;

    /// Remove and return every queued message, oldest first.
    async fn take_offline_messages(&self, username: &str) -> Result<Vec<Element>, StorageError>;
}
