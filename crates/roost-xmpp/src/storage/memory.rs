//! In-memory persistence backend.

use async_trait::async_trait;
use dashmap::DashMap;
use minidom::Element;
use tracing::debug;

use super::{BlockListItem, RosterItem, Storage, StorageError, User};

/// Volatile [`Storage`] backed by concurrent maps.
///
/// Every map is keyed by username; nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    users: DashMap<String, User>,
    block_lists: DashMap<String, Vec<BlockListItem>>,
    rosters: DashMap<String, Vec<RosterItem>>,
    private_xml: DashMap<(String, String), Element>,
    vcards: DashMap<String, Element>,
    offline: DashMap<String, Vec<Element>>,
}

impl InMemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn user_exists(&self, username: &str) -> Result<bool, StorageError> {
        Ok(self.users.contains_key(username))
    }

    async fn fetch_user(&self, username: &str) -> Result<Option<User>, StorageError> {
        Ok(self.users.get(username).map(|u| u.clone()))
    }

    async fn upsert_user(&self, user: User) -> Result<(), StorageError> {
        debug!(username = %user.username, "Storing user");
        self.users.insert(user.username.clone(), user);
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> Result<(), StorageError> {
        self.users.remove(username);
        self.block_lists.remove(username);
        self.rosters.remove(username);
        self.vcards.remove(username);
        self.offline.remove(username);
        self.private_xml.retain(|(owner, _), _| owner != username);
        Ok(())
    }

    async fn fetch_block_list_items(
        &self,
        username: &str,
    ) -> Result<Vec<BlockListItem>, StorageError> {
        Ok(self
            .block_lists
            .get(username)
            .map(|items| items.clone())
            .unwrap_or_default())
    }

    async fn insert_block_list_items(&self, items: &[BlockListItem]) -> Result<(), StorageError> {
        for item in items {
            let mut list = self.block_lists.entry(item.username.clone()).or_default();
            if !list.iter().any(|existing| existing.jid == item.jid) {
                list.push(item.clone());
            }
        }
        Ok(())
    }

    async fn delete_block_list_items(&self, items: &[BlockListItem]) -> Result<(), StorageError> {
        for item in items {
            if let Some(mut list) = self.block_lists.get_mut(&item.username) {
                list.retain(|existing| existing.jid != item.jid);
            }
        }
        self.block_lists.retain(|_, list| !list.is_empty());
        Ok(())
    }

    async fn clear_block_list(&self, username: &str) -> Result<(), StorageError> {
        self.block_lists.remove(username);
        Ok(())
    }

    async fn fetch_roster_items(&self, username: &str) -> Result<Vec<RosterItem>, StorageError> {
        Ok(self
            .rosters
            .get(username)
            .map(|items| items.clone())
            .unwrap_or_default())
    }

    async fn fetch_roster_item(
        &self,
        username: &str,
        jid: &str,
    ) -> Result<Option<RosterItem>, StorageError> {
        Ok(self
            .rosters
            .get(username)
            .and_then(|items| items.iter().find(|i| i.jid == jid).cloned()))
    }

    async fn upsert_roster_item(&self, item: RosterItem) -> Result<(), StorageError> {
        let mut items = self.rosters.entry(item.username.clone()).or_default();
        match items.iter_mut().find(|existing| existing.jid == item.jid) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
        Ok(())
    }

    async fn delete_roster_item(&self, username: &str, jid: &str) -> Result<(), StorageError> {
        if let Some(mut items) = self.rosters.get_mut(username) {
            items.retain(|i| i.jid != jid);
        }
        Ok(())
    }

    async fn fetch_private_xml(
        &self,
        username: &str,
        namespace: &str,
    ) -> Result<Option<Element>, StorageError> {
        Ok(self
            .private_xml
            .get(&(username.to_string(), namespace.to_string()))
            .map(|e| e.clone()))
    }

    async fn upsert_private_xml(
        &self,
        username: &str,
        namespace: &str,
        xml: Element,
    ) -> Result<(), StorageError> {
        self.private_xml
            .insert((username.to_string(), namespace.to_string()), xml);
        Ok(())
    }

    async fn fetch_vcard(&self, username: &str) -> Result<Option<Element>, StorageError> {
        Ok(self.vcards.get(username).map(|v| v.clone()))
    }

    async fn upsert_vcard(&self, username: &str, vcard: Element) -> Result<(), StorageError> {
        self.vcards.insert(username.to_string(), vcard);
        Ok(())
    }

    async fn count_offline_messages(&self, username: &str) -> Result<usize, StorageError> {
        Ok(self.offline.get(username).map(|q| q.len()).unwrap_or(0))
    }

    async fn insert_offline_message(
        &self,
        username: &str,
        message: Element,
    ) -> Result<(), StorageError> {
        self.offline
            .entry(username.to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn take_offline_messages(&self, username: &str) -> Result<Vec<Element>, StorageError> {
        Ok(self
            .offline
            .remove(username)
            .map(|(_, queue)| queue)
            .unwrap_or_default())
    }
}
