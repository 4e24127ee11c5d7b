//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};

use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::presence::{Presence, Type as PresenceType};

use crate::c2s::C2sStream;
use crate::router::{Router, RouterConfig};
use crate::stanza::Stanza;
use crate::storage::{InMemoryStorage, Storage, User};

/// A client stream recording everything sent to it.
pub(crate) struct RecordingStream {
    pub username: String,
    pub domain: String,
    pub resource: String,
    pub priority: Option<i8>,
    pub sent: Mutex<Vec<Stanza>>,
}

impl RecordingStream {
    pub fn new(username: &str, resource: &str) -> Arc<Self> {
        Arc::new(Self {
            username: username.to_string(),
            domain: "localhost".to_string(),
            resource: resource.to_string(),
            priority: None,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<Stanza> {
        self.sent.lock().unwrap().clone()
    }

    /// The single IQ sent to this stream.
    pub fn only_iq(&self) -> Iq {
        let sent = self.sent();
        assert_eq!(sent.len(), 1, "expected exactly one stanza, got {:?}", sent);
        match sent.into_iter().next() {
            Some(Stanza::Iq(iq)) => iq,
            other => panic!("Expected IQ, got {:?}", other),
        }
    }
}

impl C2sStream for RecordingStream {
    fn username(&self) -> &str {
        &self.username
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn resource(&self) -> &str {
        &self.resource
    }

    fn presence(&self) -> Option<Presence> {
        self.priority.map(|priority| {
            let mut presence = Presence::new(PresenceType::None);
            presence.priority = priority;
            presence
        })
    }

    fn send_element(&self, stanza: Stanza) {
        self.sent.lock().unwrap().push(stanza);
    }
}

/// A router on `localhost` over fresh in-memory storage.
pub(crate) fn router_with_storage() -> (Arc<Router>, Arc<InMemoryStorage>) {
    let storage = Arc::new(InMemoryStorage::new());
    let router = Router::new(&RouterConfig::default(), storage.clone()).unwrap();
    (Arc::new(router), storage)
}

pub(crate) async fn create_user(storage: &InMemoryStorage, username: &str) {
    storage
        .upsert_user(User {
            username: username.to_string(),
            password: "secret".to_string(),
        })
        .await
        .unwrap();
}

/// Build an IQ from `alice@localhost/home`.
pub(crate) fn iq(to: Option<&str>, payload: IqType) -> Iq {
    Iq {
        from: Some("alice@localhost/home".parse().unwrap()),
        to: to.map(|t| t.parse().unwrap()),
        id: "iq1".to_string(),
        payload,
    }
}

/// Assert `iq` is an error reply carrying `condition`.
pub(crate) fn assert_iq_error(
    iq: &Iq,
    condition: xmpp_parsers::stanza_error::DefinedCondition,
) {
    match &iq.payload {
        IqType::Error(err) => assert_eq!(err.defined_condition, condition),
        other => panic!("Expected error {:?}, got {:?}", condition, other),
    }
}
