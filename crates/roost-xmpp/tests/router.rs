//! Router delivery, blocking and federation tests.
//!
//! Run with: `cargo test -p roost-xmpp --test router`

mod common;

use std::sync::Arc;

use common::{create_user, init_test, router, ControlledStorage, FetchGate, MockC2s, MockS2sProvider};
use jid::Jid;
use roost_xmpp::storage::{BlockListItem, InMemoryStorage, Storage};
use roost_xmpp::{C2sStream, RouterError, Stanza};
use xmpp_parsers::message::Message;
use xmpp_parsers::presence::{Presence, Type as PresenceType};

fn jid(s: &str) -> Jid {
    s.parse().unwrap()
}

fn message(from: Option<&str>, to: &str) -> Stanza {
    let mut msg = Message::new(Some(jid(to)));
    msg.from = from.map(jid);
    msg.into()
}

fn presence(from: &str, to: &str) -> Stanza {
    let mut pres = Presence::new(PresenceType::None);
    pres.from = Some(jid(from));
    pres.to = Some(jid(to));
    pres.into()
}

async fn block(storage: &dyn Storage, username: &str, blocked: &str) {
    storage
        .insert_block_list_items(&[BlockListItem {
            username: username.to_string(),
            jid: blocked.to_string(),
        }])
        .await
        .unwrap();
}

// =============================================================================
// Local delivery
// =============================================================================

#[tokio::test]
async fn test_message_to_bare_jid_picks_highest_priority() {
    init_test();
    let router = router(Arc::new(InMemoryStorage::new()));
    let low = MockC2s::new("bob", "low").with_priority(1).build();
    let high = MockC2s::new("bob", "high").with_priority(5).build();
    let tie = MockC2s::new("bob", "tie").with_priority(5).build();
    router.bind(low.clone());
    router.bind(high.clone());
    router.bind(tie.clone());

    router
        .route(message(Some("alice@localhost/home"), "bob@localhost"))
        .await
        .unwrap();

    assert_eq!(low.sent_count(), 0);
    assert_eq!(high.sent_count(), 1, "earliest bound stream wins the tie");
    assert_eq!(tie.sent_count(), 0);
}

#[tokio::test]
async fn test_message_without_presence_goes_to_first_bound() {
    init_test();
    let router = router(Arc::new(InMemoryStorage::new()));
    let first = MockC2s::new("bob", "first").build();
    let second = MockC2s::new("bob", "second").build();
    router.bind(first.clone());
    router.bind(second.clone());

    router
        .route(message(Some("alice@localhost/home"), "bob@localhost"))
        .await
        .unwrap();

    assert_eq!(first.sent_count(), 1);
    assert_eq!(second.sent_count(), 0);
}

#[tokio::test]
async fn test_presence_to_bare_jid_is_broadcast() {
    init_test();
    let router = router(Arc::new(InMemoryStorage::new()));
    let phone = MockC2s::new("bob", "phone").build();
    let desk = MockC2s::new("bob", "desk").build();
    router.bind(phone.clone());
    router.bind(desk.clone());

    router
        .route(presence("alice@localhost/home", "bob@localhost"))
        .await
        .unwrap();

    assert_eq!(phone.sent_count(), 1);
    assert_eq!(desk.sent_count(), 1);
}

#[tokio::test]
async fn test_full_jid_reaches_only_that_resource() {
    init_test();
    let router = router(Arc::new(InMemoryStorage::new()));
    let phone = MockC2s::new("bob", "phone").with_priority(10).build();
    let desk = MockC2s::new("bob", "desk").build();
    router.bind(phone.clone());
    router.bind(desk.clone());

    router
        .route(message(Some("alice@localhost/home"), "bob@localhost/desk"))
        .await
        .unwrap();
    assert_eq!(phone.sent_count(), 0);
    assert_eq!(desk.sent_count(), 1);

    let err = router
        .route(message(Some("alice@localhost/home"), "bob@localhost/tablet"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::ResourceNotFound));
}

#[tokio::test]
async fn test_unbound_recipient_errors() {
    init_test();
    let storage = Arc::new(InMemoryStorage::new());
    create_user(storage.as_ref(), "bob").await;
    let router = router(storage);

    let err = router
        .route(message(Some("alice@localhost/home"), "bob@localhost"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::NotAuthenticated));

    let err = router
        .route(message(Some("alice@localhost/home"), "nobody@localhost"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::NotExistingAccount));
}

#[tokio::test]
async fn test_missing_destination() {
    init_test();
    let router = router(Arc::new(InMemoryStorage::new()));
    let mut msg = Message::new(None);
    msg.from = Some(jid("alice@localhost/home"));
    let err = router.route(msg.into()).await.unwrap_err();
    assert!(matches!(err, RouterError::MissingDestination));
}

#[tokio::test]
async fn test_bind_then_unbind_restores_table() {
    init_test();
    let router = router(Arc::new(InMemoryStorage::new()));
    let desk = MockC2s::new("bob", "desk").build();
    router.bind(desk.clone());

    let phone = MockC2s::new("bob", "phone").build();
    router.bind(phone.clone());
    router.unbind(phone.as_ref());

    let streams = router.user_streams("bob");
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].resource(), "desk");

    router.unbind(desk.as_ref());
    assert!(router.user_streams("bob").is_empty());
    assert!(router.local_jids().is_empty());
}

#[tokio::test]
async fn test_duplicate_bind_keeps_both_entries() {
    init_test();
    let router = router(Arc::new(InMemoryStorage::new()));
    let first = MockC2s::new("bob", "phone").build();
    let second = MockC2s::new("bob", "phone").build();
    router.bind(first.clone());
    router.bind(second.clone());
    assert_eq!(router.user_streams("bob").len(), 2);

    router.unbind(first.as_ref());
    assert_eq!(router.user_streams("bob").len(), 1);
    router.unbind(second.as_ref());
    assert!(router.user_streams("bob").is_empty());
}

// =============================================================================
// Blocking
// =============================================================================

#[tokio::test]
async fn test_bare_jid_block_refuses_every_resource() {
    init_test();
    let storage = Arc::new(InMemoryStorage::new());
    block(storage.as_ref(), "alice", "romeo@montague.lit").await;
    let router = router(storage);
    let alice = MockC2s::new("alice", "home").build();
    router.bind(alice.clone());

    let err = router
        .route(message(Some("romeo@montague.lit/balcony"), "alice@localhost"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::BlockedJid));

    router
        .route(message(Some("mercutio@montague.lit/street"), "alice@localhost"))
        .await
        .unwrap();
    assert_eq!(alice.sent_count(), 1);

    // Server-generated stanzas bypass blocking
    router
        .must_route(message(Some("romeo@montague.lit/balcony"), "alice@localhost"))
        .await
        .unwrap();
    assert_eq!(alice.sent_count(), 2);
}

#[tokio::test]
async fn test_domain_block_refuses_all_users_of_domain() {
    init_test();
    let storage = Arc::new(InMemoryStorage::new());
    block(storage.as_ref(), "alice", "montague.lit").await;
    let router = router(storage);
    router.bind(MockC2s::new("alice", "home").build());

    for sender in ["romeo@montague.lit/balcony", "montague.lit", "tybalt@montague.lit"] {
        let err = router
            .route(message(Some(sender), "alice@localhost"))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::BlockedJid), "{sender} should be blocked");
    }
    router
        .route(message(Some("nurse@capulet.lit"), "alice@localhost"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_block_list_changes_apply_after_reload() {
    init_test();
    let storage = Arc::new(InMemoryStorage::new());
    let router = router(storage.clone());
    let romeo = jid("romeo@montague.lit/balcony");

    assert!(!router.is_blocked_jid(&romeo, "alice").await);

    block(storage.as_ref(), "alice", "romeo@montague.lit").await;
    assert!(!router.is_blocked_jid(&romeo, "alice").await, "list is cached");

    router.reload_block_list("alice").await;
    assert!(router.is_blocked_jid(&romeo, "alice").await);
}

#[tokio::test]
async fn test_mutation_after_reload_is_seen_by_next_check() {
    init_test();
    let storage = Arc::new(InMemoryStorage::new());
    let router = router(storage.clone());
    let romeo = jid("romeo@montague.lit/balcony");
    assert!(!router.is_blocked_jid(&romeo, "alice").await);

    router.reload_block_list("alice").await;
    block(storage.as_ref(), "alice", "romeo@montague.lit").await;
    assert!(router.is_blocked_jid(&romeo, "alice").await);
}

#[tokio::test]
async fn test_reload_during_cache_fill_is_not_lost() {
    init_test();
    let gate = FetchGate::new();
    let storage = Arc::new(ControlledStorage {
        block_list_gate: Some(gate.clone()),
        ..Default::default()
    });
    let router = router(storage.clone());
    let iago = jid("iago@localhost/evil");

    // First check reads the empty list and stalls before caching it
    let check = tokio::spawn({
        let router = router.clone();
        let iago = iago.clone();
        async move { router.is_blocked_jid(&iago, "alice").await }
    });
    gate.reached.notified().await;

    block(storage.as_ref(), "alice", "iago@localhost").await;
    let reload = tokio::spawn({
        let router = router.clone();
        async move { router.reload_block_list("alice").await }
    });
    gate.release.notify_one();

    assert!(!check.await.unwrap());
    reload.await.unwrap();
    assert!(router.is_blocked_jid(&iago, "alice").await);
}

#[tokio::test]
async fn test_block_list_failure_leaves_sender_unblocked() {
    init_test();
    let storage = Arc::new(ControlledStorage {
        fail_block_list: true,
        ..Default::default()
    });
    let router = router(storage);
    let alice = MockC2s::new("alice", "home").build();
    router.bind(alice.clone());

    router
        .route(message(Some("romeo@montague.lit/balcony"), "alice@localhost"))
        .await
        .unwrap();
    assert_eq!(alice.sent_count(), 1);
}

#[tokio::test]
async fn test_account_lookup_failure_surfaces() {
    init_test();
    let storage = Arc::new(ControlledStorage {
        fail_user_exists: true,
        ..Default::default()
    });
    let router = router(storage);

    let err = router
        .route(message(Some("alice@localhost/home"), "bob@localhost"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Storage(_)));
}

// =============================================================================
// Federation
// =============================================================================

#[tokio::test]
async fn test_remote_domain_uses_s2s_provider() {
    init_test();
    let router = router(Arc::new(InMemoryStorage::new()));

    let err = router
        .route(message(Some("alice@localhost/home"), "juliet@capulet.lit"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::FailedRemoteConnect));

    let provider = Arc::new(MockS2sProvider::new());
    router.set_s2s_out_provider(provider.clone());
    router
        .route(message(Some("alice@localhost/home"), "juliet@capulet.lit"))
        .await
        .unwrap();
    assert_eq!(provider.out.sent_count(), 1);
    assert_eq!(
        provider.requests.lock().unwrap().as_slice(),
        &[("localhost".to_string(), "capulet.lit".to_string())]
    );

    let err = router
        .route(message(None, "juliet@capulet.lit"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::MissingSender));
}

#[tokio::test]
async fn test_unreachable_remote_domain() {
    init_test();
    let router = router(Arc::new(InMemoryStorage::new()));
    let provider = Arc::new(MockS2sProvider::failing());
    router.set_s2s_out_provider(provider.clone());

    let err = router
        .route(message(Some("alice@localhost/home"), "juliet@capulet.lit"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::FailedRemoteConnect));
    assert_eq!(provider.out.sent_count(), 0);
}
