mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::TestServer;
use coopdesk_client::catalog::{self, Branch, EventKind, Holiday, NewBranch, NewHoliday};
use coopdesk_client::{CachedResource, Client, QueryCache, QueryOptions};
use coopdesk_core::{BranchId, QueryKey};
use coopdesk_realtime::{ConnectionState, InMemoryTransport, RealtimeConnection, Subject};
use serde_json::json;

async fn connected() -> (Arc<InMemoryTransport>, Arc<RealtimeConnection>) {
    let transport = Arc::new(InMemoryTransport::new());
    let connection = RealtimeConnection::new(transport.clone());
    connection.connect().await.unwrap();
    (transport, connection)
}

/// Wait until `key` goes stale; delivery is asynchronous.
async fn until_stale(cache: &QueryCache, key: &QueryKey) {
    for _ in 0..100 {
        if !cache.is_fresh(key) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{key} was not invalidated");
}

fn resources(client: &Client) -> (CachedResource<Branch, NewBranch>, CachedResource<Holiday, NewHoliday>) {
    (
        client.entity(catalog::BRANCH).unwrap(),
        client.entity(catalog::HOLIDAY).unwrap(),
    )
}

#[tokio::test]
async fn subject_invalidates_only_its_prefix() {
    let srv = TestServer::spawn().await;
    srv.seed_branches(2);
    srv.seed("holiday", json!({ "name": "Town fiesta", "date": "2024-05-15", "branchId": "42" }));
    let (client, _) = srv.client();
    let (branches, holidays) = resources(&client);
    let (_, connection) = connected().await;

    let branch = BranchId::from(42);
    let mut invalidator = client.invalidator(connection.clone());
    invalidator
        .install_all(catalog::branch_invalidation_rules(&branch).unwrap())
        .await
        .unwrap();

    let options = QueryOptions::default();
    branches.get_all(&options).await.unwrap();
    holidays.get_all(&options).await.unwrap();

    let cache = client.cache();
    connection
        .publish_json(&catalog::BRANCH.subject(EventKind::Update, "42").unwrap(), &json!({ "id": "42" }))
        .await
        .unwrap();
    until_stale(cache, &branches.all_key()).await;
    assert!(cache.is_fresh(&holidays.all_key()));

    // Refetch happens on next read, only for the invalidated resource.
    branches.get_all(&options).await.unwrap();
    holidays.get_all(&options).await.unwrap();
    assert_eq!(srv.hits("GET /branch"), 2);
    assert_eq!(srv.hits("GET /holiday"), 1);
}

#[tokio::test]
async fn unrelated_subjects_leave_the_cache_alone() {
    let srv = TestServer::spawn().await;
    srv.seed_branches(1);
    let (client, _) = srv.client();
    let (branches, _) = resources(&client);
    let (transport, connection) = connected().await;

    let mut invalidator = client.invalidator(connection.clone());
    invalidator
        .install_all(catalog::branch_invalidation_rules(&BranchId::from(42)).unwrap())
        .await
        .unwrap();
    branches.get_all(&QueryOptions::default()).await.unwrap();

    let other_branch = catalog::BRANCH.subject(EventKind::Update, "43").unwrap();
    assert_eq!(transport.subscriber_count(&other_branch), 0);
    connection.publish_json(&other_branch, &json!({})).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.cache().is_fresh(&branches.all_key()));
}

#[tokio::test]
async fn member_events_also_invalidate_transactions() {
    let (_, connection) = connected().await;
    let cache = Arc::new(QueryCache::default());
    let branch = BranchId::from(7);

    let mut invalidator = coopdesk_client::RealtimeInvalidator::new(connection.clone(), cache.clone());
    invalidator
        .install_all(catalog::branch_invalidation_rules(&branch).unwrap())
        .await
        .unwrap();

    let members = QueryKey::all(catalog::MEMBER_PROFILE.prefix);
    let transactions = QueryKey::all(catalog::TRANSACTION.prefix);
    let schemes = QueryKey::all(catalog::LOAN_SCHEME.prefix);
    for key in [&members, &transactions, &schemes] {
        cache.set(key, &Vec::<u32>::new()).unwrap();
    }

    let subject = catalog::MEMBER_PROFILE
        .branch_subject(EventKind::Create, &branch)
        .unwrap();
    connection.publish_json(&subject, &json!({ "id": "m-1" })).await.unwrap();

    until_stale(&cache, &members).await;
    until_stale(&cache, &transactions).await;
    assert!(cache.is_fresh(&schemes));
}

#[tokio::test]
async fn closing_the_invalidator_unsubscribes() {
    let (transport, connection) = connected().await;
    let cache = Arc::new(QueryCache::default());
    let subject = Subject::new("holiday", "update").unwrap().id("1").unwrap();

    let mut invalidator = coopdesk_client::RealtimeInvalidator::new(connection.clone(), cache.clone());
    invalidator
        .install(coopdesk_client::InvalidationRule::new(subject.clone(), "holiday"))
        .await
        .unwrap();
    assert_eq!(invalidator.active_subjects(), vec![&subject]);

    invalidator.close();
    assert!(invalidator.active_subjects().is_empty());

    let key = QueryKey::all("holiday");
    cache.set(&key, &1u32).unwrap();
    for _ in 0..100 {
        if transport.subscriber_count(&subject) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    connection.publish_json(&subject, &json!({})).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cache.is_fresh(&key));
}

#[tokio::test]
async fn custom_reactions_run_after_invalidation() {
    let (_, connection) = connected().await;
    let cache = Arc::new(QueryCache::default());
    let seen = Arc::new(AtomicUsize::new(0));
    let subject = catalog::BRANCH.subject(EventKind::Delete, "9").unwrap();

    let mut invalidator = coopdesk_client::RealtimeInvalidator::new(connection.clone(), cache.clone());
    let counter = seen.clone();
    invalidator
        .install_with(subject.clone(), move |message| {
            assert_eq!(message.payload["id"], "9");
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

    connection.publish_json(&subject, &json!({ "id": "9" })).await.unwrap();
    for _ in 0..100 {
        if seen.load(Ordering::SeqCst) == 1 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("custom reaction never ran");
}

#[tokio::test]
async fn losing_the_connection_ends_invalidation() {
    let (transport, connection) = connected().await;
    let cache = Arc::new(QueryCache::default());
    let lost = Arc::new(AtomicUsize::new(0));
    let lost_counter = lost.clone();
    connection.on_connection_lost(move |_| {
        lost_counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut invalidator = coopdesk_client::RealtimeInvalidator::new(connection.clone(), cache.clone());
    invalidator
        .install_all(catalog::branch_invalidation_rules(&BranchId::from(1)).unwrap())
        .await
        .unwrap();

    let mut state = connection.watch_state();
    transport.sever("broker restarted");
    while *state.borrow_and_update() != ConnectionState::Disconnected {
        state.changed().await.unwrap();
    }

    assert_eq!(lost.load(Ordering::SeqCst), 1);
    for _ in 0..100 {
        if invalidator.active_subjects().is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("subscriptions survived the connection loss");
}

#[tokio::test]
async fn each_event_invalidates_its_key_exactly_once() {
    let (_, connection) = connected().await;
    let cache = Arc::new(QueryCache::default());
    let branch = BranchId::from(42);

    let mut invalidator = coopdesk_client::RealtimeInvalidator::new(connection.clone(), cache.clone());
    invalidator
        .install_all(catalog::branch_invalidation_rules(&branch).unwrap())
        .await
        .unwrap();

    let branches = QueryKey::all(catalog::BRANCH.prefix);
    cache.set(&branches, &Vec::<u32>::new()).unwrap();
    assert_eq!(cache.generation(&branches), Some(0));

    let ours = catalog::BRANCH.subject(EventKind::Update, "42").unwrap();
    connection.publish_json(&ours, &json!({ "id": "42" })).await.unwrap();
    until_stale(&cache, &branches).await;
    // Give any duplicate delivery time to land.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.generation(&branches), Some(1));

    let theirs = catalog::BRANCH.subject(EventKind::Update, "43").unwrap();
    connection.publish_json(&theirs, &json!({ "id": "43" })).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.generation(&branches), Some(1));
}
