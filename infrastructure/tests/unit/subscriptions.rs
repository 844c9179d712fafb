//! Remote subscription storage: set semantics, entry cleanup and
//! compare-and-swap retries under contention.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use che_common::RemoteSubscriptionContext;
use che_infra::application::RemoteSubscriptionStorage;
use che_infra::application::ports::ReplicatedMap;
use che_infra::domain::CacheError;
use che_infra::infra::InMemoryReplicatedMap;

use crate::mocks::ContendedMap;

const METHOD: &str = "event:workspace-status:changed";

fn ctx(endpoint: &str) -> RemoteSubscriptionContext {
    RemoteSubscriptionContext::new(endpoint).with_scope("workspaceId", "ws1")
}

#[tokio::test]
async fn unknown_method_has_no_subscribers() {
    let storage = RemoteSubscriptionStorage::new(InMemoryReplicatedMap::new());
    assert!(storage.get_by_method(METHOD).await.unwrap().is_empty());
}

#[tokio::test]
async fn add_is_a_set_insert() {
    let storage = RemoteSubscriptionStorage::new(InMemoryReplicatedMap::new());
    storage.add_subscription(METHOD, ctx("a")).await.unwrap();
    storage.add_subscription(METHOD, ctx("a")).await.unwrap();
    storage.add_subscription(METHOD, ctx("b")).await.unwrap();
    assert_eq!(
        storage.get_by_method(METHOD).await.unwrap(),
        HashSet::from([ctx("a"), ctx("b")])
    );
}

#[tokio::test]
async fn removing_the_last_subscriber_deletes_the_entry() {
    let map = InMemoryReplicatedMap::new();
    let storage = RemoteSubscriptionStorage::new(map.clone());
    storage.add_subscription(METHOD, ctx("a")).await.unwrap();
    storage.add_subscription(METHOD, ctx("b")).await.unwrap();

    storage.remove_subscription(METHOD, "a").await.unwrap();
    assert_eq!(
        storage.get_by_method(METHOD).await.unwrap(),
        HashSet::from([ctx("b")])
    );
    storage.remove_subscription(METHOD, "b").await.unwrap();
    assert_eq!(map.get(METHOD).await.unwrap(), None);

    storage.remove_subscription(METHOD, "missing").await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_are_all_kept() {
    let storage = Arc::new(RemoteSubscriptionStorage::new(InMemoryReplicatedMap::new()));
    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let storage = Arc::clone(&storage);
            tokio::spawn(async move {
                storage
                    .add_subscription(METHOD, ctx(&format!("endpoint-{i}")))
                    .await
                    .unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(storage.get_by_method(METHOD).await.unwrap().len(), 32);
}

#[tokio::test]
async fn write_from_another_node_is_not_lost() {
    let other_node = BTreeSet::from([ctx("remote")]);
    let map = Arc::new(ContendedMap::with_writes(vec![(
        METHOD.to_string(),
        serde_json::to_string(&other_node).unwrap(),
    )]));
    let storage = RemoteSubscriptionStorage::new(Arc::clone(&map));

    storage.add_subscription(METHOD, ctx("local")).await.unwrap();

    assert_eq!(map.interference(), 1);
    assert_eq!(
        storage.get_by_method(METHOD).await.unwrap(),
        HashSet::from([ctx("local"), ctx("remote")])
    );
}

#[tokio::test]
async fn endless_contention_gives_up() {
    let map = Arc::new(ContendedMap::endless());
    let storage = RemoteSubscriptionStorage::new(Arc::clone(&map));
    let err = storage.add_subscription(METHOD, ctx("local")).await.unwrap_err();
    assert!(matches!(err, CacheError::Replication(_)));
    assert!(map.interference() > 1);
}

#[tokio::test]
async fn invalid_method_is_rejected() {
    let storage = RemoteSubscriptionStorage::new(InMemoryReplicatedMap::new());
    assert!(matches!(
        storage.add_subscription("", ctx("a")).await.unwrap_err(),
        CacheError::InvalidField { .. }
    ));
}
