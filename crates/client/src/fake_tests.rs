// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cv_core::{NodeKind, NodeResult};

fn store() -> FakeStore {
    FakeStore::new(FakeClock::new())
}

fn checkout_seed() -> NodeSeed {
    NodeSeed::root(NodeKind::Checkout, "checkout")
}

#[tokio::test]
async fn create_assigns_id_and_timestamps() {
    let store = store();
    let node = store.create(checkout_seed()).await.unwrap();
    assert!(node.id.as_str().starts_with("node-"));
    assert_eq!(node.created, store.clock().now());
    assert_eq!(node.state, NodeState::Running);
}

#[tokio::test]
async fn create_rejects_children_of_closing_parents() {
    let store = store();
    let mut parent = store.create(checkout_seed()).await.unwrap();
    parent.advance(NodeState::Available).unwrap();
    let parent = store.update(&parent, None).await.unwrap();

    // children accepted while available
    let seed = NodeSeed::child_of(&parent, NodeKind::Kbuild, "kbuild-gcc-12-arm64");
    store.create(seed.clone()).await.unwrap();

    let mut closing = parent.clone();
    closing.advance(NodeState::Closing).unwrap();
    store.update(&closing, None).await.unwrap();

    let err = store.create(seed).await.unwrap_err();
    assert!(matches!(err, ClientError::Invariant(NodeError::ParentClosed(_))));
}

#[tokio::test]
async fn create_rejects_unknown_parent() {
    let store = store();
    let ghost = Node::builder().build();
    let seed = NodeSeed::child_of(&ghost, NodeKind::Kbuild, "kbuild");
    assert!(matches!(store.create(seed).await, Err(ClientError::NotFound(_))));
}

#[tokio::test]
async fn update_cas_conflict_when_state_moved() {
    let store = store();
    let node = store.create(checkout_seed()).await.unwrap();

    // another writer advances the node first
    let mut other = node.clone();
    other.advance(NodeState::Available).unwrap();
    store.update(&other, Some(NodeState::Running)).await.unwrap();

    // the stale writer expected running and must lose
    let mut stale = node.clone();
    stale.finish(NodeResult::Incomplete).unwrap();
    let err = store.update(&stale, Some(NodeState::Running)).await.unwrap_err();
    assert!(matches!(err, ClientError::Conflict(_)));
}

#[tokio::test]
async fn update_rejects_state_regression() {
    let store = store();
    let node = store.create(checkout_seed()).await.unwrap();
    let mut forward = node.clone();
    forward.advance(NodeState::Available).unwrap();
    let stored = store.update(&forward, None).await.unwrap();

    let mut backward = stored.clone();
    backward.state = NodeState::Running;
    let err = store.update(&backward, None).await.unwrap_err();
    assert!(matches!(err, ClientError::Invariant(NodeError::InvalidTransition { .. })));
}

#[tokio::test]
async fn result_is_immutable_once_done() {
    let store = store();
    let node = store.create(checkout_seed()).await.unwrap();
    let mut done = node.clone();
    done.finish(NodeResult::Pass).unwrap();
    let stored = store.update(&done, None).await.unwrap();

    let mut flipped = stored.clone();
    flipped.result = Some(NodeResult::Fail);
    let err = store.update(&flipped, None).await.unwrap_err();
    assert!(matches!(err, ClientError::Invariant(NodeError::ResultImmutable(_))));

    // identical write of a done node is idempotent
    store.update(&stored, None).await.unwrap();
}

#[tokio::test]
async fn processed_by_reporting_is_write_once() {
    let store = store();
    let node = store.create(checkout_seed()).await.unwrap();
    let mut marked = node.clone();
    marked.data.processed_by_reporting = true;
    store.update(&marked, None).await.unwrap();

    let mut unmarked = store.node(node.id).unwrap();
    unmarked.data.processed_by_reporting = false;
    let stored = store.update(&unmarked, None).await.unwrap();
    assert!(stored.data.processed_by_reporting);
}

#[tokio::test]
async fn find_filters_and_limits() {
    let store = store();
    let checkout = store.create(checkout_seed()).await.unwrap();
    for name in ["kbuild-a", "kbuild-b"] {
        store
            .create(NodeSeed::child_of(&checkout, NodeKind::Kbuild, name))
            .await
            .unwrap();
    }

    let kbuilds = store.find(&NodeQuery::new().kind(NodeKind::Kbuild)).await.unwrap();
    assert_eq!(kbuilds.len(), 2);

    let limited = store.find(&NodeQuery::new().kind(NodeKind::Kbuild).limit(1)).await.unwrap();
    assert_eq!(limited.len(), 1);

    let by_parent = store.find(&NodeQuery::new().parent(checkout.id)).await.unwrap();
    assert_eq!(by_parent.len(), 2);
}

#[tokio::test]
async fn writes_publish_events() {
    let store = store();
    let mut rx = store.subscribe(cv_core::NODE_CHANNEL).await.unwrap();

    let node = store.create(checkout_seed()).await.unwrap();
    let mut available = node.clone();
    available.advance(NodeState::Available).unwrap();
    store.update(&available, None).await.unwrap();

    let created = rx.recv().await.unwrap();
    assert_eq!(created.id, node.id);
    assert_eq!(created.state, NodeState::Running);

    let updated = rx.recv().await.unwrap();
    assert_eq!(updated.state, NodeState::Available);
}

#[tokio::test]
async fn blob_facade_returns_public_urls() {
    let store = store();
    let url = store.upload_bytes("linux-mainline.tar.gz", vec![1, 2, 3]).await.unwrap();
    assert_eq!(url, "https://blobs.test/linux-mainline.tar.gz");
    assert_eq!(store.uploads(), vec!["linux-mainline.tar.gz".to_string()]);
}
