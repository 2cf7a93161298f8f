// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{available_checkout, finish, fresh_store, running_kbuild, settings};
use cv_client::{FakeStore, NodeStore};
use cv_core::{NodeKind, NodeResult, NodeSeed};
use std::sync::Arc;
use std::time::Duration;

fn reconciler(store: &Arc<FakeStore>) -> Reconciler<cv_core::FakeClock> {
    Reconciler::new(settings(), store.clone(), store.clock().clone())
}

async fn child(store: &FakeStore, parent: &Node, name: &str) -> Node {
    let mut seed = NodeSeed::child_of(parent, NodeKind::Job, name);
    seed.timeout = Some(store.clock().now() + chrono::Duration::hours(6));
    store.create(seed).await.unwrap()
}

#[tokio::test]
async fn nodes_inside_their_deadlines_are_untouched() {
    let store = fresh_store();
    let checkout = available_checkout(&store).await;
    let kbuild = running_kbuild(&store, &checkout).await;

    reconciler(&store).sweep().await.unwrap();

    assert_eq!(store.node(checkout.id).unwrap().state, NodeState::Available);
    assert_eq!(store.node(kbuild.id).unwrap().state, NodeState::Running);
}

#[tokio::test]
async fn holdoff_elapsed_with_open_children_moves_to_closing() {
    let store = fresh_store();
    let checkout = available_checkout(&store).await;
    let a = child(&store, &checkout, "suite-a").await;
    let b = child(&store, &checkout, "suite-b").await;

    store.clock().advance(Duration::from_secs(11 * 60));
    reconciler(&store).sweep().await.unwrap();

    let parent = store.node(checkout.id).unwrap();
    assert_eq!(parent.state, NodeState::Closing);
    // children are unaffected by the parent's transition
    assert_eq!(store.node(a.id).unwrap().state, NodeState::Running);
    assert_eq!(store.node(b.id).unwrap().state, NodeState::Running);

    // and a closing parent rejects new children
    let err = store
        .create(NodeSeed::child_of(&parent, NodeKind::Job, "late"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        cv_client::ClientError::Invariant(cv_core::NodeError::ParentClosed(_))
    ));
}

#[tokio::test]
async fn holdoff_elapsed_with_finished_children_closes_and_aggregates() {
    let store = fresh_store();
    let checkout = available_checkout(&store).await;
    let a = child(&store, &checkout, "suite-a").await;
    let b = child(&store, &checkout, "suite-b").await;
    finish(&store, &a, NodeResult::Pass).await;
    finish(&store, &b, NodeResult::Skip).await;

    store.clock().advance(Duration::from_secs(11 * 60));
    reconciler(&store).sweep().await.unwrap();

    let parent = store.node(checkout.id).unwrap();
    assert_eq!(parent.state, NodeState::Done);
    // mixed pass and skip rolls up to pass
    assert_eq!(parent.result, Some(NodeResult::Pass));
}

#[tokio::test]
async fn closing_parent_finishes_once_stragglers_are_done() {
    let store = fresh_store();
    let checkout = available_checkout(&store).await;
    let a = child(&store, &checkout, "suite-a").await;
    let b = child(&store, &checkout, "suite-b").await;

    store.clock().advance(Duration::from_secs(11 * 60));
    let reconciler = reconciler(&store);
    reconciler.sweep().await.unwrap();
    assert_eq!(store.node(checkout.id).unwrap().state, NodeState::Closing);

    finish(&store, &a, NodeResult::Pass).await;
    finish(&store, &b, NodeResult::Fail).await;
    reconciler.sweep().await.unwrap();

    let parent = store.node(checkout.id).unwrap();
    assert_eq!(parent.state, NodeState::Done);
    assert_eq!(parent.result, Some(NodeResult::Fail));
}

#[tokio::test]
async fn failed_setup_child_downgrades_parent_to_incomplete() {
    let store = fresh_store();
    let checkout = available_checkout(&store).await;
    let setup = child(&store, &checkout, "setup").await;
    let login = child(&store, &checkout, "login").await;
    finish(&store, &setup, NodeResult::Fail).await;
    finish(&store, &login, NodeResult::Fail).await;

    store.clock().advance(Duration::from_secs(11 * 60));
    reconciler(&store).sweep().await.unwrap();

    assert_eq!(store.node(checkout.id).unwrap().result, Some(NodeResult::Incomplete));
}

#[tokio::test]
async fn timeout_while_running_is_incomplete_and_closes_the_subtree() {
    let store = fresh_store();
    let checkout = available_checkout(&store).await;
    let kbuild = running_kbuild(&store, &checkout).await;

    // deep child under the kbuild
    let suite = child(&store, &kbuild, "boot").await;

    store.clock().advance(Duration::from_secs(13 * 3600));
    reconciler(&store).sweep().await.unwrap();

    let kbuild = store.node(kbuild.id).unwrap();
    assert_eq!(kbuild.state, NodeState::Done);
    assert_eq!(kbuild.result, Some(NodeResult::Incomplete));

    let suite = store.node(suite.id).unwrap();
    assert_eq!(suite.state, NodeState::Done);
    assert_eq!(suite.result, Some(NodeResult::Incomplete));

    // the checkout was past running, so its timeout closes as pass
    let checkout = store.node(checkout.id).unwrap();
    assert_eq!(checkout.state, NodeState::Done);
    assert_eq!(checkout.result, Some(NodeResult::Pass));
}

#[tokio::test]
async fn timeout_in_available_with_finished_children_is_pass() {
    let store = fresh_store();
    let checkout = available_checkout(&store).await;
    let kbuild = running_kbuild(&store, &checkout).await;
    finish(&store, &kbuild, NodeResult::Pass).await;

    store.clock().advance(Duration::from_secs(13 * 3600));
    reconciler(&store).sweep().await.unwrap();

    let checkout = store.node(checkout.id).unwrap();
    assert_eq!(checkout.state, NodeState::Done);
    assert_eq!(checkout.result, Some(NodeResult::Pass));
}

#[tokio::test]
async fn children_settle_before_parents_within_one_sweep() {
    let store = fresh_store();
    let checkout = available_checkout(&store).await;

    // the kbuild sits in available with an elapsed holdoff and finished
    // children; the checkout's holdoff has elapsed too
    let kbuild = running_kbuild(&store, &checkout).await;
    let mut open = store.node(kbuild.id).unwrap();
    open.result = Some(NodeResult::Pass);
    open.advance(NodeState::Available).unwrap();
    open.holdoff = Some(store.clock().now() + chrono::Duration::minutes(5));
    let kbuild = store.update(&open, None).await.unwrap();
    let suite = child(&store, &kbuild, "baseline-arm64").await;
    finish(&store, &suite, NodeResult::Pass).await;

    store.clock().advance(Duration::from_secs(11 * 60));
    reconciler(&store).sweep().await.unwrap();

    // one sweep closed the kbuild first, then the checkout saw it final
    assert_eq!(store.node(kbuild.id).unwrap().state, NodeState::Done);
    let checkout = store.node(checkout.id).unwrap();
    assert_eq!(checkout.state, NodeState::Done);
    assert_eq!(checkout.result, Some(NodeResult::Pass));
}
