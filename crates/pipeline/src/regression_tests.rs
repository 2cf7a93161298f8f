// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{available_checkout, finish, fresh_store, running_kbuild};
use cv_client::{FakeStore, NodeStore};
use std::sync::Arc;

fn detector(store: &Arc<FakeStore>) -> RegressionDetector {
    RegressionDetector::new(store.clone())
}

/// Two runs of the same fingerprint: an older pass and a fresh fail.
async fn pass_then_fail(store: &FakeStore) -> (Node, Node) {
    let checkout = available_checkout(store).await;
    let good = running_kbuild(store, &checkout).await;
    let good = finish(store, &good, NodeResult::Pass).await;

    let mut seed = crate::retry::retry_seed(&good);
    seed.data.retry_counter = 0;
    seed.data.runtime_job_id = Some("4022".to_string());
    let bad = store.create(seed).await.unwrap();
    let bad = finish(store, &bad, NodeResult::Fail).await;
    (good, bad)
}

#[tokio::test]
async fn pass_to_fail_emits_regression_node() {
    let store = fresh_store();
    let (good, bad) = pass_then_fail(&store).await;

    let regression = detector(&store).handle(bad.id).await.unwrap().unwrap();

    assert_eq!(regression.kind, NodeKind::Regression);
    assert_eq!(regression.name, bad.name);
    assert_eq!(regression.parent, Some(bad.id));
    assert_eq!(regression.state, NodeState::Done);
    assert_eq!(regression.result, Some(NodeResult::Fail));
    // cross-links: regression → last pass, failed node → regression
    assert_eq!(regression.data.regression, Some(good.id));
    assert_eq!(store.node(bad.id).unwrap().data.regression, Some(regression.id));
    // the failing revision rides along
    assert_eq!(regression.revision().unwrap().commit, "deadbeef");
}

#[tokio::test]
async fn no_prior_pass_means_no_regression() {
    let store = fresh_store();
    let checkout = available_checkout(&store).await;
    let kbuild = running_kbuild(&store, &checkout).await;
    let failed = finish(&store, &kbuild, NodeResult::Fail).await;

    let regression = detector(&store).handle(failed.id).await.unwrap();
    assert!(regression.is_none());
}

#[tokio::test]
async fn tool_errors_are_not_regressions() {
    let store = fresh_store();
    let (_, bad) = pass_then_fail(&store).await;

    let mut infra = store.node(bad.id).unwrap();
    infra.data.error_code = Some("infrastructure".to_string());
    store.update(&infra, None).await.unwrap();

    let regression = detector(&store).handle(bad.id).await.unwrap();
    assert!(regression.is_none());
}

#[tokio::test]
async fn different_fingerprint_does_not_match() {
    let store = fresh_store();
    let (_, bad) = pass_then_fail(&store).await;

    // same name but a different compiler is a different fingerprint
    let mut seed = crate::retry::retry_seed(&store.node(bad.id).unwrap());
    seed.data.retry_counter = 0;
    seed.data.compiler = Some("clang-17".to_string());
    seed.data.runtime_job_id = Some("4023".to_string());
    let other = store.create(seed).await.unwrap();
    let other = finish(&store, &other, NodeResult::Fail).await;

    let regression = detector(&store).handle(other.id).await.unwrap();
    assert!(regression.is_none());
}

#[tokio::test]
async fn redelivered_failure_records_one_regression() {
    let store = fresh_store();
    let (_, bad) = pass_then_fail(&store).await;
    let detector = detector(&store);

    let first = detector.handle(bad.id).await.unwrap();
    assert!(first.is_some());
    let second = detector.handle(bad.id).await.unwrap();
    assert!(second.is_none());

    let regressions: Vec<_> = store
        .all()
        .into_iter()
        .filter(|n| n.kind == NodeKind::Regression)
        .collect();
    assert_eq!(regressions.len(), 1);
}

#[tokio::test]
async fn passing_nodes_are_ignored() {
    let store = fresh_store();
    let checkout = available_checkout(&store).await;
    let kbuild = running_kbuild(&store, &checkout).await;
    let passed = finish(&store, &kbuild, NodeResult::Pass).await;

    assert!(detector(&store).handle(passed.id).await.unwrap().is_none());
}
