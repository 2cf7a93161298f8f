// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{available_checkout, fresh_store, settings};
use cv_client::{FakeStore, NodeStore};
use cv_core::{FakeClock, NodeEvent, NodeKind};
use cv_runtimes::{FakeRenderer, FakeRuntime};
use std::sync::Arc;

struct Fixture {
    store: Arc<FakeStore>,
    scheduler: Scheduler<FakeClock>,
    k8s: Arc<FakeRuntime>,
    lava: Arc<FakeRuntime>,
    renderer: Arc<FakeRenderer>,
}

fn fixture() -> Fixture {
    let store = fresh_store();
    let renderer = Arc::new(FakeRenderer::default());
    let mut scheduler =
        Scheduler::new(settings(), store.clone(), renderer.clone(), store.clock().clone());
    let k8s = Arc::new(FakeRuntime::new("k8s-gke"));
    let lava = Arc::new(FakeRuntime::new("lava-collabora"));
    scheduler.register_runtime("k8s-gke", k8s.clone());
    scheduler.register_runtime("lava-collabora", lava.clone());
    Fixture { store, scheduler, k8s, lava, renderer }
}

#[tokio::test]
async fn checkout_available_dispatches_kbuild() {
    let fx = fixture();
    let checkout = available_checkout(&fx.store).await;

    let created = fx.scheduler.handle_event(&NodeEvent::of(&checkout)).await.unwrap();
    assert_eq!(created.len(), 1);

    let kbuild = fx.store.node(created[0].id).unwrap();
    assert_eq!(kbuild.kind, NodeKind::Kbuild);
    assert_eq!(kbuild.name, "kbuild-gcc-12-arm64");
    assert_eq!(kbuild.parent, Some(checkout.id));
    assert_eq!(kbuild.path, vec!["checkout".to_string(), "kbuild-gcc-12-arm64".to_string()]);
    assert_eq!(kbuild.state, NodeState::Running);
    assert_eq!(kbuild.data.arch.as_deref(), Some("arm64"));
    assert_eq!(kbuild.data.compiler.as_deref(), Some("gcc-12"));
    assert_eq!(kbuild.data.defconfig.as_deref(), Some("defconfig"));
    assert_eq!(kbuild.data.runtime.as_deref(), Some("k8s-gke"));
    assert!(kbuild.timeout.is_some());
    // the external job id was recorded after submission
    assert!(kbuild.data.runtime_job_id.is_some());

    let submissions = fx.k8s.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].0.name, "kbuild-gcc-12-arm64");
    assert_eq!(submissions[0].0.image.as_deref(), Some("conveyor/gcc-12:arm64"));

    // the renderer got the tarball through the parent's artifacts
    let calls = fx.renderer.calls();
    let (template, params) = &calls[0];
    assert_eq!(template, "kbuild.jinja2");
    assert_eq!(
        params["artifacts"]["tarball"],
        "https://blobs.test/linux-mainline-master-v6.6-rc1.tar.gz"
    );
    assert_eq!(params["params"]["compiler"], "gcc-12");
}

#[tokio::test]
async fn duplicate_event_delivery_creates_one_child_per_entry() {
    let fx = fixture();
    let checkout = available_checkout(&fx.store).await;
    let event = NodeEvent::of(&checkout);

    let first = fx.scheduler.handle_event(&event).await.unwrap();
    let second = fx.scheduler.handle_event(&event).await.unwrap();

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(fx.store.children_of(checkout.id).len(), 1);
    assert_eq!(fx.k8s.submissions().len(), 1);
}

#[tokio::test]
async fn jobfilter_is_an_and_predicate_over_job_names() {
    let fx = fixture();
    let mut checkout = available_checkout(&fx.store).await;
    checkout.jobfilter = Some(vec!["baseline-*".to_string()]);
    let checkout = fx.store.update(&checkout, None).await.unwrap();

    let created = fx.scheduler.handle_event(&NodeEvent::of(&checkout)).await.unwrap();
    assert!(created.is_empty());
    assert!(fx.k8s.submissions().is_empty());
}

#[tokio::test]
async fn rules_gate_dispatch_by_tree() {
    let fx = fixture();
    let mut checkout = available_checkout(&fx.store).await;
    if let Some(rev) = checkout.data.kernel_revision.as_mut() {
        rev.tree = "android".to_string();
    }
    let checkout = fx.store.update(&checkout, None).await.unwrap();

    let created = fx.scheduler.handle_event(&NodeEvent::of(&checkout)).await.unwrap();
    // kbuild-gcc-12-arm64 denies android; kbuild-clang-weekly has no
    // registered runtime here
    assert!(created.is_empty());
}

#[tokio::test]
async fn kbuild_pass_fans_out_over_matching_platforms() {
    let fx = fixture();
    let checkout = available_checkout(&fx.store).await;
    let kbuilds = fx.scheduler.handle_event(&NodeEvent::of(&checkout)).await.unwrap();

    // the runtime reports back: kbuild available/pass
    let mut kbuild = fx.store.node(kbuilds[0].id).unwrap();
    kbuild.result = Some(NodeResult::Pass);
    kbuild.advance(NodeState::Available).unwrap();
    let kbuild = fx.store.update(&kbuild, None).await.unwrap();

    let created = fx.scheduler.handle_event(&NodeEvent::of(&kbuild)).await.unwrap();
    // qemu-x86 is filtered out by the arm64 build arch
    assert_eq!(created.len(), 1);
    let baseline = &created[0];
    assert_eq!(baseline.name, "baseline-arm64");
    assert_eq!(baseline.data.platform.as_deref(), Some("bcm2711-rpi-4-b"));
    assert_eq!(baseline.data.arch.as_deref(), Some("arm64"));
    assert_eq!(baseline.data.runtime.as_deref(), Some("lava-collabora"));
    assert_eq!(fx.lava.submissions().len(), 1);
}

#[tokio::test]
async fn closing_parent_rejects_new_children() {
    let fx = fixture();
    let checkout = available_checkout(&fx.store).await;
    let event = NodeEvent::of(&checkout);

    let mut closing = fx.store.node(checkout.id).unwrap();
    closing.advance(NodeState::Closing).unwrap();
    fx.store.update(&closing, None).await.unwrap();

    // the stale availability event arrives after the transition
    let created = fx.scheduler.handle_event(&event).await.unwrap();
    assert!(created.is_empty());
    assert!(fx.store.children_of(checkout.id).is_empty());
}

#[tokio::test]
async fn submission_failure_closes_child_and_spawns_retry_sibling() {
    let fx = fixture();
    fx.k8s.fail_submissions(true);
    let checkout = available_checkout(&fx.store).await;

    fx.scheduler.handle_event(&NodeEvent::of(&checkout)).await.unwrap();

    let children = fx.store.children_of(checkout.id);
    assert_eq!(children.len(), 2);

    let failed = children.iter().find(|c| c.data.retry_counter == 0).unwrap();
    assert_eq!(failed.state, NodeState::Done);
    assert_eq!(failed.result, Some(NodeResult::Incomplete));
    assert_eq!(failed.data.error_code.as_deref(), Some("submit_failure"));

    let sibling = children.iter().find(|c| c.data.retry_counter == 1).unwrap();
    assert_eq!(sibling.state, NodeState::Running);
    assert_eq!(sibling.name, failed.name);
    assert_eq!(sibling.data.runtime_job_id, None);
}

#[tokio::test]
async fn retry_chain_is_bounded_by_max_retries() {
    let fx = fixture();
    fx.k8s.fail_submissions(true);
    let checkout = available_checkout(&fx.store).await;

    fx.scheduler.handle_event(&NodeEvent::of(&checkout)).await.unwrap();

    // drive each retry sibling's creation event by hand, as the run loop
    // would
    loop {
        let pending: Vec<_> = fx
            .store
            .children_of(checkout.id)
            .into_iter()
            .filter(|n| n.state == NodeState::Running)
            .collect();
        if pending.is_empty() {
            break;
        }
        for node in pending {
            fx.scheduler.handle_event(&NodeEvent::of(&node)).await.unwrap();
        }
    }

    let children = fx.store.children_of(checkout.id);
    // attempts 0..=3, every one closed incomplete, no fifth attempt
    assert_eq!(children.len(), 4);
    let mut counters: Vec<u32> = children.iter().map(|c| c.data.retry_counter).collect();
    counters.sort_unstable();
    assert_eq!(counters, vec![0, 1, 2, 3]);
    assert!(children
        .iter()
        .all(|c| c.state == NodeState::Done && c.result == Some(NodeResult::Incomplete)));
}

#[tokio::test]
async fn terminal_failure_spawns_retry_sibling_once() {
    let fx = fixture();
    let checkout = available_checkout(&fx.store).await;
    let kbuilds = fx.scheduler.handle_event(&NodeEvent::of(&checkout)).await.unwrap();

    let mut failed = fx.store.node(kbuilds[0].id).unwrap();
    failed.finish(NodeResult::Fail).unwrap();
    let failed = fx.store.update(&failed, None).await.unwrap();

    let event = NodeEvent::of(&failed);
    let sibling = fx.scheduler.handle_terminal(&event).await.unwrap().unwrap();
    assert_eq!(sibling.data.retry_counter, 1);
    assert_eq!(sibling.name, failed.name);

    // re-delivered terminal event does not spawn a second sibling
    let again = fx.scheduler.handle_terminal(&event).await.unwrap();
    assert!(again.is_none());
}

#[tokio::test]
async fn retry_sibling_creation_event_triggers_submission() {
    let fx = fixture();
    let checkout = available_checkout(&fx.store).await;
    let kbuilds = fx.scheduler.handle_event(&NodeEvent::of(&checkout)).await.unwrap();
    assert_eq!(fx.k8s.submissions().len(), 1);

    let mut failed = fx.store.node(kbuilds[0].id).unwrap();
    failed.finish(NodeResult::Fail).unwrap();
    let failed = fx.store.update(&failed, None).await.unwrap();
    let sibling = fx.scheduler.handle_terminal(&NodeEvent::of(&failed)).await.unwrap().unwrap();

    fx.scheduler.handle_event(&NodeEvent::of(&sibling)).await.unwrap();

    assert_eq!(fx.k8s.submissions().len(), 2);
    let resubmitted = fx.store.node(sibling.id).unwrap();
    assert!(resubmitted.data.runtime_job_id.is_some());
}

#[tokio::test]
async fn frequency_rule_holds_repeat_scheduling_within_window() {
    let store = fresh_store();
    let renderer = Arc::new(FakeRenderer::default());
    let mut scheduler =
        Scheduler::new(settings(), store.clone(), renderer, store.clock().clone());
    let shell = Arc::new(FakeRuntime::new("shell-local"));
    scheduler.register_runtime("shell-local", shell.clone());

    let first = available_checkout(&store).await;
    let created = scheduler.handle_event(&NodeEvent::of(&first)).await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name, "kbuild-clang-weekly");

    // a second checkout of the same branch within the window
    let mut seed = cv_core::NodeSeed::root(NodeKind::Checkout, "checkout");
    seed.data.kernel_revision = Some(crate::test_support::revision("cafef00d"));
    let second = store.create(seed).await.unwrap();
    let mut available = second.clone();
    available.advance(NodeState::Available).unwrap();
    let second = store.update(&available, None).await.unwrap();

    let created = scheduler.handle_event(&NodeEvent::of(&second)).await.unwrap();
    assert!(created.is_empty());
}
