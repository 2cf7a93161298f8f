// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{fresh_store, revision, settings};
use async_trait::async_trait;
use cv_client::{BlobStore, NodeStore};
use cv_core::{NodeKind, NodeSeed as Seed};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct FakeMirror {
    fail_update: AtomicBool,
    dir: tempfile::TempDir,
}

impl FakeMirror {
    fn new() -> Self {
        Self { fail_update: AtomicBool::new(false), dir: tempfile::tempdir().unwrap() }
    }
}

#[async_trait]
impl SourceMirror for FakeMirror {
    async fn update(&self, _tree: &str, _url: &str, _commit: &str) -> Result<String, PipelineError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(PipelineError::Git("fatal: bad object deadbeef".to_string()));
        }
        Ok("v6.6-rc1".to_string())
    }

    async fn archive(
        &self,
        _tree: &str,
        _commit: &str,
        name: &str,
    ) -> Result<std::path::PathBuf, PipelineError> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"tar bytes")?;
        Ok(path)
    }
}

struct FailingBlobs;

#[async_trait]
impl BlobStore for FailingBlobs {
    async fn upload(&self, _name: &str, _path: &Path) -> Result<String, cv_client::ClientError> {
        Err(cv_client::ClientError::Status { status: 503, body: "unavailable".to_string() })
    }

    async fn upload_bytes(
        &self,
        _name: &str,
        _bytes: Vec<u8>,
    ) -> Result<String, cv_client::ClientError> {
        Err(cv_client::ClientError::Status { status: 503, body: "unavailable".to_string() })
    }
}

async fn seed_running_checkout(store: &cv_client::FakeStore) -> cv_core::Node {
    let mut seed = Seed::root(NodeKind::Checkout, "checkout");
    seed.data.kernel_revision = Some(revision("deadbeef"));
    seed.timeout = Some(store.clock().now() + chrono::Duration::hours(12));
    store.create(seed).await.unwrap()
}

#[tokio::test]
async fn success_path_advances_checkout_to_available() {
    let store = fresh_store();
    let mirror = Arc::new(FakeMirror::new());
    let tarball = Tarball::new(
        settings(),
        store.clone(),
        store.clone(),
        mirror,
        store.clock().clone(),
    );

    let checkout = seed_running_checkout(&store).await;
    tarball.process(checkout.id).await.unwrap();

    let updated = store.node(checkout.id).unwrap();
    assert_eq!(updated.state, NodeState::Available);
    assert_eq!(
        updated.revision().unwrap().describe.as_deref(),
        Some("v6.6-rc1")
    );
    let tarball_url = updated.artifacts.get("tarball").unwrap();
    assert!(tarball_url.starts_with("https://blobs.test/linux-mainline-master-v6.6-rc1"));
    // holdoff opens when the node first becomes available
    let expected_holdoff = store.clock().now() + chrono::Duration::minutes(10);
    assert_eq!(updated.holdoff, Some(expected_holdoff));
}

#[tokio::test]
async fn git_failure_is_the_sole_checkout_fail_path() {
    let store = fresh_store();
    let mirror = Arc::new(FakeMirror::new());
    mirror.fail_update.store(true, Ordering::SeqCst);
    let tarball = Tarball::new(
        settings(),
        store.clone(),
        store.clone(),
        mirror,
        store.clock().clone(),
    );

    let checkout = seed_running_checkout(&store).await;
    tarball.process(checkout.id).await.unwrap();

    let failed = store.node(checkout.id).unwrap();
    assert_eq!(failed.state, NodeState::Done);
    assert_eq!(failed.result, Some(NodeResult::Fail));
    assert_eq!(failed.data.error_code.as_deref(), Some("git_checkout_failure"));
    assert!(failed.artifacts.is_empty());
}

#[tokio::test]
async fn upload_failure_leaves_checkout_running_for_retry() {
    let store = fresh_store();
    let tarball = Tarball::new(
        settings(),
        store.clone(),
        Arc::new(FailingBlobs),
        Arc::new(FakeMirror::new()),
        store.clock().clone(),
    );

    let checkout = seed_running_checkout(&store).await;
    let err = tarball.process(checkout.id).await.unwrap_err();
    assert!(err.is_transient());

    let unchanged = store.node(checkout.id).unwrap();
    assert_eq!(unchanged.state, NodeState::Running);
    assert!(unchanged.artifacts.is_empty());
}

#[tokio::test]
async fn non_checkout_and_finished_nodes_are_skipped() {
    let store = fresh_store();
    let tarball = Tarball::new(
        settings(),
        store.clone(),
        store.clone(),
        Arc::new(FakeMirror::new()),
        store.clock().clone(),
    );

    let checkout = seed_running_checkout(&store).await;
    tarball.process(checkout.id).await.unwrap();
    let available = store.node(checkout.id).unwrap();
    let uploads_after_first = store.uploads().len();

    // second delivery of the same event is a no-op
    tarball.process(checkout.id).await.unwrap();
    assert_eq!(store.uploads().len(), uploads_after_first);
    assert_eq!(store.node(checkout.id).unwrap(), available);
}

#[test]
fn tarball_names_are_filesystem_safe() {
    let mut rev = revision("deadbeef");
    rev.branch = "linux-6.1.y/fixes".to_string();
    assert_eq!(
        tarball_name(&rev, "v6.1.52"),
        "linux-mainline-linux-6.1.y-fixes-v6.1.52.tar.gz"
    );
}
