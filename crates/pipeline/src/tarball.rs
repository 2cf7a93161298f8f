// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tarball service: turn fresh checkouts into uploaded source tarballs.

use crate::error::PipelineError;
use crate::{Blobs, Store};
use async_trait::async_trait;
use cv_catalog::Settings;
use cv_client::ClientError;
use cv_core::{Clock, KernelRevision, NodeId, NodeKind, NodeResult, NodeState, SystemClock};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Local source mirror operations.
///
/// Mirror updates are serialized per tree by the service; implementations
/// only need to be correct for one caller at a time per tree.
#[async_trait]
pub trait SourceMirror: Send + Sync {
    /// Bring the mirror of `tree` up to date and verify `commit` is present.
    /// Returns the resolved describe string.
    async fn update(&self, tree: &str, url: &str, commit: &str) -> Result<String, PipelineError>;

    /// Produce a tarball of the working tree at `commit`; returns its local
    /// path.
    async fn archive(&self, tree: &str, commit: &str, name: &str)
        -> Result<PathBuf, PipelineError>;
}

/// `git`-backed mirror under a configured root directory.
pub struct GitMirror {
    root: PathBuf,
}

impl GitMirror {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn git_dir(&self, tree: &str) -> PathBuf {
        self.root.join(format!("{tree}.git"))
    }

    async fn git(args: &[&str]) -> Result<String, PipelineError> {
        let output = tokio::process::Command::new("git").args(args).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Git(format!("git {}: {}", args.join(" "), stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl SourceMirror for GitMirror {
    async fn update(&self, tree: &str, url: &str, commit: &str) -> Result<String, PipelineError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let git_dir = self.git_dir(tree);
        let git_dir_arg = git_dir.to_string_lossy().to_string();
        if !git_dir.exists() {
            Self::git(&["clone", "--mirror", url, &git_dir_arg]).await?;
        } else {
            Self::git(&["--git-dir", &git_dir_arg, "fetch", "--force", url,
                "+refs/heads/*:refs/heads/*"]).await?;
        }
        // verify the commit actually arrived
        Self::git(&["--git-dir", &git_dir_arg, "cat-file", "-e", &format!("{commit}^{{commit}}")])
            .await?;
        match Self::git(&["--git-dir", &git_dir_arg, "describe", "--match", "v*", commit]).await {
            Ok(describe) => Ok(describe),
            // untagged history: fall back to the abbreviated commit
            Err(_) => Ok(commit.chars().take(12).collect()),
        }
    }

    async fn archive(
        &self,
        tree: &str,
        commit: &str,
        name: &str,
    ) -> Result<PathBuf, PipelineError> {
        let git_dir = self.git_dir(tree);
        let out = std::env::temp_dir().join("cv-tarball");
        tokio::fs::create_dir_all(&out).await?;
        let tarball = out.join(name);
        let command = format!(
            "git --git-dir {} archive --format=tar --prefix=linux/ {} | gzip > {}",
            shell_quote(&git_dir.to_string_lossy()),
            commit,
            shell_quote(&tarball.to_string_lossy()),
        );
        let output =
            tokio::process::Command::new("sh").args(["-c", &command]).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Git(format!("archive {commit}: {}", stderr.trim())));
        }
        Ok(tarball)
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Tarball name for a revision.
pub fn tarball_name(revision: &KernelRevision, describe: &str) -> String {
    let sanitize = |s: &str| s.replace('/', "-");
    format!("linux-{}-{}-{}.tar.gz", sanitize(&revision.tree), sanitize(&revision.branch), sanitize(describe))
}

pub struct Tarball<C: Clock = SystemClock> {
    settings: Arc<Settings>,
    store: Store,
    blobs: Blobs,
    mirror: Arc<dyn SourceMirror>,
    clock: C,
    tree_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<C: Clock> Tarball<C> {
    pub fn new(
        settings: Arc<Settings>,
        store: Store,
        blobs: Blobs,
        mirror: Arc<dyn SourceMirror>,
        clock: C,
    ) -> Self {
        Self { settings, store, blobs, mirror, clock, tree_locks: Mutex::new(HashMap::new()) }
    }

    fn tree_lock(&self, tree: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.tree_locks
                .lock()
                .entry(tree.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Consume checkout events until shutdown.
    pub async fn run(&self, bus: &dyn cv_client::EventBus, shutdown: CancellationToken) {
        let mut rx = match bus.subscribe(cv_core::NODE_CHANNEL).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "tarball could not subscribe, exiting");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                event = rx.recv() => {
                    let Some(event) = event else { return };
                    if event.kind != NodeKind::Checkout || event.state != NodeState::Running {
                        continue;
                    }
                    if let Err(e) = self.process(event.id).await {
                        warn!(node_id = %event.id, error = %e, "tarball processing failed, will retry");
                    }
                }
            }
        }
    }

    /// Mirror, archive, upload, and advance one checkout.
    ///
    /// A git failure is the sole path by which a checkout becomes
    /// `done`/`fail`; an upload failure leaves it `running` so the operation
    /// is retried.
    pub async fn process(&self, id: NodeId) -> Result<(), PipelineError> {
        let node = self.store.get(id).await?;
        if node.kind != NodeKind::Checkout
            || node.state != NodeState::Running
            || node.artifacts.contains_key("tarball")
        {
            return Ok(());
        }
        let Some(revision) = node.revision().cloned() else {
            debug!(node_id = %id, "checkout without revision, skipping");
            return Ok(());
        };
        let Some(url) = revision.url.clone() else {
            debug!(node_id = %id, "checkout without tree url, skipping");
            return Ok(());
        };

        // one mirror worker per tree
        let lock = self.tree_lock(&revision.tree);
        let _serialized = lock.lock().await;

        let describe = match self.mirror.update(&revision.tree, &url, &revision.commit).await {
            Ok(describe) => describe,
            Err(e) => {
                warn!(node_id = %id, error = %e, "git update failed, failing checkout");
                let mut failed = node.clone();
                failed.data.error_code = Some("git_checkout_failure".to_string());
                failed.data.error_msg = Some(e.to_string());
                if failed.finish(NodeResult::Fail).is_ok() {
                    match self.store.update(&failed, Some(NodeState::Running)).await {
                        Ok(_) | Err(ClientError::Conflict(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                return Ok(());
            }
        };

        let name = tarball_name(&revision, &describe);
        let tarball = self.mirror.archive(&revision.tree, &revision.commit, &name).await?;
        // an upload error propagates: the node stays running and is retried
        let public_url = self.blobs.upload(&name, &tarball).await?;

        let mut updated = node.clone();
        if let Some(rev) = updated.data.kernel_revision.as_mut() {
            rev.describe = Some(describe.clone());
        }
        updated.artifacts.insert("tarball".to_string(), public_url);
        updated.advance(NodeState::Available).map_err(ClientError::Invariant)?;
        updated.holdoff = Some(self.clock.now() + self.settings.holdoff());
        match self.store.update(&updated, Some(NodeState::Running)).await {
            Ok(_) => {
                info!(node_id = %id, describe = %describe, "checkout available");
                Ok(())
            }
            // another writer advanced the node first; nothing left to do
            Err(ClientError::Conflict(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl<C: Clock> crate::service::Service for Tarball<C> {
    fn name(&self) -> &'static str {
        "tarball"
    }

    /// Sweep for checkouts the event path missed (or that failed an upload).
    async fn tick(&self) -> Result<(), PipelineError> {
        let pending = self
            .store
            .find(
                &cv_client::NodeQuery::new()
                    .kind(NodeKind::Checkout)
                    .state(NodeState::Running),
            )
            .await?;
        for node in pending {
            let id = node.id;
            if let Err(e) = self.process(id).await {
                warn!(node_id = %id, error = %e, "tarball processing failed, will retry");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tarball_tests.rs"]
mod tests;
