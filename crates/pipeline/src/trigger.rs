// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger service: watch upstream trees, create checkout nodes.

use crate::error::PipelineError;
use crate::service::Service;
use crate::Store;
use async_trait::async_trait;
use cv_catalog::Settings;
use cv_client::NodeQuery;
use cv_core::{Clock, KernelRevision, Node, NodeData, NodeId, NodeKind, NodeSeed, SystemClock};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Options for one checkout creation, beyond the watched defaults.
#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    /// Skip the frequency gate (user-initiated or `--force`)
    pub force: bool,
    pub jobfilter: Option<Vec<String>>,
    /// Re-target: attach the new checkout under an existing node
    pub parent: Option<NodeId>,
    pub submitter: Option<String>,
}

/// Fingerprint of a (tree, branch, commit) triple.
pub fn treeid(tree: &str, branch: &str, commit: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tree.as_bytes());
    hasher.update(b"\0");
    hasher.update(branch.as_bytes());
    hasher.update(b"\0");
    hasher.update(commit.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(16).map(|b| format!("{b:02x}")).collect()
}

pub struct Trigger<C: Clock = SystemClock> {
    settings: Arc<Settings>,
    store: Store,
    clock: C,
    force: bool,
}

impl<C: Clock> Trigger<C> {
    pub fn new(settings: Arc<Settings>, store: Store, clock: C) -> Self {
        Self { settings, store, clock, force: false }
    }

    /// Bypass frequency gates for every poll (`--force`).
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Walk all build configs once. A failing remote is logged and retried
    /// next tick; a store failure abandons the tick.
    pub async fn poll(&self) -> Result<(), PipelineError> {
        for (name, config) in &self.settings.build_configs {
            let Some(tree) = self.settings.trees.get(&config.tree) else {
                // validation makes this unreachable; stay safe anyway
                continue;
            };
            let commit = match resolve_tip(&tree.url, &config.branch).await {
                Ok(Some(commit)) => commit,
                Ok(None) => {
                    warn!(config = %name, branch = %config.branch, "branch not found upstream");
                    continue;
                }
                Err(e) => {
                    warn!(config = %name, error = %e, "tip resolution failed, will retry");
                    continue;
                }
            };
            let options = CheckoutOptions { force: self.force, ..Default::default() };
            // store failures abandon the whole tick
            self.create_checkout(&config.tree, &config.branch, &commit, options).await?;
        }
        Ok(())
    }

    /// Create a checkout for the revision unless the frequency gate holds it
    /// back. Returns the node when one was created.
    pub async fn create_checkout(
        &self,
        tree: &str,
        branch: &str,
        commit: &str,
        options: CheckoutOptions,
    ) -> Result<Option<Node>, PipelineError> {
        let fingerprint = treeid(tree, branch, commit);

        // duplicate detection is authoritative against the store
        let existing = self
            .store
            .find(&NodeQuery::new().kind(NodeKind::Checkout).field("treeid", &fingerprint))
            .await?;
        if !existing.is_empty() {
            debug!(tree, branch, commit, "revision already has a checkout");
            return Ok(None);
        }

        if !options.force {
            let window = self.settings.frequency();
            let since = self.clock.now() - window;
            let recent = self
                .store
                .find(
                    &NodeQuery::new()
                        .kind(NodeKind::Checkout)
                        .field("data.kernel_revision.tree", tree)
                        .field("data.kernel_revision.branch", branch)
                        .gt("created", since.to_rfc3339()),
                )
                .await?;
            if !recent.is_empty() {
                debug!(tree, branch, "checkout held back by frequency gate");
                return Ok(None);
            }
        }

        let url = self.settings.trees.get(tree).map(|t| t.url.clone());
        let mut seed = NodeSeed::root(NodeKind::Checkout, "checkout");
        seed.parent = options.parent;
        seed.data = NodeData {
            kernel_revision: Some(KernelRevision {
                tree: tree.to_string(),
                branch: branch.to_string(),
                commit: commit.to_string(),
                url,
                describe: None,
            }),
            ..Default::default()
        };
        seed.timeout = Some(self.clock.now() + self.settings.checkout_timeout());
        seed.jobfilter = options.jobfilter;
        seed.submitter = options.submitter;
        seed.treeid = Some(fingerprint);

        let node = self.store.create(seed).await?;
        info!(node_id = %node.id, tree, branch, commit, "created checkout");
        Ok(Some(node))
    }
}

#[async_trait]
impl<C: Clock> Service for Trigger<C> {
    fn name(&self) -> &'static str {
        "trigger"
    }

    async fn tick(&self) -> Result<(), PipelineError> {
        self.poll().await
    }
}

/// Resolve the tip commit of a remote branch with `git ls-remote`.
async fn resolve_tip(url: &str, branch: &str) -> Result<Option<String>, PipelineError> {
    let output = tokio::process::Command::new("git")
        .args(["ls-remote", url, &format!("refs/heads/{branch}")])
        .output()
        .await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::Git(format!("ls-remote {url}: {}", stderr.trim())));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .map(str::to_string))
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
