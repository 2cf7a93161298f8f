// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler service: match node events against the catalog, instantiate
//! child nodes, and dispatch them into runtimes.

use crate::error::PipelineError;
use crate::retry;
use crate::Store;
use cv_catalog::{JobDef, Platform, SchedulerEntry, Settings};
use cv_client::{ClientError, NodeQuery};
use cv_core::{Clock, Node, NodeEvent, NodeResult, NodeSeed, NodeState, SystemClock};
use cv_runtimes::{RenderedJob, RuntimeAdapter, TemplateRenderer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One registered runtime with its submission fan-out bound.
struct RuntimePool {
    adapter: Arc<dyn RuntimeAdapter>,
    permits: Arc<tokio::sync::Semaphore>,
}

pub struct Scheduler<C: Clock = SystemClock> {
    settings: Arc<Settings>,
    store: Store,
    renderer: Arc<dyn TemplateRenderer>,
    pools: HashMap<String, RuntimePool>,
    clock: C,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(
        settings: Arc<Settings>,
        store: Store,
        renderer: Arc<dyn TemplateRenderer>,
        clock: C,
    ) -> Self {
        Self { settings, store, renderer, pools: HashMap::new(), clock }
    }

    /// Register a runtime adapter. Scheduler entries whose runtime is not
    /// registered are ignored, which is how `--runtimes` selection works.
    pub fn register_runtime(&mut self, name: &str, adapter: Arc<dyn RuntimeAdapter>) {
        let concurrency = self.settings.runtime(name).map(|r| r.concurrency).unwrap_or(1);
        self.pools.insert(
            name.to_string(),
            RuntimePool { adapter, permits: Arc::new(tokio::sync::Semaphore::new(concurrency)) },
        );
    }

    /// Consume node events until shutdown.
    pub async fn run(&self, bus: &dyn cv_client::EventBus, shutdown: CancellationToken) {
        let mut rx = match bus.subscribe(cv_core::NODE_CHANNEL).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "scheduler could not subscribe, exiting");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                event = rx.recv() => {
                    let Some(event) = event else { return };
                    if event.state == NodeState::Done {
                        if let Err(e) = self.handle_terminal(&event).await {
                            warn!(node_id = %event.id, error = %e, "retry handling failed");
                        }
                    }
                    if let Err(e) = self.handle_event(&event).await {
                        warn!(node_id = %event.id, error = %e, "event handling failed");
                    }
                }
            }
        }
    }

    /// Evaluate one event against every scheduler entry.
    ///
    /// Delivering the same event twice yields exactly one child per matching
    /// entry: the single-writer guard queries for an existing child before
    /// creating one.
    pub async fn handle_event(&self, event: &NodeEvent) -> Result<Vec<Node>, PipelineError> {
        let mut created = Vec::new();

        // retry siblings carry no external job id yet; their creation event
        // is what triggers (re)submission
        if event.state == NodeState::Running {
            if let Some(node) = self.pending_retry(event).await? {
                self.submit_job(&node).await?;
                return Ok(created);
            }
        }

        let entries: Vec<&SchedulerEntry> =
            self.settings.scheduler.iter().filter(|e| e.event.matches(event)).collect();
        if entries.is_empty() {
            return Ok(created);
        }

        let origin = self.store.get(event.id).await?;
        for entry in entries {
            if !self.pools.contains_key(&entry.runtime) {
                continue;
            }
            match self.dispatch_entry(&origin, entry).await {
                Ok(mut nodes) => created.append(&mut nodes),
                Err(e) => warn!(job = %entry.job, error = %e, "dispatch failed"),
            }
        }
        Ok(created)
    }

    /// Spawn a retry sibling for an eligible terminal node.
    pub async fn handle_terminal(&self, event: &NodeEvent) -> Result<Option<Node>, PipelineError> {
        if event.state != NodeState::Done || !self.settings.jobs.contains_key(&event.name) {
            return Ok(None);
        }
        let node = self.store.get(event.id).await?;
        if !retry::eligible_for_retry(&node) {
            return Ok(None);
        }
        let Some(parent) = node.parent else {
            return Ok(None);
        };

        // single-writer guard against re-delivered terminal events
        let next = node.data.retry_counter + 1;
        let existing = self
            .store
            .find(
                &NodeQuery::new()
                    .parent(parent)
                    .name(&node.name)
                    .field("data.retry_counter", next),
            )
            .await?;
        if !existing.is_empty() {
            return Ok(None);
        }

        let mut seed = retry::retry_seed(&node);
        seed.timeout = self.node_timeout(&node);
        match self.store.create(seed).await {
            Ok(sibling) => {
                info!(node_id = %node.id, sibling = %sibling.id, attempt = next, "spawned retry sibling");
                Ok(Some(sibling))
            }
            Err(ClientError::Invariant(_)) => {
                debug!(node_id = %node.id, "parent closed, no retry");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn pending_retry(&self, event: &NodeEvent) -> Result<Option<Node>, PipelineError> {
        if !self.settings.jobs.contains_key(&event.name) {
            return Ok(None);
        }
        let node = self.store.get(event.id).await?;
        let pending = node.state == NodeState::Running
            && node.data.retry_counter > 0
            && node.data.runtime_job_id.is_none()
            && node.data.runtime.as_deref().is_some_and(|r| self.pools.contains_key(r));
        Ok(pending.then_some(node))
    }

    async fn dispatch_entry(
        &self,
        origin: &Node,
        entry: &SchedulerEntry,
    ) -> Result<Vec<Node>, PipelineError> {
        let Some(job) = self.settings.job(&entry.job) else {
            return Ok(Vec::new());
        };
        if !origin.matches_jobfilter(&entry.job) {
            debug!(job = %entry.job, origin = %origin.id, "held back by jobfilter");
            return Ok(Vec::new());
        }
        if !job.rules.eligible(origin) {
            return Ok(Vec::new());
        }
        if let Some(window) = job.rules.frequency_window()? {
            if self.recently_scheduled(origin, &entry.job, window).await? {
                debug!(job = %entry.job, "held back by frequency rule");
                return Ok(Vec::new());
            }
        }

        let mut created = Vec::new();
        if entry.platforms.is_empty() {
            if let Some(node) = self.dispatch_one(origin, entry, job, None).await? {
                created.push(node);
            }
        } else {
            for name in &entry.platforms {
                let Some(platform) = self.settings.platform(name) else {
                    continue;
                };
                // test jobs only land on platforms matching the build arch
                if origin.data.arch.as_deref().is_some_and(|a| a != platform.arch) {
                    continue;
                }
                if let Some(node) =
                    self.dispatch_one(origin, entry, job, Some((name, platform))).await?
                {
                    created.push(node);
                }
            }
        }
        Ok(created)
    }

    async fn dispatch_one(
        &self,
        origin: &Node,
        entry: &SchedulerEntry,
        job: &JobDef,
        platform: Option<(&str, &Platform)>,
    ) -> Result<Option<Node>, PipelineError> {
        let mut dedup = NodeQuery::new().parent(origin.id).name(&entry.job);
        if let Some((platform_name, _)) = platform {
            dedup = dedup.field("data.platform", platform_name);
        }
        if !self.store.find(&dedup).await?.is_empty() {
            debug!(job = %entry.job, origin = %origin.id, "child exists, skipping");
            return Ok(None);
        }

        let Some(runtime_def) = self.settings.runtime(&entry.runtime) else {
            return Ok(None);
        };

        let mut seed = NodeSeed::child_of(origin, job.kind, &entry.job);
        seed.group = Some(entry.job.clone());
        if let Some(arch) = job.params.get("arch") {
            seed.data.arch = Some(arch.clone());
        }
        if let Some(compiler) = job.params.get("compiler") {
            seed.data.compiler = Some(compiler.clone());
        }
        if let Some(defconfig) = job.params.get("defconfig") {
            seed.data.defconfig = Some(defconfig.clone());
        }
        if let Some((platform_name, platform)) = platform {
            seed.data.platform = Some(platform_name.to_string());
            seed.data.arch = Some(platform.arch.clone());
        }
        seed.data.runtime = Some(entry.runtime.clone());
        seed.timeout = Some(self.clock.now() + self.settings.node_timeout(job, runtime_def));

        let node = match self.store.create(seed).await {
            Ok(node) => node,
            Err(ClientError::Invariant(_)) => {
                // the parent moved to closing/done since the event fired
                debug!(job = %entry.job, origin = %origin.id, "parent no longer accepts children");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        info!(node_id = %node.id, job = %entry.job, runtime = %entry.runtime, "created child node");

        self.submit_job(&node).await?;
        Ok(Some(node))
    }

    /// Render and submit a runnable node into its runtime. A submission
    /// failure closes the node as incomplete and spawns a retry sibling.
    pub async fn submit_job(&self, node: &Node) -> Result<(), PipelineError> {
        let Some(runtime_name) = node.data.runtime.clone() else {
            return Ok(());
        };
        let Some(pool) = self.pools.get(&runtime_name) else {
            return Ok(());
        };
        let Some(job) = self.settings.job(&node.name) else {
            return Ok(());
        };

        let params = self.template_params(node, job).await;
        let rendered = match self.renderer.render(&job.template, &params).await {
            Ok(content) => {
                RenderedJob { name: node.name.clone(), content, image: job.image.clone() }
            }
            Err(e) => return self.submission_failed(node, &e.to_string()).await,
        };

        // bounded fan-out per runtime
        let _permit = pool.permits.clone().acquire_owned().await.ok();
        let submitted = pool.adapter.submit(&rendered, node).await;

        match submitted {
            Ok(handle) => {
                let mut updated = self.store.get(node.id).await?;
                updated.data.runtime_job_id = Some(handle.external_id);
                match self.store.update(&updated, Some(NodeState::Running)).await {
                    Ok(_) | Err(ClientError::Conflict(_)) => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => self.submission_failed(node, &e.to_string()).await,
        }
    }

    async fn submission_failed(&self, node: &Node, reason: &str) -> Result<(), PipelineError> {
        warn!(node_id = %node.id, reason, "submission failed, closing as incomplete");
        let mut failed = node.clone();
        failed.data.error_code = Some("submit_failure".to_string());
        failed.data.error_msg = Some(reason.to_string());
        if failed.finish(NodeResult::Incomplete).is_err() {
            return Ok(());
        }
        let stored = match self.store.update(&failed, Some(node.state)).await {
            Ok(stored) => stored,
            Err(ClientError::Conflict(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if !retry::eligible_for_retry(&stored) {
            return Ok(());
        }
        let mut seed = retry::retry_seed(&stored);
        seed.timeout = self.node_timeout(&stored);
        match self.store.create(seed).await {
            Ok(sibling) => {
                info!(node_id = %stored.id, sibling = %sibling.id,
                    attempt = sibling.data.retry_counter, "spawned retry sibling");
                // the sibling's creation event triggers its submission
                Ok(())
            }
            Err(ClientError::Invariant(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn node_timeout(&self, node: &Node) -> Option<chrono::DateTime<chrono::Utc>> {
        let job = self.settings.job(&node.name)?;
        let runtime = node.data.runtime.as_deref().and_then(|r| self.settings.runtime(r))?;
        Some(self.clock.now() + self.settings.node_timeout(job, runtime))
    }

    async fn recently_scheduled(
        &self,
        origin: &Node,
        job: &str,
        window: chrono::Duration,
    ) -> Result<bool, PipelineError> {
        let Some(rev) = origin.revision() else {
            return Ok(false);
        };
        let since = self.clock.now() - window;
        let recent = self
            .store
            .find(
                &NodeQuery::new()
                    .name(job)
                    .field("data.kernel_revision.tree", &rev.tree)
                    .field("data.kernel_revision.branch", &rev.branch)
                    .gt("created", since.to_rfc3339()),
            )
            .await?;
        Ok(!recent.is_empty())
    }

    /// Parameter dictionary handed to the template renderer, drawn from the
    /// node tree: the node itself, its revision, and the parent's artifacts
    /// (the tarball, mainly).
    async fn template_params(&self, node: &Node, job: &JobDef) -> serde_json::Value {
        let parent_artifacts = match node.parent {
            Some(parent) => {
                self.store.get(parent).await.map(|p| p.artifacts).unwrap_or_default()
            }
            None => Default::default(),
        };
        let mut params = job.params.clone();
        if let Some(platform) =
            node.data.platform.as_deref().and_then(|p| self.settings.platform(p))
        {
            for (key, value) in &platform.params {
                params.insert(key.clone(), value.clone());
            }
        }
        serde_json::json!({
            "node": {
                "id": node.id,
                "name": node.name,
                "path": node.path,
                "group": node.group,
            },
            "revision": node.data.kernel_revision,
            "arch": node.data.arch,
            "compiler": node.data.compiler,
            "defconfig": node.data.defconfig,
            "platform": node.data.platform,
            "runtime": node.data.runtime,
            "params": params,
            "artifacts": parent_artifacts,
        })
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
