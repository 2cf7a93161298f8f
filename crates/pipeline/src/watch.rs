// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime watcher: poll submitted jobs on poll-driven backends and turn
//! their outcomes into node transitions.
//!
//! Callback-driven backends (LAVA, pull labs) report `Running` forever here;
//! their completion arrives through the callback ingestor instead.

use crate::error::PipelineError;
use crate::service::Service;
use crate::{Blobs, Store};
use async_trait::async_trait;
use cv_catalog::Settings;
use cv_client::{ClientError, NodeQuery};
use cv_core::{Clock, Node, NodeKind, NodeResult, NodeState, SystemClock};
use cv_runtimes::{JobOutcome, JobStatus, RuntimeAdapter, RuntimeError, SubmitHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Watcher<C: Clock = SystemClock> {
    settings: Arc<Settings>,
    store: Store,
    blobs: Blobs,
    adapters: HashMap<String, Arc<dyn RuntimeAdapter>>,
    clock: C,
}

impl<C: Clock> Watcher<C> {
    pub fn new(settings: Arc<Settings>, store: Store, blobs: Blobs, clock: C) -> Self {
        Self { settings, store, blobs, adapters: HashMap::new(), clock }
    }

    pub fn register_adapter(&mut self, name: &str, adapter: Arc<dyn RuntimeAdapter>) {
        self.adapters.insert(name.to_string(), adapter);
    }

    /// Poll every in-flight submission once.
    pub async fn poll_all(&self) -> Result<(), PipelineError> {
        for (name, adapter) in &self.adapters {
            let running = self
                .store
                .find(&NodeQuery::new().state(NodeState::Running).field("data.runtime", name))
                .await?;
            for node in running {
                let Some(external_id) = node.data.runtime_job_id.clone() else {
                    continue;
                };
                let handle = SubmitHandle { runtime: name.clone(), external_id };
                match adapter.poll(&handle).await {
                    Ok(JobStatus::Queued | JobStatus::Running) => {}
                    Ok(JobStatus::Done(outcome)) => {
                        let id = node.id;
                        if let Err(e) = self.complete(node, outcome).await {
                            warn!(node_id = %id, error = %e, "completion failed, will re-poll");
                        }
                    }
                    // the backend no longer knows the job (process restart,
                    // reaped pod): it will never produce a verdict
                    Err(RuntimeError::UnknownHandle(_)) => {
                        let outcome = JobOutcome {
                            result: Some(NodeResult::Incomplete),
                            error_code: Some("lost".to_string()),
                            error_msg: Some("runtime no longer tracks this job".to_string()),
                            log: None,
                        };
                        let id = node.id;
                        if let Err(e) = self.complete(node, outcome).await {
                            warn!(node_id = %id, error = %e, "completion failed, will re-poll");
                        }
                    }
                    Err(e) => {
                        warn!(node_id = %node.id, runtime = %name, error = %e, "poll failed");
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply a terminal outcome: capture the log as an artifact, then either
    /// open the holdoff window (passing kbuild/job nodes that may spawn
    /// children) or finish the node outright.
    async fn complete(&self, node: Node, outcome: JobOutcome) -> Result<(), PipelineError> {
        let mut updated = node.clone();

        if let Some(ref log) = outcome.log {
            let name = format!("{}-{}.log", node.name, node.id.suffix());
            match self.blobs.upload(&name, log).await {
                Ok(url) => {
                    updated.artifacts.insert("log".to_string(), url);
                }
                Err(e) => warn!(node_id = %node.id, error = %e, "log upload failed"),
            }
        }

        updated.data.error_code = outcome.error_code.clone();
        updated.data.error_msg = outcome.error_msg.clone();

        let result = outcome.result.unwrap_or(NodeResult::Incomplete);
        let spawns_children =
            matches!(node.kind, NodeKind::Kbuild | NodeKind::Job | NodeKind::Process);
        if spawns_children && result == NodeResult::Pass {
            updated.result = Some(result);
            if updated.advance(NodeState::Available).is_err() {
                return Ok(());
            }
            updated.holdoff = Some(self.clock.now() + self.settings.holdoff());
        } else if updated.finish(result).is_err() {
            return Ok(());
        }

        match self.store.update(&updated, Some(NodeState::Running)).await {
            Ok(_) => {
                info!(node_id = %node.id, result = %result, "runtime job finished");
                Ok(())
            }
            Err(ClientError::Conflict(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl<C: Clock> Service for Watcher<C> {
    fn name(&self) -> &'static str {
        "watcher"
    }

    async fn tick(&self) -> Result<(), PipelineError> {
        self.poll_all().await
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
