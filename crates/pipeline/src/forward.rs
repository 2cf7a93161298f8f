// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Result forwarder: push terminal nodes to the downstream reporting sink.

use crate::error::PipelineError;
use crate::loganalysis;
use crate::report::{self, Incident, Issue, ReportSink};
use crate::retry;
use crate::service::Service;
use crate::Store;
use async_trait::async_trait;
use cv_catalog::Settings;
use cv_client::NodeQuery;
use cv_core::{Clock, Node, NodeId, NodeKind, NodeResult, NodeState, SystemClock};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Batch window: nodes created within the last 4 days whose last update has
/// settled for 5 minutes.
const BATCH_MAX_AGE_DAYS: i64 = 4;
const BATCH_SETTLE_MINUTES: i64 = 5;

pub struct Forwarder<C: Clock = SystemClock> {
    settings: Arc<Settings>,
    store: Store,
    sink: Arc<dyn ReportSink>,
    http: reqwest::Client,
    clock: C,
}

impl<C: Clock> Forwarder<C> {
    pub fn new(settings: Arc<Settings>, store: Store, sink: Arc<dyn ReportSink>, clock: C) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self { settings, store, sink, http, clock }
    }

    pub fn batch_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.settings.timeouts.forward_interval_secs)
    }

    /// Batch + event-driven loop.
    pub async fn run(&self, bus: &dyn cv_client::EventBus, shutdown: CancellationToken) {
        let mut rx = match bus.subscribe(cv_core::NODE_CHANNEL).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "forwarder could not subscribe, exiting");
                return;
            }
        };
        let mut ticker = tokio::time::interval(self.batch_interval());
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                event = rx.recv() => {
                    let Some(event) = event else { return };
                    if event.state != NodeState::Done {
                        continue;
                    }
                    if let Err(e) = self.forward(event.id).await {
                        warn!(node_id = %event.id, error = %e, "forwarding failed, batch will retry");
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.batch().await {
                        warn!(error = %e, "forward batch failed");
                    }
                }
            }
        }
    }

    /// Sweep for settled terminal nodes the event path missed.
    pub async fn batch(&self) -> Result<(), PipelineError> {
        let now = self.clock.now();
        let created_after = now - chrono::Duration::days(BATCH_MAX_AGE_DAYS);
        let updated_before = now - chrono::Duration::minutes(BATCH_SETTLE_MINUTES);
        let pending = self
            .store
            .find(
                &NodeQuery::new()
                    .state(NodeState::Done)
                    .ne("data.processed_by_reporting", true)
                    .gt("created", created_after.to_rfc3339())
                    .lt("updated", updated_before.to_rfc3339()),
            )
            .await?;
        for node in pending {
            let id = node.id;
            if let Err(e) = self.forward(id).await {
                warn!(node_id = %id, error = %e, "forwarding failed, next batch will retry");
            }
        }
        Ok(())
    }

    /// Forward one terminal node. Returns whether it was actually uploaded
    /// (as opposed to filtered).
    ///
    /// The processed marker is only written after a successful upload, so a
    /// sink failure leaves the node for the next batch: at-least-once, with
    /// the receiver deduplicating on node id.
    pub async fn forward(&self, id: NodeId) -> Result<bool, PipelineError> {
        let node = self.store.get(id).await?;
        if !node.is_terminal() || node.data.processed_by_reporting {
            return Ok(false);
        }

        // regressions are internal cross-links, not sink entities
        if node.kind == NodeKind::Regression {
            self.mark_processed(node).await?;
            return Ok(false);
        }

        // the retry filter: an attempt that will be retried is recorded as
        // processed without being forwarded; only the final attempt reports
        if retry::eligible_for_retry(&node) {
            debug!(node_id = %id, attempt = node.data.retry_counter, "retry pending, not forwarded");
            self.mark_processed(node).await?;
            return Ok(false);
        }

        let (issues, incidents) = self.log_findings(&node).await;
        let document = report::convert(&node, issues, incidents);
        self.sink.submit(&document).await?;

        self.mark_processed(node).await?;
        info!(node_id = %id, "node forwarded to reporting sink");
        Ok(true)
    }

    /// Run log analysis for failed builds and boot tests.
    async fn log_findings(&self, node: &Node) -> (Vec<Issue>, Vec<Incident>) {
        let eligible = node.result == Some(NodeResult::Fail)
            && (node.kind == NodeKind::Kbuild || node.name.starts_with("boot"));
        if !eligible {
            return (Vec::new(), Vec::new());
        }
        let Some(url) = ["log", "build_log", "lava_log"]
            .iter()
            .find_map(|k| node.artifacts.get(*k))
        else {
            return (Vec::new(), Vec::new());
        };
        let mut issues = Vec::new();
        let mut incidents = Vec::new();
        for line in loganalysis::fetch_and_scan(&self.http, url).await {
            let issue = report::issue_for(&line);
            incidents.push(report::incident_for(&issue, node));
            issues.push(issue);
        }
        (issues, incidents)
    }

    async fn mark_processed(&self, node: Node) -> Result<(), PipelineError> {
        let mut marked = node;
        marked.data.processed_by_reporting = true;
        self.store.update(&marked, None).await?;
        Ok(())
    }
}

#[async_trait]
impl<C: Clock> Service for Forwarder<C> {
    fn name(&self) -> &'static str {
        "forwarder"
    }

    async fn tick(&self) -> Result<(), PipelineError> {
        self.batch().await
    }
}

#[cfg(test)]
#[path = "forward_tests.rs"]
mod tests;
