// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Regression detector: record pass-to-fail transitions.

use crate::error::PipelineError;
use crate::Store;
use cv_client::{ClientError, NodeQuery};
use cv_core::{Node, NodeData, NodeEvent, NodeId, NodeKind, NodeResult, NodeSeed, NodeState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct RegressionDetector {
    store: Store,
}

impl RegressionDetector {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn run(&self, bus: &dyn cv_client::EventBus, shutdown: CancellationToken) {
        let mut rx = match bus.subscribe(cv_core::NODE_CHANNEL).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "regression detector could not subscribe, exiting");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                event = rx.recv() => {
                    let Some(event) = event else { return };
                    if event.state != NodeState::Done || event.result != Some(NodeResult::Fail) {
                        continue;
                    }
                    if let Err(e) = self.handle(event.id).await {
                        warn!(node_id = %event.id, error = %e, "regression detection failed");
                    }
                }
            }
        }
    }

    /// Check one failed node against history; emit a regression node when the
    /// same fingerprint last passed.
    pub async fn handle(&self, id: NodeId) -> Result<Option<Node>, PipelineError> {
        let node = self.store.get(id).await?;
        if node.result != Some(NodeResult::Fail) {
            return Ok(None);
        }
        // tool/infrastructure errors are not code regressions
        if node.data.error_code.is_some() {
            return Ok(None);
        }
        if !matches!(node.kind, NodeKind::Kbuild | NodeKind::Job | NodeKind::Test) {
            return Ok(None);
        }
        // already recorded (idempotent re-delivery)
        if node.data.regression.is_some() {
            return Ok(None);
        }

        let Some(previous_pass) = self.last_pass(&node).await? else {
            debug!(node_id = %id, "no prior pass for fingerprint, not a regression");
            return Ok(None);
        };

        let mut path = node.path.clone();
        path.push("regression".to_string());
        let seed = NodeSeed {
            kind: NodeKind::Regression,
            name: node.name.clone(),
            path,
            parent: Some(node.id),
            group: node.group.clone(),
            state: NodeState::Done,
            result: Some(NodeResult::Fail),
            data: NodeData {
                kernel_revision: node.data.kernel_revision.clone(),
                arch: node.data.arch.clone(),
                compiler: node.data.compiler.clone(),
                defconfig: node.data.defconfig.clone(),
                config_full: node.data.config_full.clone(),
                platform: node.data.platform.clone(),
                // cross-link to the last known good run
                regression: Some(previous_pass.id),
                ..Default::default()
            },
            treeid: node.treeid.clone(),
            ..Default::default()
        };
        let regression = self.store.create(seed).await?;

        // cross-link back from the failed node
        let mut failed = node.clone();
        failed.data.regression = Some(regression.id);
        match self.store.update(&failed, None).await {
            Ok(_) => {}
            Err(ClientError::Invariant(_)) | Err(ClientError::Conflict(_)) => {}
            Err(e) => return Err(e.into()),
        }

        info!(node_id = %node.id, regression = %regression.id, last_pass = %previous_pass.id,
            "regression recorded");
        Ok(Some(regression))
    }

    /// Most recent sibling run with the same fingerprint that passed.
    async fn last_pass(&self, node: &Node) -> Result<Option<Node>, PipelineError> {
        let mut query = NodeQuery::new()
            .field("kind", node.kind)
            .name(&node.name)
            .state(NodeState::Done)
            .field("result", NodeResult::Pass);
        if let Some(rev) = node.revision() {
            query = query
                .field("data.kernel_revision.tree", &rev.tree)
                .field("data.kernel_revision.branch", &rev.branch);
        }
        for (path, value) in [
            ("data.arch", &node.data.arch),
            ("data.config_full", &node.data.config_full),
            ("data.compiler", &node.data.compiler),
            ("data.platform", &node.data.platform),
        ] {
            if let Some(value) = value {
                query = query.field(path, value);
            }
        }
        let matches = self.store.find(&query).await?;
        // results come back oldest-first; the fingerprint's latest pass wins
        Ok(matches.into_iter().filter(|n| n.id != node.id).next_back())
    }
}

#[cfg(test)]
#[path = "regression_tests.rs"]
mod tests;
