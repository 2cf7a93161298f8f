// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timeout/holdoff reconciler: the state-machine driver for open nodes.

use crate::error::PipelineError;
use crate::service::Service;
use crate::Store;
use async_trait::async_trait;
use cv_catalog::Settings;
use cv_client::{ClientError, NodeQuery};
use cv_core::{aggregate, timeout_result, Clock, Node, NodeState, SystemClock};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Reconciler<C: Clock = SystemClock> {
    settings: Arc<Settings>,
    store: Store,
    clock: C,
}

impl<C: Clock> Reconciler<C> {
    pub fn new(settings: Arc<Settings>, store: Store, clock: C) -> Self {
        Self { settings, store, clock }
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.settings.timeouts.sweep_interval_secs)
    }

    /// One sweep over every node still open.
    ///
    /// Nodes are processed child-before-parent (deepest path first) so parent
    /// aggregation sees final children within the same sweep.
    pub async fn sweep(&self) -> Result<(), PipelineError> {
        let mut open = self.store.find(&NodeQuery::new().ne("state", NodeState::Done)).await?;
        open.sort_by_key(|n| std::cmp::Reverse(n.path.len()));
        for node in open {
            let id = node.id;
            if let Err(e) = self.examine(node).await {
                warn!(node_id = %id, error = %e, "reconcile failed for node");
            }
        }
        Ok(())
    }

    async fn examine(&self, node: Node) -> Result<(), PipelineError> {
        let now = self.clock.now();

        if node.timeout.is_some_and(|deadline| now >= deadline) {
            return self.expire(node).await;
        }

        match node.state {
            NodeState::Available if node.holdoff.is_some_and(|h| now >= h) => {
                let children = self.store.find(&NodeQuery::new().parent(node.id)).await?;
                if children.iter().all(Node::is_terminal) {
                    self.close(node, &children).await
                } else {
                    // stop accepting children, wait for the stragglers
                    let mut closing = node.clone();
                    if closing.advance(NodeState::Closing).is_err() {
                        return Ok(());
                    }
                    match self.store.update(&closing, Some(NodeState::Available)).await {
                        Ok(_) => {
                            debug!(node_id = %node.id, "holdoff elapsed, closing");
                            Ok(())
                        }
                        Err(ClientError::Conflict(_)) => Ok(()),
                        Err(e) => Err(e.into()),
                    }
                }
            }
            NodeState::Closing => {
                let children = self.store.find(&NodeQuery::new().parent(node.id)).await?;
                if children.iter().all(Node::is_terminal) {
                    self.close(node, &children).await
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    /// Finish a node whose children are all terminal, aggregating their
    /// results.
    async fn close(&self, node: Node, children: &[Node]) -> Result<(), PipelineError> {
        let verdict = aggregate(children.iter().map(|c| {
            (c.name.as_str(), c.result.unwrap_or(cv_core::NodeResult::Incomplete))
        }));
        let expect = node.state;
        let mut done = node;
        if done.finish(verdict).is_err() {
            return Ok(());
        }
        match self.store.update(&done, Some(expect)).await {
            Ok(_) => {
                info!(node_id = %done.id, result = %verdict, "node closed");
                Ok(())
            }
            Err(ClientError::Conflict(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Deadline passed: close the node and every non-terminal descendant.
    /// A node still `running` becomes incomplete; one already past its own
    /// work closes as pass.
    async fn expire(&self, node: Node) -> Result<(), PipelineError> {
        let mut descendants = self.collect_descendants(&node).await?;
        descendants.sort_by_key(|n| std::cmp::Reverse(n.path.len()));
        for descendant in descendants {
            if descendant.is_terminal() {
                continue;
            }
            self.expire_one(descendant).await?;
        }
        self.expire_one(node).await
    }

    async fn expire_one(&self, node: Node) -> Result<(), PipelineError> {
        let expect = node.state;
        let verdict = timeout_result(node.state);
        let mut done = node;
        if done.finish(verdict).is_err() {
            return Ok(());
        }
        match self.store.update(&done, Some(expect)).await {
            Ok(_) => {
                info!(node_id = %done.id, result = %verdict, "node timed out");
                Ok(())
            }
            Err(ClientError::Conflict(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn collect_descendants(&self, node: &Node) -> Result<Vec<Node>, PipelineError> {
        let mut all = Vec::new();
        let mut frontier = vec![node.id];
        while let Some(id) = frontier.pop() {
            let children = self.store.find(&NodeQuery::new().parent(id)).await?;
            for child in children {
                frontier.push(child.id);
                all.push(child);
            }
        }
        Ok(all)
    }
}

#[async_trait]
impl<C: Clock> Service for Reconciler<C> {
    fn name(&self) -> &'static str {
        "reconciler"
    }

    async fn tick(&self) -> Result<(), PipelineError> {
        self.sweep().await
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
