// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry siblings.
//!
//! A failed attempt is never mutated; a fresh sibling node is created with an
//! incremented counter. The same predicate drives both retry spawning and the
//! forwarder's retry filter, so an attempt is either retried or reported,
//! never both.

use cv_core::{Node, NodeData, NodeKind, NodeResult, NodeSeed, NodeState, MAX_RETRIES};
use std::collections::BTreeMap;

/// Whether this terminal node earns another attempt: kbuild/job nodes that
/// failed or never completed, and baseline test runs that failed, up to
/// [`MAX_RETRIES`].
pub fn eligible_for_retry(node: &Node) -> bool {
    if node.data.retry_counter >= MAX_RETRIES {
        return false;
    }
    match node.kind {
        NodeKind::Kbuild | NodeKind::Job => {
            matches!(node.result, Some(NodeResult::Fail | NodeResult::Incomplete))
        }
        _ => node.name.starts_with("baseline") && node.result == Some(NodeResult::Fail),
    }
}

/// Seed for the retry sibling: same position in the tree, fresh lifecycle,
/// incremented counter.
pub fn retry_seed(node: &Node) -> NodeSeed {
    NodeSeed {
        kind: node.kind,
        name: node.name.clone(),
        path: node.path.clone(),
        parent: node.parent,
        group: node.group.clone(),
        state: NodeState::Running,
        result: None,
        data: NodeData {
            kernel_revision: node.data.kernel_revision.clone(),
            arch: node.data.arch.clone(),
            compiler: node.data.compiler.clone(),
            defconfig: node.data.defconfig.clone(),
            config_full: node.data.config_full.clone(),
            fragments: node.data.fragments.clone(),
            platform: node.data.platform.clone(),
            device: node.data.device.clone(),
            runtime: node.data.runtime.clone(),
            runtime_job_id: None,
            error_code: None,
            error_msg: None,
            regression: None,
            retry_counter: node.data.retry_counter + 1,
            processed_by_reporting: false,
        },
        artifacts: BTreeMap::new(),
        timeout: None,
        holdoff: None,
        jobfilter: node.jobfilter.clone(),
        owner: node.owner.clone(),
        submitter: node.submitter.clone(),
        user_groups: node.user_groups.clone(),
        treeid: node.treeid.clone(),
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
