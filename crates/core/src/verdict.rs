// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Result rollup across a node's immediate children.

use crate::node::{NodeResult, NodeState};

/// Name of the environment-preparation suite whose failure means the parent
/// never got a fair run.
pub const SETUP_SUITE: &str = "setup";

/// Aggregate a parent verdict from its immediate children.
///
/// - all pass: pass
/// - any fail: fail, unless a `setup` child failed, which makes the whole
///   run incomplete
/// - all skip: skip
/// - anything else (mixed pass/skip, no children): pass
pub fn aggregate<'a, I>(children: I) -> NodeResult
where
    I: IntoIterator<Item = (&'a str, NodeResult)>,
{
    let mut seen = 0usize;
    let mut skips = 0usize;
    let mut any_fail = false;
    let mut setup_fail = false;

    for (name, result) in children {
        seen += 1;
        match result {
            NodeResult::Skip => skips += 1,
            NodeResult::Fail => {
                any_fail = true;
                if name == SETUP_SUITE {
                    setup_fail = true;
                }
            }
            NodeResult::Pass | NodeResult::Incomplete => {}
        }
    }

    if any_fail {
        if setup_fail {
            NodeResult::Incomplete
        } else {
            NodeResult::Fail
        }
    } else if seen > 0 && skips == seen {
        NodeResult::Skip
    } else {
        NodeResult::Pass
    }
}

/// Result assigned when a node hits its timeout deadline.
///
/// A node still `running` never finished its own work: incomplete. A node
/// past `running` finished its work and was only waiting on the holdoff or
/// on children, so the timeout closes it as a pass.
pub fn timeout_result(state: NodeState) -> NodeResult {
    if state == NodeState::Running {
        NodeResult::Incomplete
    } else {
        NodeResult::Pass
    }
}

#[cfg(test)]
#[path = "verdict_tests.rs"]
mod tests;
