// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn agg(children: &[(&str, NodeResult)]) -> NodeResult {
    aggregate(children.iter().map(|(n, r)| (*n, *r)))
}

#[test]
fn all_pass_is_pass() {
    assert_eq!(
        agg(&[("boot", NodeResult::Pass), ("login", NodeResult::Pass)]),
        NodeResult::Pass
    );
}

#[test]
fn any_fail_is_fail() {
    assert_eq!(
        agg(&[("boot", NodeResult::Pass), ("login", NodeResult::Fail)]),
        NodeResult::Fail
    );
}

#[test]
fn setup_fail_makes_incomplete() {
    assert_eq!(
        agg(&[("setup", NodeResult::Fail), ("login", NodeResult::Fail)]),
        NodeResult::Incomplete
    );
}

#[test]
fn setup_fail_alone_is_incomplete() {
    assert_eq!(
        agg(&[("setup", NodeResult::Fail), ("login", NodeResult::Pass)]),
        NodeResult::Incomplete
    );
}

#[test]
fn setup_pass_does_not_shield_failures() {
    // setup passed, a real test failed: the failure stands
    assert_eq!(
        agg(&[("setup", NodeResult::Pass), ("login", NodeResult::Fail)]),
        NodeResult::Fail
    );
}

#[test]
fn all_skip_is_skip() {
    assert_eq!(
        agg(&[("boot", NodeResult::Skip), ("login", NodeResult::Skip)]),
        NodeResult::Skip
    );
}

#[test]
fn mixed_pass_skip_is_pass() {
    assert_eq!(
        agg(&[("boot", NodeResult::Pass), ("login", NodeResult::Pass), ("net", NodeResult::Skip)]),
        NodeResult::Pass
    );
}

#[test]
fn no_children_is_pass() {
    // The holdoff-completion convention: an empty subtree closes as pass
    assert_eq!(agg(&[]), NodeResult::Pass);
}

#[test]
fn incomplete_children_do_not_fail_parent() {
    assert_eq!(
        agg(&[("boot", NodeResult::Pass), ("login", NodeResult::Incomplete)]),
        NodeResult::Pass
    );
}

#[parameterized(
    running = { NodeState::Running, NodeResult::Incomplete },
    available = { NodeState::Available, NodeResult::Pass },
    closing = { NodeState::Closing, NodeResult::Pass },
)]
fn timeout_result_by_state(state: NodeState, expect: NodeResult) {
    assert_eq!(timeout_result(state), expect);
}
