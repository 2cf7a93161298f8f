// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cv_core::{KernelRevision, Node, NodeData};
use yare::parameterized;

fn node_for(tree: &str, branch: &str) -> Node {
    Node::builder()
        .data(NodeData {
            kernel_revision: Some(KernelRevision {
                tree: tree.to_string(),
                branch: branch.to_string(),
                commit: "deadbeef".to_string(),
                url: None,
                describe: Some("v6.6".to_string()),
            }),
            ..Default::default()
        })
        .build()
}

fn rules(tree: &[&str], branch: &[&str]) -> Rules {
    Rules {
        tree: tree.iter().map(|s| s.to_string()).collect(),
        branch: branch.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

// The reference table for scope rules: tree = [linus:master, stable],
// branch = [!stable:master].
#[parameterized(
    linus_master = { "linus", "master", true },
    stable_any_branch = { "stable", "linux-6.1.y", true },
    stable_master_denied = { "stable", "master", false },
    next_master = { "next", "master", false },
)]
fn scope_rule_reference_table(tree: &str, branch: &str, expect: bool) {
    let rules = rules(&["linus:master", "stable"], &["!stable:master"]);
    assert_eq!(rules.eligible(&node_for(tree, branch)), expect);
}

#[test]
fn no_rules_admits_everything() {
    assert!(Rules::default().eligible(&node_for("mainline", "master")));
}

#[test]
fn negative_only_tree_rule() {
    let rules = rules(&["!next"], &[]);
    assert!(rules.eligible(&node_for("mainline", "master")));
    assert!(!rules.eligible(&node_for("next", "master")));
}

#[test]
fn bare_branch_rule_matches_any_tree() {
    let rules = rules(&[], &["master"]);
    assert!(rules.eligible(&node_for("mainline", "master")));
    assert!(rules.eligible(&node_for("next", "master")));
    assert!(!rules.eligible(&node_for("stable", "linux-6.1.y")));
}

#[test]
fn tree_rules_require_a_revision() {
    let bare = Node::builder().build();
    assert!(!rules(&["mainline"], &[]).eligible(&bare));
    assert!(Rules::default().eligible(&bare));
}

fn node_with_version(describe: &str) -> Node {
    Node::builder()
        .data(NodeData {
            kernel_revision: Some(KernelRevision {
                tree: "mainline".to_string(),
                branch: "master".to_string(),
                commit: "deadbeef".to_string(),
                url: None,
                describe: Some(describe.to_string()),
            }),
            ..Default::default()
        })
        .build()
}

#[parameterized(
    below_min = { "v4.18", false },
    at_min = { "v4.19", true },
    between = { "v5.15.3", true },
    at_max = { "v6.6", true },
    above_max = { "v6.7-rc1", false },
)]
fn version_bounds_are_inclusive(describe: &str, expect: bool) {
    let rules = Rules {
        min_version: Some(Version { version: 4, patchlevel: 19 }),
        max_version: Some(Version { version: 6, patchlevel: 6 }),
        ..Default::default()
    };
    assert_eq!(rules.eligible(&node_with_version(describe)), expect);
}

#[test]
fn version_rule_without_parseable_describe_is_ineligible() {
    let rules = Rules {
        min_version: Some(Version { version: 4, patchlevel: 19 }),
        ..Default::default()
    };
    assert!(!rules.eligible(&node_with_version("next-20260101")));
}

fn node_with_build(arch: &str, defconfig: &str, fragments: &[&str]) -> Node {
    Node::builder()
        .data(NodeData {
            arch: Some(arch.to_string()),
            defconfig: Some(defconfig.to_string()),
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
        .build()
}

#[test]
fn arch_membership() {
    let rules = Rules { arch: vec!["arm64".into(), "x86_64".into()], ..Default::default() };
    assert!(rules.eligible(&node_with_build("arm64", "defconfig", &[])));
    assert!(!rules.eligible(&node_with_build("riscv", "defconfig", &[])));
}

#[test]
fn arch_negation() {
    let rules = Rules { arch: vec!["!arm".into()], ..Default::default() };
    assert!(rules.eligible(&node_with_build("arm64", "defconfig", &[])));
    assert!(!rules.eligible(&node_with_build("arm", "defconfig", &[])));
}

#[test]
fn arch_rule_with_no_arch_attribute() {
    let node = Node::builder().build();
    // positive membership cannot be satisfied without a value
    assert!(!Rules { arch: vec!["arm64".into()], ..Default::default() }.eligible(&node));
    // pure negation passes vacuously
    assert!(Rules { arch: vec!["!arm".into()], ..Default::default() }.eligible(&node));
}

#[test]
fn fragment_rules_check_every_fragment() {
    let rules = Rules { fragments: vec!["kselftest".into()], ..Default::default() };
    assert!(rules.eligible(&node_with_build("arm64", "defconfig", &["kselftest", "crypto"])));
    assert!(!rules.eligible(&node_with_build("arm64", "defconfig", &["crypto"])));

    let deny = Rules { fragments: vec!["!debug".into()], ..Default::default() };
    assert!(!deny.eligible(&node_with_build("arm64", "defconfig", &["debug"])));
}

#[parameterized(
    days = { "1d", 24 * 60 },
    hours = { "12h", 12 * 60 },
    minutes = { "45m", 45 },
    combined = { "1d6h30m", 24 * 60 + 6 * 60 + 30 },
)]
fn window_parsing(input: &str, minutes: i64) {
    assert_eq!(parse_window(input).unwrap(), chrono::Duration::minutes(minutes));
}

#[parameterized(
    empty = { "" },
    no_unit = { "15" },
    unknown_unit = { "3w" },
    bare_unit = { "d" },
)]
fn window_parsing_rejects(input: &str) {
    assert!(parse_window(input).is_err());
}

#[test]
fn validate_rejects_malformed_entries() {
    assert!(rules(&["!"], &[]).validate().is_err());
    assert!(rules(&["tree:"], &[]).validate().is_err());
    assert!(Rules { arch: vec!["!".into()], ..Default::default() }.validate().is_err());
    assert!(Rules { frequency: Some("2w".into()), ..Default::default() }.validate().is_err());
    assert!(rules(&["linus:master", "!next"], &["!stable:master"]).validate().is_ok());
}

#[test]
fn frequency_window_round_trip() {
    let rules = Rules { frequency: Some("1d".into()), ..Default::default() };
    assert_eq!(rules.frequency_window().unwrap(), Some(chrono::Duration::days(1)));
    assert_eq!(Rules::default().frequency_window().unwrap(), None);
}
