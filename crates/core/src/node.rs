// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node data model and state machine.
//!
//! A [`Node`] is the sole persisted entity in the pipeline: one work item in
//! the checkout → kbuild → job → test tree held by the state store. Services
//! never keep authoritative node state in memory; they read, transition, and
//! write back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

crate::define_id! {
    /// Identifier of a persisted node.
    ///
    /// Assigned by the state store on create. Services only mint their own
    /// in tests and in the in-memory fake store.
    pub struct NodeId("node-");
}

/// Maximum number of attempts for a logical job. Retries spawn fresh sibling
/// nodes with an incremented counter; the original is never mutated.
pub const MAX_RETRIES: u32 = 3;

/// What a node represents in the work tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Root node for a (tree, branch, commit) revision
    Checkout,
    /// Kernel build
    Kbuild,
    /// Test suite
    Job,
    /// Single test case
    Test,
    /// Post-processing step
    Process,
    /// Record of a pass-to-fail transition
    Regression,
}

crate::simple_display! {
    NodeKind {
        Checkout => "checkout",
        Kbuild => "kbuild",
        Job => "job",
        Test => "test",
        Process => "process",
        Regression => "regression",
    }
}

/// Lifecycle state of a node.
///
/// States only advance, never regress: `running → available → closing → done`,
/// with the shortcuts `running → done` and `available → done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Work in progress; children accepted
    Running,
    /// Primary work done, holdoff window open; children accepted
    Available,
    /// Terminal intent: no new children, waiting for existing ones
    Closing,
    /// Terminal; result is final
    Done,
}

impl NodeState {
    /// Whether moving from `self` to `next` respects the monotone lifecycle.
    pub fn can_advance_to(self, next: NodeState) -> bool {
        use NodeState::*;
        matches!(
            (self, next),
            (Running, Available)
                | (Running, Done)
                | (Available, Closing)
                | (Available, Done)
                | (Closing, Done)
        )
    }

    /// Whether a node in this state may accept new children.
    pub fn accepts_children(self) -> bool {
        matches!(self, NodeState::Running | NodeState::Available)
    }
}

crate::simple_display! {
    NodeState {
        Running => "running",
        Available => "available",
        Closing => "closing",
        Done => "done",
    }
}

/// Final verdict of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeResult {
    Pass,
    Fail,
    Skip,
    /// The work never produced a verdict (submission failure, timeout while
    /// running, infrastructure loss)
    Incomplete,
}

crate::simple_display! {
    NodeResult {
        Pass => "pass",
        Fail => "fail",
        Skip => "skip",
        Incomplete => "incomplete",
    }
}

/// Kernel source revision a subtree was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelRevision {
    pub tree: String,
    pub branch: String,
    pub commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Release string resolved by `git describe` once the tarball exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub describe: Option<String>,
}

impl KernelRevision {
    /// Parse `(version, patchlevel)` out of the describe string, e.g.
    /// `v6.1-rc3` and `v6.1.52-120-gdeadbeef` both give `(6, 1)`.
    pub fn version_tuple(&self) -> Option<(u32, u32)> {
        let describe = self.describe.as_deref()?;
        let rest = describe.strip_prefix('v').unwrap_or(describe);
        let mut parts = rest.split(['.', '-']);
        let version = parts.next()?.parse().ok()?;
        let patchlevel = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Some((version, patchlevel))
    }
}

/// Structured attributes carried by a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_revision: Option<KernelRevision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defconfig: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_full: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fragments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Name of the runtime the job was dispatched to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// External job id assigned by the runtime (LAVA job number, pod name, …)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_job_id: Option<String>,
    /// Tool/infrastructure error marker; excludes the node from regression
    /// detection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    /// Cross-link to the regression node recording this failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regression: Option<NodeId>,
    #[serde(default)]
    pub retry_counter: u32,
    /// Write-once marker: the forwarder has handled (or filtered) this node
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub processed_by_reporting: bool,
}

/// One work item in the pipeline tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Job name; matches a job definition key for scheduled nodes
    pub name: String,
    /// Ordered names from the root checkout down to this node
    #[serde(default)]
    pub path: Vec<String>,
    /// Parent node; null only for checkouts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub state: NodeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<NodeResult>,
    #[serde(default)]
    pub data: NodeData,
    /// Artifact name → public URL
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Absolute deadline set at creation and never extended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<DateTime<Utc>>,
    /// Grace deadline set when the node first enters `available`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holdoff: Option<DateTime<Utc>>,
    /// Job-name patterns selectively gating scheduling under this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobfilter: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_groups: Vec<String>,
    /// Fingerprint of the (tree, branch, commit) this subtree belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treeid: Option<String>,
}

impl Node {
    /// Whether the node has reached its final state.
    pub fn is_terminal(&self) -> bool {
        self.state == NodeState::Done
    }

    /// Whether new children may be attached under this node.
    pub fn accepts_children(&self) -> bool {
        self.state.accepts_children()
    }

    /// Advance the lifecycle state, rejecting regressions.
    pub fn advance(&mut self, next: NodeState) -> Result<(), NodeError> {
        if !self.state.can_advance_to(next) {
            return Err(NodeError::InvalidTransition { from: self.state, to: next });
        }
        self.state = next;
        Ok(())
    }

    /// Move to `done` with a final result.
    ///
    /// A node that is already done keeps its result; any attempt to change it
    /// is an error.
    pub fn finish(&mut self, result: NodeResult) -> Result<(), NodeError> {
        if self.state == NodeState::Done {
            return Err(NodeError::ResultImmutable(self.id));
        }
        self.advance(NodeState::Done)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn revision(&self) -> Option<&KernelRevision> {
        self.data.kernel_revision.as_ref()
    }

    /// Whether the node's jobfilter admits the given job name.
    ///
    /// An absent or empty filter means "all eligible jobs".
    pub fn matches_jobfilter(&self, job: &str) -> bool {
        match self.jobfilter.as_deref() {
            None | Some([]) => true,
            Some(patterns) => patterns.iter().any(|p| name_matches(p, job)),
        }
    }

    /// Materialize a node from a creation payload, as the store does.
    pub fn from_seed(id: NodeId, seed: NodeSeed, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: seed.kind,
            name: seed.name,
            path: seed.path,
            parent: seed.parent,
            group: seed.group,
            state: seed.state,
            result: seed.result,
            data: seed.data,
            artifacts: seed.artifacts,
            created: now,
            updated: now,
            timeout: seed.timeout,
            holdoff: seed.holdoff,
            jobfilter: seed.jobfilter,
            owner: seed.owner,
            submitter: seed.submitter,
            user_groups: seed.user_groups,
            treeid: seed.treeid,
        }
    }
}

/// Creation payload for a node: everything the store does not assign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSeed {
    pub kind: NodeKind,
    pub name: String,
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default = "NodeSeed::default_state")]
    pub state: NodeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<NodeResult>,
    #[serde(default)]
    pub data: NodeData,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holdoff: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobfilter: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treeid: Option<String>,
}

impl NodeSeed {
    fn default_state() -> NodeState {
        NodeState::Running
    }

    /// Root seed: a checkout with no parent.
    pub fn root(kind: NodeKind, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind,
            path: vec![name.clone()],
            name,
            state: NodeState::Running,
            ..Default::default()
        }
    }

    /// Child seed inheriting position, revision, filter, and provenance from
    /// the parent node.
    pub fn child_of(parent: &Node, kind: NodeKind, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut path = parent.path.clone();
        path.push(name.clone());
        Self {
            kind,
            name,
            path,
            parent: Some(parent.id),
            state: NodeState::Running,
            data: NodeData {
                kernel_revision: parent.data.kernel_revision.clone(),
                arch: parent.data.arch.clone(),
                compiler: parent.data.compiler.clone(),
                defconfig: parent.data.defconfig.clone(),
                config_full: parent.data.config_full.clone(),
                fragments: parent.data.fragments.clone(),
                platform: parent.data.platform.clone(),
                ..Default::default()
            },
            jobfilter: parent.jobfilter.clone(),
            owner: parent.owner.clone(),
            submitter: parent.submitter.clone(),
            user_groups: parent.user_groups.clone(),
            treeid: parent.treeid.clone(),
            ..Default::default()
        }
    }
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Checkout
    }
}

impl Default for NodeState {
    fn default() -> Self {
        NodeState::Running
    }
}

/// Match a job name against a filter pattern with `*` wildcards.
pub fn name_matches(pattern: &str, name: &str) -> bool {
    fn inner(p: &[u8], n: &[u8]) -> bool {
        match p.first() {
            None => n.is_empty(),
            Some(b'*') => inner(&p[1..], n) || (!n.is_empty() && inner(p, &n[1..])),
            Some(&pc) => n.first() == Some(&pc) && inner(&p[1..], &n[1..]),
        }
    }
    inner(pattern.as_bytes(), name.as_bytes())
}

/// Violations of the node lifecycle invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: NodeState, to: NodeState },
    #[error("node {0} is done; its result is immutable")]
    ResultImmutable(NodeId),
    #[error("parent {0} no longer accepts children")]
    ParentClosed(NodeId),
}

crate::builder! {
    pub struct NodeBuilder => Node {
        into {
            id: NodeId = "node-0000000000000000001",
            name: String = "baseline-arm64",
        }
        set {
            kind: NodeKind = NodeKind::Job,
            path: Vec<String> = Vec::new(),
            state: NodeState = NodeState::Running,
            data: NodeData = NodeData::default(),
            artifacts: BTreeMap<String, String> = BTreeMap::new(),
            user_groups: Vec<String> = Vec::new(),
        }
        option {
            parent: NodeId = None,
            group: String = None,
            result: NodeResult = None,
            timeout: DateTime<Utc> = None,
            holdoff: DateTime<Utc> = None,
            jobfilter: Vec<String> = None,
            owner: String = None,
            submitter: String = None,
            treeid: String = None,
        }
        computed {
            created: DateTime<Utc> = Utc::now(),
            updated: DateTime<Utc> = Utc::now(),
        }
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
