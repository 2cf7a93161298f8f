// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event-bus payloads and scheduler event patterns.

use crate::node::{Node, NodeId, NodeKind, NodeResult, NodeState};
use serde::{Deserialize, Serialize};

/// The single topic all node change notices are published on.
pub const NODE_CHANNEL: &str = "node";

/// Payload published on the bus whenever a node is created or updated.
///
/// Carries just enough for routing; subscribers fetch the full node from the
/// state store when they need more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEvent {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    pub state: NodeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<NodeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl NodeEvent {
    pub fn of(node: &Node) -> Self {
        Self {
            id: node.id,
            kind: node.kind,
            name: node.name.clone(),
            state: node.state,
            result: node.result,
            group: node.group.clone(),
            owner: node.owner.clone(),
        }
    }
}

/// Scheduler-entry event pattern.
///
/// A node event matches when every present field equals the event's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPattern {
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<NodeState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<NodeResult>,
}

fn default_channel() -> String {
    NODE_CHANNEL.to_string()
}

impl Default for EventPattern {
    fn default() -> Self {
        Self { channel: default_channel(), name: None, kind: None, state: None, result: None }
    }
}

impl EventPattern {
    /// Pattern matching events of the given kind and state on the node channel.
    pub fn for_state(kind: NodeKind, state: NodeState) -> Self {
        Self { kind: Some(kind), state: Some(state), ..Default::default() }
    }

    pub fn matches(&self, event: &NodeEvent) -> bool {
        if let Some(ref name) = self.name {
            if *name != event.name {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if kind != event.kind {
                return false;
            }
        }
        if let Some(state) = self.state {
            if state != event.state {
                return false;
            }
        }
        if let Some(result) = self.result {
            if event.result != Some(result) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
