// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory collaborator fake for service tests.
//!
//! One [`FakeStore`] stands in for the state store, the event bus, and the
//! blob store at once. It enforces the same lifecycle invariants the real
//! store does: monotone state transitions, closed parents rejecting children,
//! compare-and-swap preconditions, immutable results, and the write-once
//! reporting marker.

use crate::blob::BlobStore;
use crate::error::ClientError;
use crate::events::EventBus;
use crate::query::NodeQuery;
use crate::store::NodeStore;
use async_trait::async_trait;
use cv_core::{Clock, FakeClock, Node, NodeError, NodeEvent, NodeId, NodeSeed, NodeState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::{broadcast, mpsc};

pub struct FakeStore {
    clock: FakeClock,
    nodes: Mutex<HashMap<NodeId, Node>>,
    uploads: Mutex<Vec<String>>,
    tx: broadcast::Sender<NodeEvent>,
}

impl FakeStore {
    pub fn new(clock: FakeClock) -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            clock,
            nodes: Mutex::new(HashMap::new()),
            uploads: Mutex::new(Vec::new()),
            tx,
        }
    }

    pub fn clock(&self) -> &FakeClock {
        &self.clock
    }

    /// Seed a node directly, bypassing validation.
    pub fn insert(&self, node: Node) {
        self.nodes.lock().insert(node.id, node);
    }

    /// Synchronous read for test assertions.
    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.nodes.lock().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.lock().values().cloned().collect();
        nodes.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.as_str().cmp(b.id.as_str())));
        nodes
    }

    pub fn children_of(&self, id: NodeId) -> Vec<Node> {
        self.all().into_iter().filter(|n| n.parent == Some(id)).collect()
    }

    /// Names of artifacts uploaded through the blob facade.
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().clone()
    }

    fn emit(&self, node: &Node) {
        // nobody listening is fine
        let _ = self.tx.send(NodeEvent::of(node));
    }
}

#[async_trait]
impl NodeStore for FakeStore {
    async fn get(&self, id: NodeId) -> Result<Node, ClientError> {
        self.node(id).ok_or(ClientError::NotFound(id))
    }

    async fn find(&self, query: &NodeQuery) -> Result<Vec<Node>, ClientError> {
        let mut matched: Vec<Node> = self.all().into_iter().filter(|n| query.matches(n)).collect();
        if let Some(limit) = query.limit_value() {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn create(&self, seed: NodeSeed) -> Result<Node, ClientError> {
        let node = {
            let mut nodes = self.nodes.lock();
            if let Some(parent_id) = seed.parent {
                let Some(parent) = nodes.get(&parent_id) else {
                    return Err(ClientError::NotFound(parent_id));
                };
                // regression nodes are annotation records attached to
                // terminal parents, not work items
                if seed.kind != cv_core::NodeKind::Regression && !parent.accepts_children() {
                    return Err(ClientError::Invariant(NodeError::ParentClosed(parent_id)));
                }
            }
            let node = Node::from_seed(NodeId::new(), seed, self.clock.now());
            nodes.insert(node.id, node.clone());
            node
        };
        self.emit(&node);
        Ok(node)
    }

    async fn update(&self, node: &Node, expect: Option<NodeState>) -> Result<Node, ClientError> {
        let stored = {
            let mut nodes = self.nodes.lock();
            let Some(current) = nodes.get(&node.id) else {
                return Err(ClientError::NotFound(node.id));
            };
            if let Some(state) = expect {
                if current.state != state {
                    return Err(ClientError::Conflict(node.id));
                }
            }
            if current.state == NodeState::Done {
                if node.state != current.state || node.result != current.result {
                    return Err(ClientError::Invariant(NodeError::ResultImmutable(node.id)));
                }
            } else if node.state != current.state && !current.state.can_advance_to(node.state) {
                return Err(ClientError::Invariant(NodeError::InvalidTransition {
                    from: current.state,
                    to: node.state,
                }));
            }
            let mut stored = node.clone();
            if current.data.processed_by_reporting {
                // write-once marker sticks
                stored.data.processed_by_reporting = true;
            }
            stored.created = current.created;
            stored.updated = self.clock.now();
            nodes.insert(stored.id, stored.clone());
            stored
        };
        self.emit(&stored);
        Ok(stored)
    }
}

#[async_trait]
impl EventBus for FakeStore {
    async fn subscribe(&self, _channel: &str) -> Result<mpsc::Receiver<NodeEvent>, ClientError> {
        let mut source = self.tx.subscribe();
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
        Ok(rx)
    }

    async fn publish(&self, _channel: &str, event: &NodeEvent) -> Result<(), ClientError> {
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FakeStore {
    async fn upload(&self, name: &str, _path: &Path) -> Result<String, ClientError> {
        self.upload_bytes(name, Vec::new()).await
    }

    async fn upload_bytes(&self, name: &str, _bytes: Vec<u8>) -> Result<String, ClientError> {
        self.uploads.lock().push(name.to_string());
        Ok(format!("https://blobs.test/{name}"))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
