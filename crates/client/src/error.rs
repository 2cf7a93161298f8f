// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collaborator errors and the transient/permanent split.

use cv_core::{NodeError, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("http transport error")]
    Transport(#[from] reqwest::Error),

    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Compare-and-swap precondition failed; the caller re-reads and
    /// reconciles
    #[error("state precondition failed for node {0}")]
    Conflict(NodeId),

    #[error("node {0} not found")]
    NotFound(NodeId),

    #[error("invalid payload")]
    Decode(#[from] serde_json::Error),

    /// A write violated the node lifecycle (surfaced by the fake; the real
    /// store answers 4xx, mapped to `Status`)
    #[error(transparent)]
    Invariant(#[from] NodeError),

    #[error("event stream closed")]
    StreamClosed,

    #[error("io error")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Transient upstream failures are retried indefinitely with bounded
    /// backoff and never surface to a node.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(_) | ClientError::StreamClosed => true,
            ClientError::Status { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}
