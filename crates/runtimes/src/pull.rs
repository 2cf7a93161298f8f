// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pull-lab runtime.
//!
//! The lab drives itself: it pulls work descriptors from the spool, runs
//! them, and posts results to the callback endpoint. Submission here only
//! materializes the descriptor; the node stays `running` until the callback
//! arrives.

use crate::adapter::{JobStatus, RenderedJob, RuntimeAdapter, RuntimeError, SubmitHandle};
use async_trait::async_trait;
use cv_core::Node;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

#[derive(Serialize)]
struct Descriptor<'a> {
    node: &'a str,
    name: &'a str,
    definition: &'a str,
}

pub struct PullRuntime {
    name: String,
    spool: PathBuf,
}

impl PullRuntime {
    pub fn new(name: impl Into<String>, spool: PathBuf) -> Self {
        Self { name: name.into(), spool }
    }

    fn descriptor_path(&self, node: &Node) -> PathBuf {
        self.spool.join(format!("{}.json", node.id))
    }
}

#[async_trait]
impl RuntimeAdapter for PullRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, job: &RenderedJob, node: &Node) -> Result<SubmitHandle, RuntimeError> {
        tokio::fs::create_dir_all(&self.spool).await?;
        let descriptor = Descriptor {
            node: node.id.as_str(),
            name: &job.name,
            definition: &job.content,
        };
        let body = serde_json::to_vec_pretty(&descriptor)
            .map_err(|e| RuntimeError::Payload(e.to_string()))?;
        tokio::fs::write(self.descriptor_path(node), body).await?;
        debug!(runtime = %self.name, node_id = %node.id, "spooled pull-lab descriptor");
        Ok(SubmitHandle { runtime: self.name.clone(), external_id: node.id.to_string() })
    }

    async fn poll(&self, _handle: &SubmitHandle) -> Result<JobStatus, RuntimeError> {
        // the lab reports back through the callback ingestor
        Ok(JobStatus::Running)
    }

    async fn cancel(&self, handle: &SubmitHandle) -> Result<(), RuntimeError> {
        let path = self.spool.join(format!("{}.json", handle.external_id));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RuntimeError::Io(e)),
        }
    }
}

#[cfg(test)]
#[path = "pull_tests.rs"]
mod tests;
