// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable runtime fake for scheduler and dispatch tests.

use crate::adapter::{JobStatus, RenderedJob, RuntimeAdapter, RuntimeError, SubmitHandle};
use async_trait::async_trait;
use cv_core::{Node, NodeId};
use parking_lot::Mutex;
use std::collections::HashMap;

pub struct FakeRuntime {
    name: String,
    submissions: Mutex<Vec<(RenderedJob, NodeId)>>,
    statuses: Mutex<HashMap<String, JobStatus>>,
    fail_submissions: Mutex<bool>,
    cancelled: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            submissions: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            fail_submissions: Mutex::new(false),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    /// Make every subsequent submit fail.
    pub fn fail_submissions(&self, fail: bool) {
        *self.fail_submissions.lock() = fail;
    }

    /// Script the status reported for a submitted job.
    pub fn set_status(&self, external_id: &str, status: JobStatus) {
        self.statuses.lock().insert(external_id.to_string(), status);
    }

    pub fn submissions(&self) -> Vec<(RenderedJob, NodeId)> {
        self.submissions.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().clone()
    }
}

#[async_trait]
impl RuntimeAdapter for FakeRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, job: &RenderedJob, node: &Node) -> Result<SubmitHandle, RuntimeError> {
        if *self.fail_submissions.lock() {
            return Err(RuntimeError::Submit {
                runtime: self.name.clone(),
                reason: "scripted failure".to_string(),
            });
        }
        self.submissions.lock().push((job.clone(), node.id));
        let external_id = format!("fake-{}", node.id.suffix());
        self.statuses.lock().insert(external_id.clone(), JobStatus::Running);
        Ok(SubmitHandle { runtime: self.name.clone(), external_id })
    }

    async fn poll(&self, handle: &SubmitHandle) -> Result<JobStatus, RuntimeError> {
        self.statuses
            .lock()
            .get(&handle.external_id)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownHandle(handle.external_id.clone()))
    }

    async fn cancel(&self, handle: &SubmitHandle) -> Result<(), RuntimeError> {
        self.cancelled.lock().push(handle.external_id.clone());
        Ok(())
    }
}
