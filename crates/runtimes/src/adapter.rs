// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The runtime capability trait and its shared types.

use async_trait::async_trait;
use cv_catalog::{CallbackSettings, RuntimeDef, RuntimeKindDef, RuntimeSecret};
use cv_core::{Node, NodeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("template rendering failed: {0}")]
    Render(String),

    #[error("submission to {runtime} failed: {reason}")]
    Submit { runtime: String, reason: String },

    #[error("runtime transport error")]
    Transport(#[from] reqwest::Error),

    #[error("kubernetes error")]
    Kube(#[from] Box<kube::Error>),

    #[error("kubernetes config error: {0}")]
    KubeConfig(String),

    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("unknown job handle {0}")]
    UnknownHandle(String),

    #[error("malformed lab payload: {0}")]
    Payload(String),

    #[error("{0} does not support this operation")]
    Unsupported(String),
}

/// A job description already rendered for a specific runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedJob {
    /// Job name; becomes the external job's label where the backend has one
    pub name: String,
    /// The rendered body (shell script, pod command, LAVA YAML, …)
    pub content: String,
    /// Container image for backends that need one
    pub image: Option<String>,
}

/// Reference to a submitted external job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitHandle {
    pub runtime: String,
    /// Backend-assigned id, recorded in the node's `runtime_job_id`
    pub external_id: String,
}

/// Polled status of an external job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Queued,
    Running,
    Done(JobOutcome),
}

/// Terminal outcome of an external job.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobOutcome {
    pub result: Option<NodeResult>,
    /// Tool/infrastructure error, distinct from a test failure
    pub error_code: Option<String>,
    pub error_msg: Option<String>,
    /// Captured log on local disk, ready for artifact upload
    pub log: Option<PathBuf>,
}

impl JobOutcome {
    pub fn passed() -> Self {
        Self { result: Some(NodeResult::Pass), ..Default::default() }
    }

    pub fn failed() -> Self {
        Self { result: Some(NodeResult::Fail), ..Default::default() }
    }
}

/// Structured results delivered by a lab callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabReport {
    pub job_id: String,
    pub result: NodeResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<TestGroup>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, String>,
}

/// One test suite in a lab report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestGroup {
    pub name: String,
    pub result: NodeResult,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<TestCase>,
}

/// One test case in a suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub result: NodeResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_url: Option<String>,
}

/// The capability set every runtime backend implements.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Submit a rendered job on behalf of `node`.
    async fn submit(&self, job: &RenderedJob, node: &Node) -> Result<SubmitHandle, RuntimeError>;

    /// Current status. Callback-driven backends report `Running` forever;
    /// their completion arrives through the callback ingestor instead.
    async fn poll(&self, handle: &SubmitHandle) -> Result<JobStatus, RuntimeError>;

    async fn cancel(&self, handle: &SubmitHandle) -> Result<(), RuntimeError>;

    /// Translate this backend's callback payload into a [`LabReport`].
    ///
    /// The default accepts the canonical report shape directly.
    fn parse_results(&self, payload: &serde_json::Value) -> Result<LabReport, RuntimeError> {
        serde_json::from_value(payload.clone()).map_err(|e| RuntimeError::Payload(e.to_string()))
    }
}

/// Build the adapter for a configured runtime.
pub async fn build_adapter(
    name: &str,
    def: &RuntimeDef,
    secret: Option<&RuntimeSecret>,
    callback: &CallbackSettings,
) -> Result<Arc<dyn RuntimeAdapter>, RuntimeError> {
    let adapter: Arc<dyn RuntimeAdapter> = match &def.kind {
        RuntimeKindDef::Shell => Arc::new(crate::shell::ShellRuntime::new(name)),
        RuntimeKindDef::Docker { image } => {
            Arc::new(crate::docker::DockerRuntime::new(name, image.clone()))
        }
        RuntimeKindDef::Kubernetes { context, namespace } => Arc::new(
            crate::k8s::KubernetesRuntime::connect(name, context.as_deref(), namespace).await?,
        ),
        RuntimeKindDef::Lava { url } => Arc::new(crate::lava::LavaRuntime::new(
            name,
            url,
            secret.and_then(|s| s.runtime_token.clone()),
            callback.public_url.as_deref().map(|base| {
                format!("{}/callback/{}", base.trim_end_matches('/'), name)
            }),
            secret
                .and_then(|s| s.callback_token.as_ref())
                .map(|t| t.description.clone()),
        )?),
        RuntimeKindDef::Pull { spool } => {
            Arc::new(crate::pull::PullRuntime::new(name, spool.clone()))
        }
    };
    Ok(adapter)
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
