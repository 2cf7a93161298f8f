// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kubernetes runtime: one pod per job.

use crate::adapter::{JobOutcome, JobStatus, RenderedJob, RuntimeAdapter, RuntimeError, SubmitHandle};
use async_trait::async_trait;
use cv_core::{Node, NodeResult};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use kube::api::{Api, DeleteParams, LogParams, PostParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use std::path::PathBuf;
use tracing::debug;

/// Parameters for building a job pod.
pub(crate) struct PodParams<'a> {
    pub pod_name: &'a str,
    pub image: &'a str,
    pub namespace: &'a str,
    pub script: &'a str,
    pub node_id: &'a str,
}

/// Build the Pod spec for a job: a single `sh -c` container, never restarted,
/// labelled so the pipeline can find its pods again.
pub(crate) fn build_pod(params: &PodParams<'_>) -> Pod {
    let container = Container {
        name: "job".to_string(),
        image: Some(params.image.to_string()),
        command: Some(vec!["sh".to_string(), "-c".to_string()]),
        args: Some(vec![params.script.to_string()]),
        ..Default::default()
    };

    Pod {
        metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
            name: Some(params.pod_name.to_string()),
            namespace: Some(params.namespace.to_string()),
            labels: Some(
                [
                    ("app".to_string(), "cv-job".to_string()),
                    ("cv.dev/node-id".to_string(), params.node_id.to_string()),
                ]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![container],
            restart_policy: Some("Never".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Map a pod's phase and first-container exit to a job status.
///
/// A `Failed` pod whose container never exited (image pull failure, eviction)
/// produced no verdict and counts as incomplete, not fail.
pub(crate) fn classify(phase: Option<&str>, exit_code: Option<i32>) -> JobStatus {
    match phase {
        Some("Pending") => JobStatus::Queued,
        Some("Running") | None => JobStatus::Running,
        Some("Succeeded") => JobStatus::Done(JobOutcome::passed()),
        Some("Failed") => match exit_code {
            Some(code) if code != 0 => JobStatus::Done(JobOutcome {
                result: Some(NodeResult::Fail),
                error_msg: Some(format!("exit code {code}")),
                ..Default::default()
            }),
            _ => JobStatus::Done(JobOutcome {
                result: Some(NodeResult::Incomplete),
                error_code: Some("infrastructure".to_string()),
                error_msg: Some("pod failed without container exit".to_string()),
                ..Default::default()
            }),
        },
        Some(other) => JobStatus::Done(JobOutcome {
            result: Some(NodeResult::Incomplete),
            error_code: Some("infrastructure".to_string()),
            error_msg: Some(format!("unexpected pod phase {other}")),
            ..Default::default()
        }),
    }
}

pub struct KubernetesRuntime {
    name: String,
    namespace: String,
    pods: Api<Pod>,
    workdir: PathBuf,
}

impl KubernetesRuntime {
    pub async fn connect(
        name: impl Into<String>,
        context: Option<&str>,
        namespace: &str,
    ) -> Result<Self, RuntimeError> {
        let client = match context {
            Some(context) => {
                let options =
                    KubeConfigOptions { context: Some(context.to_string()), ..Default::default() };
                let config = Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| RuntimeError::KubeConfig(e.to_string()))?;
                Client::try_from(config).map_err(Box::new)?
            }
            None => Client::try_default().await.map_err(Box::new)?,
        };
        let name = name.into();
        let workdir = std::env::temp_dir().join("cv-k8s").join(&name);
        Ok(Self {
            pods: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            name,
            workdir,
        })
    }

    async fn fetch_log(&self, external_id: &str) -> Option<PathBuf> {
        let text = self.pods.logs(external_id, &LogParams::default()).await.ok()?;
        let path = self.workdir.join(format!("{external_id}.log"));
        tokio::fs::create_dir_all(&self.workdir).await.ok()?;
        tokio::fs::write(&path, text).await.ok()?;
        Some(path)
    }
}

#[async_trait]
impl RuntimeAdapter for KubernetesRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, job: &RenderedJob, node: &Node) -> Result<SubmitHandle, RuntimeError> {
        let image = job.image.as_deref().ok_or_else(|| RuntimeError::Submit {
            runtime: self.name.clone(),
            reason: format!("no image for job {}", job.name),
        })?;
        // pod names must be DNS labels; the node id suffix keeps them unique
        let pod_name = format!("cv-{}", node.id.suffix().to_lowercase());
        let pod = build_pod(&PodParams {
            pod_name: &pod_name,
            image,
            namespace: &self.namespace,
            script: &job.content,
            node_id: node.id.as_str(),
        });
        self.pods.create(&PostParams::default(), &pod).await.map_err(Box::new)?;
        debug!(runtime = %self.name, node_id = %node.id, pod = %pod_name, "created job pod");
        Ok(SubmitHandle { runtime: self.name.clone(), external_id: pod_name })
    }

    async fn poll(&self, handle: &SubmitHandle) -> Result<JobStatus, RuntimeError> {
        let pod = self.pods.get(&handle.external_id).await.map_err(Box::new)?;
        let status = pod.status.as_ref();
        let phase = status.and_then(|s| s.phase.as_deref());
        let exit_code = status
            .and_then(|s| s.container_statuses.as_ref())
            .and_then(|cs| cs.first())
            .and_then(|c| c.state.as_ref())
            .and_then(|s| s.terminated.as_ref())
            .map(|t| t.exit_code);

        let mut classified = classify(phase, exit_code);
        if let JobStatus::Done(ref mut outcome) = classified {
            outcome.log = self.fetch_log(&handle.external_id).await;
        }
        Ok(classified)
    }

    async fn cancel(&self, handle: &SubmitHandle) -> Result<(), RuntimeError> {
        self.pods
            .delete(&handle.external_id, &DeleteParams::default())
            .await
            .map_err(Box::new)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "k8s_tests.rs"]
mod tests;
