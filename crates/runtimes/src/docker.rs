// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker runtime: the shell runtime inside a named image.
//!
//! The rendered script is piped to `docker run --rm -i {image} sh -s` so no
//! volume mount is needed.

use crate::adapter::{JobOutcome, JobStatus, RenderedJob, RuntimeAdapter, RuntimeError, SubmitHandle};
use async_trait::async_trait;
use cv_core::{Node, NodeResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct DockerJob {
    status: JobStatus,
    cancel: CancellationToken,
}

pub struct DockerRuntime {
    name: String,
    /// Default image; a job's own image wins
    image: Option<String>,
    workdir: PathBuf,
    jobs: Arc<Mutex<HashMap<String, DockerJob>>>,
}

impl DockerRuntime {
    pub fn new(name: impl Into<String>, image: Option<String>) -> Self {
        let name = name.into();
        let workdir = std::env::temp_dir().join("cv-docker").join(&name);
        Self { name, image, workdir, jobs: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn log_path(&self, external_id: &str) -> PathBuf {
        self.workdir.join(format!("{external_id}.log"))
    }

    fn finish(jobs: &Mutex<HashMap<String, DockerJob>>, id: &str, outcome: JobOutcome) {
        if let Some(job) = jobs.lock().get_mut(id) {
            job.status = JobStatus::Done(outcome);
        }
    }
}

#[async_trait]
impl RuntimeAdapter for DockerRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, job: &RenderedJob, node: &Node) -> Result<SubmitHandle, RuntimeError> {
        let image = job
            .image
            .clone()
            .or_else(|| self.image.clone())
            .ok_or_else(|| RuntimeError::Submit {
                runtime: self.name.clone(),
                reason: format!("no image for job {}", job.name),
            })?;

        tokio::fs::create_dir_all(&self.workdir).await?;
        let external_id = format!("{}-{}", job.name, uuid::Uuid::new_v4().simple());
        let log_path = self.log_path(&external_id);

        let log = std::fs::File::create(&log_path)?;
        let log_err = log.try_clone()?;
        let mut child = tokio::process::Command::new("docker")
            .args(["run", "--rm", "-i", "--name", &external_id, &image, "sh", "-s"])
            .stdin(Stdio::piped())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| RuntimeError::Submit {
                runtime: self.name.clone(),
                reason: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(job.content.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        debug!(runtime = %self.name, node_id = %node.id, image = %image, job = %external_id,
            "started container job");

        let cancel = CancellationToken::new();
        self.jobs.lock().insert(
            external_id.clone(),
            DockerJob { status: JobStatus::Running, cancel: cancel.clone() },
        );

        let jobs = Arc::clone(&self.jobs);
        let id = external_id.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let outcome = match status {
                        Ok(status) => match status.code() {
                            Some(0) => JobOutcome {
                                result: Some(NodeResult::Pass),
                                log: Some(log_path),
                                ..Default::default()
                            },
                            Some(code) => JobOutcome {
                                result: Some(NodeResult::Fail),
                                error_msg: Some(format!("exit code {code}")),
                                log: Some(log_path),
                                ..Default::default()
                            },
                            None => JobOutcome {
                                result: Some(NodeResult::Incomplete),
                                error_code: Some("killed".to_string()),
                                log: Some(log_path),
                                ..Default::default()
                            },
                        },
                        Err(e) => {
                            warn!(job = %id, error = %e, "wait failed");
                            JobOutcome {
                                result: Some(NodeResult::Incomplete),
                                error_code: Some("wait_failed".to_string()),
                                error_msg: Some(e.to_string()),
                                log: Some(log_path),
                            }
                        }
                    };
                    Self::finish(&jobs, &id, outcome);
                }
                _ = cancel.cancelled() => {
                    let _ = tokio::process::Command::new("docker")
                        .args(["kill", &id])
                        .output()
                        .await;
                    let _ = child.kill().await;
                    Self::finish(&jobs, &id, JobOutcome {
                        result: Some(NodeResult::Incomplete),
                        error_code: Some("canceled".to_string()),
                        log: Some(log_path),
                        ..Default::default()
                    });
                }
            }
        });

        Ok(SubmitHandle { runtime: self.name.clone(), external_id })
    }

    async fn poll(&self, handle: &SubmitHandle) -> Result<JobStatus, RuntimeError> {
        self.jobs
            .lock()
            .get(&handle.external_id)
            .map(|j| j.status.clone())
            .ok_or_else(|| RuntimeError::UnknownHandle(handle.external_id.clone()))
    }

    async fn cancel(&self, handle: &SubmitHandle) -> Result<(), RuntimeError> {
        let jobs = self.jobs.lock();
        let job = jobs
            .get(&handle.external_id)
            .ok_or_else(|| RuntimeError::UnknownHandle(handle.external_id.clone()))?;
        job.cancel.cancel();
        Ok(())
    }
}
