// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shell runtime: fork a local process and capture its output.

use crate::adapter::{JobOutcome, JobStatus, RenderedJob, RuntimeAdapter, RuntimeError, SubmitHandle};
use async_trait::async_trait;
use cv_core::{Node, NodeResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct ShellJob {
    status: JobStatus,
    cancel: CancellationToken,
}

/// Runs jobs as local `sh` processes, streaming stdout+stderr to a log file
/// next to the script.
pub struct ShellRuntime {
    name: String,
    workdir: PathBuf,
    jobs: Arc<Mutex<HashMap<String, ShellJob>>>,
}

impl ShellRuntime {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let workdir = std::env::temp_dir().join("cv-shell").join(&name);
        Self::with_workdir(name, workdir)
    }

    pub fn with_workdir(name: impl Into<String>, workdir: PathBuf) -> Self {
        Self { name: name.into(), workdir, jobs: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Log file for a submitted job.
    pub fn log_path(&self, external_id: &str) -> PathBuf {
        self.workdir.join(format!("{external_id}.log"))
    }

    fn finish(jobs: &Mutex<HashMap<String, ShellJob>>, id: &str, outcome: JobOutcome) {
        if let Some(job) = jobs.lock().get_mut(id) {
            job.status = JobStatus::Done(outcome);
        }
    }
}

/// Map a process exit to a job outcome: clean exit is pass, nonzero is fail,
/// death by signal never produced a verdict.
fn outcome_from_exit(status: std::process::ExitStatus, log: PathBuf) -> JobOutcome {
    match status.code() {
        Some(0) => JobOutcome { result: Some(NodeResult::Pass), log: Some(log), ..Default::default() },
        Some(code) => JobOutcome {
            result: Some(NodeResult::Fail),
            error_msg: Some(format!("exit code {code}")),
            log: Some(log),
            ..Default::default()
        },
        None => JobOutcome {
            result: Some(NodeResult::Incomplete),
            error_code: Some("killed".to_string()),
            log: Some(log),
            ..Default::default()
        },
    }
}

#[async_trait]
impl RuntimeAdapter for ShellRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, job: &RenderedJob, node: &Node) -> Result<SubmitHandle, RuntimeError> {
        tokio::fs::create_dir_all(&self.workdir).await?;
        let external_id = format!("{}-{}", job.name, uuid::Uuid::new_v4().simple());
        let script = self.workdir.join(format!("{external_id}.sh"));
        let log_path = self.log_path(&external_id);
        tokio::fs::write(&script, &job.content).await?;

        let log = std::fs::File::create(&log_path)?;
        let log_err = log.try_clone()?;
        let mut child = tokio::process::Command::new("sh")
            .arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| RuntimeError::Submit {
                runtime: self.name.clone(),
                reason: e.to_string(),
            })?;

        debug!(runtime = %self.name, node_id = %node.id, job = %external_id, "forked shell job");

        let cancel = CancellationToken::new();
        self.jobs.lock().insert(
            external_id.clone(),
            ShellJob { status: JobStatus::Running, cancel: cancel.clone() },
        );

        let jobs = Arc::clone(&self.jobs);
        let id = external_id.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let outcome = match status {
                        Ok(status) => outcome_from_exit(status, log_path),
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

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
