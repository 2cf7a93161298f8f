// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LAVA lab runtime.
//!
//! Submission posts a YAML job definition carrying a callback stanza: the
//! ingestor URL plus the *description* of the callback token. The lab resolves
//! the description to the secret value on its side and presents that value in
//! the `Authorization` header of the callback; completion is never polled.

use crate::adapter::{
    JobStatus, LabReport, RenderedJob, RuntimeAdapter, RuntimeError, SubmitHandle, TestCase,
    TestGroup,
};
use async_trait::async_trait;
use cv_core::{aggregate, Node, NodeResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// The LAVA-internal suite holding boot/deploy steps; surfaced under the
/// conventional `setup` name so its failure downgrades the parent to
/// incomplete instead of fail.
const LAVA_SUITE: &str = "lava";

pub struct LavaRuntime {
    name: String,
    base: String,
    token: Option<String>,
    callback_url: Option<String>,
    callback_description: Option<String>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    job_ids: Vec<u64>,
    #[serde(default)]
    id: Option<u64>,
}

impl LavaRuntime {
    pub fn new(
        name: impl Into<String>,
        base: impl Into<String>,
        token: Option<String>,
        callback_url: Option<String>,
        callback_description: Option<String>,
    ) -> Result<Self, RuntimeError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            name: name.into(),
            base: base.into().trim_end_matches('/').to_string(),
            token,
            callback_url,
            callback_description,
            http,
        })
    }

    /// Insert the callback stanza into a rendered YAML job definition.
    fn with_callback(&self, definition: &str) -> Result<String, RuntimeError> {
        let (Some(url), Some(description)) = (&self.callback_url, &self.callback_description)
        else {
            return Ok(definition.to_string());
        };
        let mut doc: serde_yaml::Value = serde_yaml::from_str(definition)
            .map_err(|e| RuntimeError::Render(format!("invalid LAVA definition: {e}")))?;
        let callback = serde_yaml::to_value(BTreeMap::from([
            ("url", url.clone()),
            ("method", "POST".to_string()),
            ("token", description.clone()),
            ("dataset", "results".to_string()),
            ("content-type", "json".to_string()),
        ]))
        .map_err(|e| RuntimeError::Render(e.to_string()))?;
        let notify = serde_yaml::to_value(BTreeMap::from([(
            "callbacks".to_string(),
            serde_yaml::Value::Sequence(vec![callback]),
        )]))
        .map_err(|e| RuntimeError::Render(e.to_string()))?;
        if let serde_yaml::Value::Mapping(ref mut map) = doc {
            map.insert(serde_yaml::Value::String("notify".to_string()), notify);
        }
        serde_yaml::to_string(&doc).map_err(|e| RuntimeError::Render(e.to_string()))
    }
}

#[async_trait]
impl RuntimeAdapter for LavaRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, job: &RenderedJob, node: &Node) -> Result<SubmitHandle, RuntimeError> {
        let definition = self.with_callback(&job.content)?;
        let url = format!("{}/api/v0.2/jobs/", self.base);
        let mut request =
            self.http.post(&url).json(&serde_json::json!({ "definition": definition }));
        if let Some(ref token) = self.token {
            request = request.header("Authorization", format!("Token {token}"));
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RuntimeError::Submit {
                runtime: self.name.clone(),
                reason: format!("{status}: {body}"),
            });
        }
        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| RuntimeError::Submit { runtime: self.name.clone(), reason: e.to_string() })?;
        let external_id = parsed
            .job_ids
            .first()
            .copied()
            .or(parsed.id)
            .ok_or_else(|| RuntimeError::Submit {
                runtime: self.name.clone(),
                reason: "no job id in response".to_string(),
            })?
            .to_string();
        debug!(runtime = %self.name, node_id = %node.id, lava_job = %external_id, "submitted LAVA job");
        Ok(SubmitHandle { runtime: self.name.clone(), external_id })
    }

    async fn poll(&self, _handle: &SubmitHandle) -> Result<JobStatus, RuntimeError> {
        // completion is delivered through the callback ingestor
        Ok(JobStatus::Running)
    }

    async fn cancel(&self, handle: &SubmitHandle) -> Result<(), RuntimeError> {
        let url = format!("{}/api/v0.2/jobs/{}/cancel/", self.base, handle.external_id);
        let mut request = self.http.post(&url);
        if let Some(ref token) = self.token {
            request = request.header("Authorization", format!("Token {token}"));
        }
        request.send().await?.error_for_status().map_err(RuntimeError::Transport)?;
        Ok(())
    }

    /// Accepted payload shape (one callback per finished job):
    ///
    /// ```json
    /// {
    ///   "id": 4021,
    ///   "status_string": "complete",
    ///   "error_type": null,
    ///   "error_msg": null,
    ///   "results": { "login": [ {"name": "login-prompt", "result": "pass"} ] },
    ///   "log_url": "https://lava.example/jobs/4021/log"
    /// }
    /// ```
    fn parse_results(&self, payload: &serde_json::Value) -> Result<LabReport, RuntimeError> {
        let job_id = payload
            .get("id")
            .map(value_to_string)
            .ok_or_else(|| RuntimeError::Payload("missing job id".to_string()))?;

        let error_code = payload
            .get("error_type")
            .filter(|v| !v.is_null())
            .map(value_to_string);
        let error_msg = payload
            .get("error_msg")
            .filter(|v| !v.is_null())
            .map(value_to_string);

        let mut groups = Vec::new();
        if let Some(results) = payload.get("results").and_then(|r| r.as_object()) {
            for (suite, cases) in results {
                // the lab may double-encode suites as JSON strings
                let cases: Vec<serde_json::Value> = match cases {
                    serde_json::Value::String(raw) => serde_json::from_str(raw)
                        .map_err(|e| RuntimeError::Payload(format!("suite {suite}: {e}")))?,
                    serde_json::Value::Array(items) => items.clone(),
                    other => {
                        return Err(RuntimeError::Payload(format!(
                            "suite {suite} has unexpected shape: {other}"
                        )))
                    }
                };
                let name = if suite == LAVA_SUITE { "setup" } else { suite.as_str() };
                let tests: Vec<TestCase> = cases
                    .iter()
                    .map(|case| {
                        let case_name = case
                            .get("name")
                            .and_then(|n| n.as_str())
                            .unwrap_or("unnamed")
                            .to_string();
                        TestCase {
                            name: case_name,
                            result: parse_result(case.get("result")),
                            log_url: case
                                .get("log_url")
                                .and_then(|u| u.as_str())
                                .map(str::to_string),
                        }
                    })
                    .collect();
                let result =
                    aggregate(tests.iter().map(|t| (t.name.as_str(), t.result)));
                groups.push(TestGroup { name: name.to_string(), result, tests });
            }
        }

        // a job that never completed has no verdict; a completed job with a
        // tool error failed, and the error_code keeps it out of regression
        // detection
        let status = payload.get("status_string").and_then(|s| s.as_str()).unwrap_or("");
        let result = if status != "complete" {
            NodeResult::Incomplete
        } else if error_code.is_some() {
            NodeResult::Fail
        } else {
            aggregate(groups.iter().map(|g| (g.name.as_str(), g.result)))
        };

        let mut artifacts = BTreeMap::new();
        if let Some(log_url) = payload.get("log_url").and_then(|u| u.as_str()) {
            artifacts.insert("lava_log".to_string(), log_url.to_string());
        }

        Ok(LabReport { job_id, result, error_code, error_msg, groups, artifacts })
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_result(value: Option<&serde_json::Value>) -> NodeResult {
    match value.and_then(|v| v.as_str()) {
        Some("pass") => NodeResult::Pass,
        Some("fail") => NodeResult::Fail,
        Some("skip") => NodeResult::Skip,
        _ => NodeResult::Incomplete,
    }
}

#[cfg(test)]
#[path = "lava_tests.rs"]
mod tests;
