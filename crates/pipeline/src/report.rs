// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Downstream reporting-sink schema and client.
//!
//! The sink ingests a batched JSON document with `checkouts`, `builds`,
//! `tests`, `issues`, and `incidents` arrays keyed by node id. Delivery is
//! at-least-once; the receiver deduplicates on id.

use crate::auth::hex;
use crate::error::PipelineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cv_client::ClientError;
use cv_core::{Node, NodeKind, NodeResult};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub const ORIGIN: &str = "conveyor";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub origin: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checkouts: Vec<ReportCheckout>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub builds: Vec<ReportBuild>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<ReportTest>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub incidents: Vec<Incident>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportCheckout {
    pub id: String,
    pub origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_repository_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_repository_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_describe: Option<String>,
    pub start_time: DateTime<Utc>,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportBuild {
    pub id: String,
    pub origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTest {
    pub id: String,
    pub origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
    pub path: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub id: String,
    pub origin: String,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    pub id: String,
    pub origin: String,
    pub issue_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    pub present: bool,
}

fn status_of(node: &Node) -> String {
    match node.result {
        Some(NodeResult::Pass) => "PASS",
        Some(NodeResult::Fail) => "FAIL",
        Some(NodeResult::Skip) => "SKIP",
        Some(NodeResult::Incomplete) | None => "MISS",
    }
    .to_string()
}

/// Build the issue entry for one extracted log line.
pub fn issue_for(line: &str) -> Issue {
    let digest = Sha256::digest(line.as_bytes());
    Issue {
        id: format!("{ORIGIN}:{}", &hex(&digest)[..16]),
        origin: ORIGIN.to_string(),
        comment: line.to_string(),
    }
}

/// Link an issue to the node it was observed on.
pub fn incident_for(issue: &Issue, node: &Node) -> Incident {
    Incident {
        id: format!("{}:{}", issue.id, node.id),
        origin: ORIGIN.to_string(),
        issue_id: issue.id.clone(),
        build_id: (node.kind == NodeKind::Kbuild).then(|| node.id.to_string()),
        test_id: (node.kind != NodeKind::Kbuild).then(|| node.id.to_string()),
        present: true,
    }
}

/// Convert one terminal node into the sink document, with any issues and
/// incidents the log analysis produced.
pub fn convert(node: &Node, issues: Vec<Issue>, incidents: Vec<Incident>) -> Report {
    let mut report = Report { origin: ORIGIN.to_string(), issues, incidents, ..Default::default() };
    match node.kind {
        NodeKind::Checkout => {
            let revision = node.revision();
            report.checkouts.push(ReportCheckout {
                id: node.id.to_string(),
                origin: ORIGIN.to_string(),
                tree_name: revision.map(|r| r.tree.clone()),
                git_repository_url: revision.and_then(|r| r.url.clone()),
                git_repository_branch: revision.map(|r| r.branch.clone()),
                git_commit_hash: revision.map(|r| r.commit.clone()),
                git_describe: revision.and_then(|r| r.describe.clone()),
                start_time: node.created,
                valid: node.result == Some(NodeResult::Pass),
            });
        }
        NodeKind::Kbuild => {
            report.builds.push(ReportBuild {
                id: node.id.to_string(),
                origin: ORIGIN.to_string(),
                checkout_id: node.parent.map(|p| p.to_string()),
                architecture: node.data.arch.clone(),
                compiler: node.data.compiler.clone(),
                config_name: node.data.defconfig.clone(),
                start_time: node.created,
                valid: node.result == Some(NodeResult::Pass),
            });
        }
        NodeKind::Job | NodeKind::Test | NodeKind::Process => {
            report.tests.push(ReportTest {
                id: node.id.to_string(),
                origin: ORIGIN.to_string(),
                build_id: node.parent.map(|p| p.to_string()),
                path: node.path.join("."),
                status: status_of(node),
                environment: node.data.platform.clone(),
                start_time: node.created,
            });
        }
        NodeKind::Regression => {}
    }
    report
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn submit(&self, report: &Report) -> Result<(), PipelineError>;
}

/// POSTs report batches to the configured sink endpoint.
pub struct HttpReportSink {
    url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HttpReportSink {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self { url: url.into(), token, http }
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    async fn submit(&self, report: &Report) -> Result<(), PipelineError> {
        let mut request = self.http.post(&self.url).json(report);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(ClientError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status: status.as_u16(), body }.into());
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
