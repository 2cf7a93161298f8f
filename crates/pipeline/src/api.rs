// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-facing API operations: custom checkouts, job retries, patchsets.
//!
//! Every operation issues *new* nodes rather than mutating existing ones,
//! which keeps cancellation and re-delivery idempotent.

use crate::auth::{strip_scheme, UserTokens};
use crate::error::PipelineError;
use crate::retry;
use crate::trigger::{CheckoutOptions, Trigger};
use crate::Store;
use cv_catalog::Settings;
use cv_client::ClientError;
use cv_core::{Clock, Node, NodeId, NodeKind, NodeSeed, SystemClock, MAX_RETRIES};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(PipelineError),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Internal(e)
    }
}

impl From<ClientError> for ApiError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::NotFound(id) => ApiError::NotFound(format!("node {id} not found")),
            other => ApiError::Internal(other.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub nodeid: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    pub commit: String,
    #[serde(default)]
    pub jobfilter: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobRetryRequest {
    pub nodeid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatchsetRequest {
    pub nodeid: String,
    pub patchurl: Vec<String>,
    #[serde(default)]
    pub jobfilter: Option<Vec<String>>,
}

pub struct UserApi<C: Clock = SystemClock> {
    store: Store,
    trigger: Arc<Trigger<C>>,
    settings: Arc<Settings>,
    tokens: Option<UserTokens>,
    clock: C,
}

impl<C: Clock> UserApi<C> {
    pub fn new(
        store: Store,
        trigger: Arc<Trigger<C>>,
        settings: Arc<Settings>,
        tokens: Option<UserTokens>,
        clock: C,
    ) -> Self {
        Self { store, trigger, settings, tokens, clock }
    }

    fn authenticate(&self, authorization: Option<&str>) -> Result<String, ApiError> {
        let tokens = self.tokens.as_ref().ok_or(ApiError::Unauthorized)?;
        let presented = authorization.map(strip_scheme).ok_or(ApiError::Unauthorized)?;
        tokens.verify(presented, self.clock.now()).ok_or(ApiError::Unauthorized)
    }

    /// `POST /api/checkout`: user-initiated checkout bypassing frequency
    /// gates, optionally re-targeting an existing node and carrying a
    /// jobfilter.
    pub async fn checkout(
        &self,
        authorization: Option<&str>,
        request: CheckoutRequest,
    ) -> Result<Node, ApiError> {
        let user = self.authenticate(authorization)?;

        let (tree, branch, parent) = match request.nodeid {
            Some(ref nodeid) => {
                let node = self.store.get(NodeId::from_string(nodeid)).await?;
                let revision = node.revision().ok_or_else(|| {
                    ApiError::BadRequest(format!("node {nodeid} carries no revision"))
                })?;
                let branch = request.branch.clone().unwrap_or_else(|| revision.branch.clone());
                (revision.tree.clone(), branch, Some(node.id))
            }
            None => {
                let url = request
                    .url
                    .as_deref()
                    .ok_or_else(|| ApiError::BadRequest("url or nodeid required".to_string()))?;
                let tree = self
                    .settings
                    .trees
                    .iter()
                    .find(|(_, t)| t.url == url)
                    .map(|(name, _)| name.clone())
                    .ok_or_else(|| {
                        ApiError::BadRequest(format!("no configured tree for url {url}"))
                    })?;
                let branch = request
                    .branch
                    .clone()
                    .ok_or_else(|| ApiError::BadRequest("branch required".to_string()))?;
                (tree, branch, None)
            }
        };

        let options = CheckoutOptions {
            force: true,
            jobfilter: request.jobfilter,
            parent,
            submitter: Some(format!("user:{user}")),
        };
        let created = self
            .trigger
            .create_checkout(&tree, &branch, &request.commit, options)
            .await?
            .ok_or_else(|| ApiError::Conflict("revision already has a checkout".to_string()))?;
        info!(node_id = %created.id, user, "user checkout created");
        Ok(created)
    }

    /// `POST /api/jobretry`: spawn a retry sibling for a finished job node.
    pub async fn jobretry(
        &self,
        authorization: Option<&str>,
        request: JobRetryRequest,
    ) -> Result<Node, ApiError> {
        let user = self.authenticate(authorization)?;

        let node = self.store.get(NodeId::from_string(&request.nodeid)).await?;
        if !matches!(node.kind, NodeKind::Kbuild | NodeKind::Job) {
            return Err(ApiError::BadRequest(format!(
                "node {} is a {}, not a retryable job",
                node.id, node.kind
            )));
        }
        if !node.is_terminal() {
            return Err(ApiError::Conflict(format!("node {} is still open", node.id)));
        }
        if node.data.retry_counter >= MAX_RETRIES {
            return Err(ApiError::Conflict("retry limit reached".to_string()));
        }

        let mut seed = retry::retry_seed(&node);
        seed.submitter = Some(format!("user:{user}"));
        if let (Some(job), Some(runtime)) = (
            self.settings.job(&node.name),
            node.data.runtime.as_deref().and_then(|r| self.settings.runtime(r)),
        ) {
            seed.timeout = Some(self.clock.now() + self.settings.node_timeout(job, runtime));
        }
        let sibling = match self.store.create(seed).await {
            Ok(sibling) => sibling,
            Err(ClientError::Invariant(_)) => {
                return Err(ApiError::Conflict("parent no longer accepts children".to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        info!(node_id = %node.id, sibling = %sibling.id, user, "user retry created");
        Ok(sibling)
    }

    /// `POST /api/patchset`: attach a patchset checkout under an existing
    /// checkout; the patch URLs ride along as artifacts for the build jobs.
    pub async fn patchset(
        &self,
        authorization: Option<&str>,
        request: PatchsetRequest,
    ) -> Result<Node, ApiError> {
        let user = self.authenticate(authorization)?;

        if request.patchurl.is_empty() {
            return Err(ApiError::BadRequest("patchurl must not be empty".to_string()));
        }
        let base = self.store.get(NodeId::from_string(&request.nodeid)).await?;
        if base.kind != NodeKind::Checkout {
            return Err(ApiError::BadRequest(format!("node {} is not a checkout", base.id)));
        }

        let mut seed = NodeSeed::child_of(&base, NodeKind::Checkout, "patchset");
        for (index, url) in request.patchurl.iter().enumerate() {
            seed.artifacts.insert(format!("patch{index}"), url.clone());
        }
        if request.jobfilter.is_some() {
            seed.jobfilter = request.jobfilter;
        }
        seed.submitter = Some(format!("user:{user}"));
        seed.timeout = Some(self.clock.now() + self.settings.checkout_timeout());

        let patchset = match self.store.create(seed).await {
            Ok(patchset) => patchset,
            Err(ClientError::Invariant(_)) => {
                return Err(ApiError::Conflict("checkout no longer accepts children".to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        info!(node_id = %base.id, patchset = %patchset.id, user, "patchset created");
        Ok(patchset)
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
