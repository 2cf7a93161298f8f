// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Callback ingestor: the authenticated HTTP sink for asynchronous lab
//! results, plus the user-facing API routes.

use crate::api::{ApiError, CheckoutRequest, JobRetryRequest, PatchsetRequest, UserApi};
use crate::auth::strip_scheme;
use crate::error::PipelineError;
use crate::Store;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use cv_catalog::{Secrets, Settings};
use cv_client::{ClientError, NodeQuery};
use cv_core::{Clock, Node, NodeId, NodeKind, NodeResult, NodeSeed, NodeState, SystemClock};
use cv_runtimes::{LabReport, RuntimeAdapter, TestGroup};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum IngestError {
    Unauthorized,
    BadPayload(String),
    UnknownJob(String),
    Internal(PipelineError),
}

impl From<ClientError> for IngestError {
    fn from(e: ClientError) -> Self {
        IngestError::Internal(e.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First delivery: children created, node transitioned
    Updated(NodeId),
    /// Re-delivery after the node finished; no side effects
    AlreadyComplete(NodeId),
}

impl IngestOutcome {
    pub fn node_id(self) -> NodeId {
        match self {
            IngestOutcome::Updated(id) | IngestOutcome::AlreadyComplete(id) => id,
        }
    }
}

pub struct Ingestor<C: Clock = SystemClock> {
    store: Store,
    settings: Arc<Settings>,
    secrets: Arc<Secrets>,
    adapters: HashMap<String, Arc<dyn RuntimeAdapter>>,
    clock: C,
}

impl<C: Clock> Ingestor<C> {
    pub fn new(store: Store, settings: Arc<Settings>, secrets: Arc<Secrets>, clock: C) -> Self {
        Self { store, settings, secrets, adapters: HashMap::new(), clock }
    }

    /// Register the adapter used to parse this runtime's payloads. Without
    /// one, the canonical report shape is expected.
    pub fn register_adapter(&mut self, name: &str, adapter: Arc<dyn RuntimeAdapter>) {
        self.adapters.insert(name.to_string(), adapter);
    }

    /// Handle one callback delivery for `runtime`.
    pub async fn ingest(
        &self,
        runtime: &str,
        authorization: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<IngestOutcome, IngestError> {
        // shared secret → runtime name; both the mapping and the path
        // segment must agree
        let presented = authorization.map(strip_scheme).unwrap_or("");
        let Some(owner) = self.secrets.runtime_for_callback(presented) else {
            return Err(IngestError::Unauthorized);
        };
        if owner != runtime {
            return Err(IngestError::Unauthorized);
        }

        let report = match self.adapters.get(runtime) {
            Some(adapter) => adapter.parse_results(payload),
            None => serde_json::from_value::<LabReport>(payload.clone())
                .map_err(|e| cv_runtimes::RuntimeError::Payload(e.to_string())),
        }
        .map_err(|e| IngestError::BadPayload(e.to_string()))?;

        // the external job id recorded at submission is the idempotency key
        let candidates = self
            .store
            .find(
                &NodeQuery::new()
                    .field("data.runtime_job_id", &report.job_id)
                    .field("data.runtime", runtime),
            )
            .await?;
        let Some(node) = candidates.into_iter().next() else {
            return Err(IngestError::UnknownJob(report.job_id));
        };

        if node.is_terminal() {
            debug!(node_id = %node.id, "callback re-delivered for finished node");
            return Ok(IngestOutcome::AlreadyComplete(node.id));
        }

        let first_delivery = node.state == NodeState::Running;
        if first_delivery {
            for group in &report.groups {
                self.create_group(&node, group).await?;
            }
        }

        let mut updated = node.clone();
        for (name, url) in &report.artifacts {
            updated.artifacts.insert(name.clone(), url.clone());
        }
        updated.data.error_code = report.error_code.clone();
        updated.data.error_msg = report.error_msg.clone();

        let spawns_children =
            matches!(node.kind, NodeKind::Kbuild | NodeKind::Job | NodeKind::Process);
        let transition = if !first_delivery {
            // repeated payload for an available/closing node: artifacts and
            // error details update in place, the lifecycle does not move
            Some(node.state)
        } else if spawns_children && report.result == NodeResult::Pass {
            // stays open for scheduled children during the holdoff window
            updated.result = Some(report.result);
            if updated.advance(NodeState::Available).is_ok() {
                updated.holdoff = Some(self.clock.now() + self.settings.holdoff());
                Some(NodeState::Running)
            } else {
                None
            }
        } else {
            updated.finish(report.result).ok().map(|_| node.state)
        };

        let Some(expect) = transition else {
            return Ok(IngestOutcome::AlreadyComplete(node.id));
        };
        match self.store.update(&updated, Some(expect)).await {
            Ok(_) => {
                info!(node_id = %node.id, runtime, result = %report.result, "callback ingested");
                Ok(IngestOutcome::Updated(node.id))
            }
            Err(ClientError::Conflict(_)) => Ok(IngestOutcome::AlreadyComplete(node.id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the reported suite and its cases under `parent`, preserving
    /// hierarchy. Skipped entirely when the suite already exists.
    async fn create_group(&self, parent: &Node, group: &TestGroup) -> Result<(), IngestError> {
        let existing =
            self.store.find(&NodeQuery::new().parent(parent.id).name(&group.name)).await?;
        if !existing.is_empty() {
            return Ok(());
        }

        let mut seed = NodeSeed::child_of(parent, NodeKind::Job, &group.name);
        seed.group = Some(group.name.clone());
        let suite = self.store.create(seed).await?;

        for case in &group.tests {
            let mut case_seed = NodeSeed::child_of(&suite, NodeKind::Test, &case.name);
            case_seed.group = Some(group.name.clone());
            case_seed.state = NodeState::Done;
            case_seed.result = Some(case.result);
            if let Some(ref url) = case.log_url {
                case_seed.artifacts.insert("log".to_string(), url.clone());
            }
            self.store.create(case_seed).await?;
        }

        let mut done = suite;
        if done.finish(group.result).is_ok() {
            match self.store.update(&done, Some(NodeState::Running)).await {
                Ok(_) | Err(ClientError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Axum state shared by the callback and API routes.
pub struct AppState<C: Clock = SystemClock> {
    pub ingestor: Arc<Ingestor<C>>,
    pub api: Arc<UserApi<C>>,
}

impl<C: Clock> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self { ingestor: Arc::clone(&self.ingestor), api: Arc::clone(&self.api) }
    }
}

pub fn router<C: Clock>(state: AppState<C>) -> Router {
    Router::new()
        .route("/callback/{runtime}", post(callback_handler::<C>))
        .route("/api/checkout", post(api_checkout::<C>))
        .route("/api/jobretry", post(api_jobretry::<C>))
        .route("/api/patchset", post(api_patchset::<C>))
        .with_state(state)
}

/// Serve the router until shutdown, draining in-flight requests.
pub async fn serve(
    router: Router,
    listen: &str,
    shutdown: CancellationToken,
) -> Result<(), PipelineError> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(listen, "callback ingestor listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok())
}

async fn callback_handler<C: Clock>(
    State(state): State<AppState<C>>,
    Path(runtime): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    match state.ingestor.ingest(&runtime, bearer(&headers), &payload).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({ "node": outcome.node_id() })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn api_checkout<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> Response {
    match state.api.checkout(bearer(&headers), request).await {
        Ok(node) => (StatusCode::OK, Json(serde_json::json!({ "node": node.id }))).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn api_jobretry<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Json(request): Json<JobRetryRequest>,
) -> Response {
    match state.api.jobretry(bearer(&headers), request).await {
        Ok(node) => (StatusCode::OK, Json(serde_json::json!({ "node": node.id }))).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn api_patchset<C: Clock>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Json(request): Json<PatchsetRequest>,
) -> Response {
    match state.api.patchset(bearer(&headers), request).await {
        Ok(node) => (StatusCode::OK, Json(serde_json::json!({ "node": node.id }))).into_response(),
        Err(e) => e.into_response(),
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            IngestError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            IngestError::BadPayload(m) => (StatusCode::BAD_REQUEST, m),
            IngestError::UnknownJob(id) => {
                (StatusCode::NOT_FOUND, format!("no node for job {id}"))
            }
            IngestError::Internal(e) => {
                warn!(error = %e, "callback ingest failed internally");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Internal(e) => {
                warn!(error = %e, "api request failed internally");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
