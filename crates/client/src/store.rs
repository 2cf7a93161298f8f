// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State store client: CRUD over nodes with compare-and-swap updates.

use crate::error::ClientError;
use crate::query::NodeQuery;
use async_trait::async_trait;
use cv_core::{Node, NodeId, NodeSeed, NodeState};
use serde::Deserialize;
use std::time::Duration;

/// The shared REST state store.
///
/// Every state transition in the pipeline is a write here; the store
/// linearizes them via the `expect` precondition on [`NodeStore::update`].
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn get(&self, id: NodeId) -> Result<Node, ClientError>;

    async fn find(&self, query: &NodeQuery) -> Result<Vec<Node>, ClientError>;

    async fn create(&self, seed: NodeSeed) -> Result<Node, ClientError>;

    /// Write back a mutated node. When `expect` is set the write only
    /// succeeds if the stored state still equals it; a losing writer gets
    /// [`ClientError::Conflict`], re-reads, and reconciles.
    async fn update(&self, node: &Node, expect: Option<NodeState>) -> Result<Node, ClientError>;
}

/// REST implementation over `GET/POST/PATCH /nodes[/{id}]`.
pub struct HttpNodeStore {
    base: String,
    token: Option<String>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct Page {
    items: Vec<Node>,
}

impl HttpNodeStore {
    pub fn new(
        base: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base: base.into().trim_end_matches('/').to_string(), token, http })
    }

    fn authed(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    async fn expect_ok(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status { status: status.as_u16(), body })
    }
}

#[async_trait]
impl NodeStore for HttpNodeStore {
    async fn get(&self, id: NodeId) -> Result<Node, ClientError> {
        let url = format!("{}/nodes/{}", self.base, id);
        let response = self.authed(self.http.get(&url)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(id));
        }
        Ok(Self::expect_ok(response).await?.json().await?)
    }

    async fn find(&self, query: &NodeQuery) -> Result<Vec<Node>, ClientError> {
        let url = format!("{}/nodes", self.base);
        let mut request = self.authed(self.http.get(&url)).query(query.params());
        if let Some(limit) = query.limit_value() {
            request = request.query(&[("limit", limit.to_string())]);
        }
        let page: Page = Self::expect_ok(request.send().await?).await?.json().await?;
        Ok(page.items)
    }

    async fn create(&self, seed: NodeSeed) -> Result<Node, ClientError> {
        let url = format!("{}/nodes", self.base);
        let response = self.authed(self.http.post(&url)).json(&seed).send().await?;
        Ok(Self::expect_ok(response).await?.json().await?)
    }

    async fn update(&self, node: &Node, expect: Option<NodeState>) -> Result<Node, ClientError> {
        let url = format!("{}/nodes/{}", self.base, node.id);
        let mut request = self.authed(self.http.patch(&url)).json(node);
        if let Some(state) = expect {
            request = request.header("If-Match", state.to_string());
        }
        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::PRECONDITION_FAILED {
            return Err(ClientError::Conflict(node.id));
        }
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(node.id));
        }
        Ok(Self::expect_ok(response).await?.json().await?)
    }
}
