// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus client.
//!
//! Subscriptions are surfaced as plain `mpsc` receivers; the HTTP
//! implementation long-polls the store's events endpoint and pumps payloads
//! into the channel, reconnecting with backoff on transient failures.

use crate::error::ClientError;
use crate::retry::Backoff;
use async_trait::async_trait;
use cv_core::NodeEvent;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Channel capacity for bus subscriptions. Delivery is per-topic in-order
/// per subscriber; a slow subscriber applies backpressure here.
const SUBSCRIPTION_DEPTH: usize = 256;

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Subscribe to a channel; the subscription lives until the receiver is
    /// dropped.
    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<NodeEvent>, ClientError>;

    async fn publish(&self, channel: &str, event: &NodeEvent) -> Result<(), ClientError>;
}

/// Long-polling implementation over the store's pub/sub endpoints.
pub struct HttpEventBus {
    base: String,
    token: Option<String>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct SubscriptionTicket {
    id: u64,
}

impl HttpEventBus {
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

    async fn open(&self, channel: &str) -> Result<u64, ClientError> {
        let url = format!("{}/subscribe/{}", self.base, channel);
        let response = self.authed(self.http.post(&url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status: status.as_u16(), body });
        }
        let ticket: SubscriptionTicket = response.json().await?;
        Ok(ticket.id)
    }

    /// One long-poll round. `None` means the poll timed out server-side with
    /// nothing to deliver.
    async fn poll(&self, subscription: u64) -> Result<Option<NodeEvent>, ClientError> {
        let url = format!("{}/events/{}", self.base, subscription);
        let response = self.authed(self.http.get(&url)).send().await?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status: status.as_u16(), body });
        }
        Ok(Some(response.json().await?))
    }
}

#[async_trait]
impl EventBus for HttpEventBus {
    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<NodeEvent>, ClientError> {
        let subscription = self.open(channel).await?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_DEPTH);
        let bus = Self {
            base: self.base.clone(),
            token: self.token.clone(),
            http: self.http.clone(),
        };
        let channel = channel.to_string();
        tokio::spawn(async move {
            let mut backoff = Backoff::default_policy();
            loop {
                match bus.poll(subscription).await {
                    Ok(Some(event)) => {
                        backoff.reset();
                        if tx.send(event).await.is_err() {
                            // subscriber gone; let the server reap the
                            // subscription by timeout
                            return;
                        }
                    }
                    Ok(None) => backoff.reset(),
                    Err(e) if e.is_transient() => {
                        warn!(channel = %channel, error = %e, "event poll failed, backing off");
                        tokio::time::sleep(backoff.next_delay()).await;
                    }
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "event subscription lost");
                        return;
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn publish(&self, channel: &str, event: &NodeEvent) -> Result<(), ClientError> {
        let url = format!("{}/publish/{}", self.base, channel);
        let response = self.authed(self.http.post(&url)).json(event).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status: status.as_u16(), body });
        }
        Ok(())
    }
}
