// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blob store client: content-addressed artifact upload.

use crate::error::ClientError;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Artifact storage yielding public URLs.
///
/// Uploads are content-addressed and idempotent on the server side, so
/// retrying a failed upload is always safe.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, name: &str, path: &Path) -> Result<String, ClientError>;

    async fn upload_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<String, ClientError>;
}

pub struct HttpBlobStore {
    base: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HttpBlobStore {
    /// Uploads can be multi-gigabyte tarballs; `timeout` here applies to the
    /// whole transfer, so it is much larger than the store call timeout.
    pub fn new(
        base: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base: base.into().trim_end_matches('/').to_string(), token, http })
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, name: &str, path: &Path) -> Result<String, ClientError> {
        let bytes = tokio::fs::read(path).await?;
        self.upload_bytes(name, bytes).await
    }

    async fn upload_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<String, ClientError> {
        let url = format!("{}/{}", self.base, name);
        let mut request = self.http.put(&url).body(bytes);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status: status.as_u16(), body });
        }
        // the store answers with the public URL; fall back to the upload URL
        let body = response.text().await.unwrap_or_default();
        let public = body.trim();
        Ok(if public.is_empty() { url } else { public.to_string() })
    }
}
