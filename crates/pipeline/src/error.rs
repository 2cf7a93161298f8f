// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline service errors.
//!
//! Component-level failures are recorded as node state transitions; these
//! errors are operator-facing only and never cross a service boundary.

use cv_catalog::CatalogError;
use cv_client::ClientError;
use cv_runtimes::RuntimeError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("git: {0}")]
    Git(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether a service loop should simply retry later.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Client(e) => e.is_transient(),
            PipelineError::Git(_) => true,
            _ => false,
        }
    }
}
