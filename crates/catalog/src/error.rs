// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog loading and validation errors.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid duration {0:?}, expected [Nd][Nh][Nm]")]
    InvalidDuration(String),

    #[error("invalid rule entry {0:?}")]
    InvalidRule(String),
}
