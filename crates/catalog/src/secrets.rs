// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secrets file: runtime tokens, reporting credentials, user-token secret.
//!
//! Deliberately does not implement `Debug` so token values cannot leak
//! through logging.

use crate::error::CatalogError;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

/// Callback authentication material for one runtime.
///
/// The `description` is public: it is embedded in outgoing job definitions so
/// the lab knows which token to present. The `value` is the shared secret the
/// lab sends back in the `Authorization` header.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct CallbackToken {
    pub description: String,
    pub value: String,
}

/// Per-runtime secret material.
#[derive(Clone, Default, Deserialize)]
pub struct RuntimeSecret {
    /// Token presented *to* the runtime on submission
    #[serde(default)]
    pub runtime_token: Option<String>,
    /// Token the runtime presents back on its callback
    #[serde(default)]
    pub callback_token: Option<CallbackToken>,
}

/// Credentials for the downstream reporting sink.
#[derive(Clone, Deserialize)]
pub struct ReportingSecret {
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub runtimes: IndexMap<String, RuntimeSecret>,
    #[serde(default)]
    pub reporting: Option<ReportingSecret>,
    /// Signing secret for user-facing API bearer tokens
    #[serde(default)]
    pub user_token_secret: Option<String>,
}

impl Secrets {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| CatalogError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&raw)
            .map_err(|source| CatalogError::Parse { path: path.to_path_buf(), source: Box::new(source) })
    }

    /// Map a presented callback secret to the runtime it belongs to.
    pub fn runtime_for_callback(&self, presented: &str) -> Option<&str> {
        self.runtimes.iter().find_map(|(name, secret)| {
            let token = secret.callback_token.as_ref()?;
            (token.value == presented).then_some(name.as_str())
        })
    }

    pub fn runtime(&self, name: &str) -> Option<&RuntimeSecret> {
        self.runtimes.get(name)
    }
}

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod tests;
