// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime backend configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_concurrency() -> usize {
    4
}

fn default_namespace() -> String {
    "default".to_string()
}

/// One configured runtime backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeDef {
    #[serde(flatten)]
    pub kind: RuntimeKindDef,
    /// Concurrent submissions allowed into this runtime
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Node timeout for jobs dispatched here (window grammar); falls back to
    /// the global default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// Backend-specific settings, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuntimeKindDef {
    /// Fork a local process
    Shell,
    /// Same as shell, inside a named image
    Docker {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    /// Submit pods to a container cluster
    Kubernetes {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
        #[serde(default = "default_namespace")]
        namespace: String,
    },
    /// Submit to a LAVA lab; completion arrives via callback
    Lava {
        url: String,
    },
    /// The lab pulls work descriptors; we only materialize them
    Pull {
        spool: PathBuf,
    },
}

impl RuntimeKindDef {
    /// Short name used in logs and node data.
    pub fn label(&self) -> &'static str {
        match self {
            RuntimeKindDef::Shell => "shell",
            RuntimeKindDef::Docker { .. } => "docker",
            RuntimeKindDef::Kubernetes { .. } => "kubernetes",
            RuntimeKindDef::Lava { .. } => "lava",
            RuntimeKindDef::Pull { .. } => "pull",
        }
    }
}
