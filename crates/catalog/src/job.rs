// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job definitions.

use crate::rules::Rules;
use cv_core::NodeKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One schedulable job: what to render, what kind of node it produces, and
/// where it is allowed to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDef {
    /// Template handed to the renderer together with the parameter dictionary
    pub template: String,
    /// Node kind created for this job
    pub kind: NodeKind,
    /// Container image for docker/kubernetes runtimes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Extra template parameters merged over the node-derived ones
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub params: IndexMap<String, String>,
    #[serde(default)]
    pub rules: Rules,
    /// Per-job node timeout override (window grammar)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}
