// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test platform descriptions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A device type a test job can target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub arch: String,
    /// Device-tree compatible strings, most specific first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compatible: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_method: Option<String>,
    /// Extra template parameters contributed by the platform
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub params: IndexMap<String, String>,
}
