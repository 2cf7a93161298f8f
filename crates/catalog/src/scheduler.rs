// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler entries: which events dispatch which job onto which runtime.

use cv_core::EventPattern;
use serde::{Deserialize, Serialize};

/// One scheduler entry from the catalog.
///
/// The scheduler evaluates every entry against every incoming node event;
/// a matching entry dispatches its job once per listed platform (or exactly
/// once when no platforms are listed, as for builds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerEntry {
    /// Job definition key
    pub job: String,
    pub event: EventPattern,
    /// Runtime name from the `runtimes` table
    pub runtime: String,
    /// Platform names fanned out over for test jobs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,
}
