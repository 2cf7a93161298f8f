// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The settings catalog: one TOML file describing everything static.

use crate::error::CatalogError;
use crate::job::JobDef;
use crate::platform::Platform;
use crate::rules::parse_window;
use crate::runtime::RuntimeDef;
use crate::scheduler::SchedulerEntry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// State store endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Per-request timeout for store calls
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_http_timeout() -> u64 {
    60
}

/// Blob store endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Upstream source tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub url: String,
}

/// A (tree, branch) pair the trigger watches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub tree: String,
    pub branch: String,
}

/// Trigger service knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSettings {
    #[serde(default = "TriggerSettings::default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Minimum spacing between checkouts of the same (tree, branch)
    #[serde(default = "TriggerSettings::default_frequency")]
    pub frequency: String,
    /// Timeout stamped onto new checkouts (window grammar)
    #[serde(default = "TriggerSettings::default_checkout_timeout")]
    pub checkout_timeout: String,
    /// Where the tarball service keeps its bare mirrors
    #[serde(default = "TriggerSettings::default_mirrors")]
    pub mirrors: PathBuf,
}

impl TriggerSettings {
    fn default_poll_interval() -> u64 {
        300
    }
    fn default_frequency() -> String {
        "1d".to_string()
    }
    fn default_checkout_timeout() -> String {
        "12h".to_string()
    }
    fn default_mirrors() -> PathBuf {
        PathBuf::from("mirrors")
    }
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: Self::default_poll_interval(),
            frequency: Self::default_frequency(),
            checkout_timeout: Self::default_checkout_timeout(),
            mirrors: Self::default_mirrors(),
        }
    }
}

/// Lifecycle deadlines and sweep cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Default node timeout (window grammar)
    #[serde(default = "TimeoutSettings::default_node")]
    pub node: String,
    /// Holdoff applied when a node first becomes available
    #[serde(default = "TimeoutSettings::default_holdoff")]
    pub holdoff: String,
    #[serde(default = "TimeoutSettings::default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "TimeoutSettings::default_forward_interval")]
    pub forward_interval_secs: u64,
}

impl TimeoutSettings {
    fn default_node() -> String {
        "6h".to_string()
    }
    fn default_holdoff() -> String {
        "10m".to_string()
    }
    fn default_sweep_interval() -> u64 {
        60
    }
    fn default_forward_interval() -> u64 {
        300
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            node: Self::default_node(),
            holdoff: Self::default_holdoff(),
            sweep_interval_secs: Self::default_sweep_interval(),
            forward_interval_secs: Self::default_forward_interval(),
        }
    }
}

/// Callback ingestor / user API server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackSettings {
    #[serde(default = "CallbackSettings::default_listen")]
    pub listen: String,
    /// Externally reachable base URL, embedded into outgoing LAVA jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

impl CallbackSettings {
    fn default_listen() -> String {
        "0.0.0.0:8100".to_string()
    }
}

impl Default for CallbackSettings {
    fn default() -> Self {
        Self { listen: Self::default_listen(), public_url: None }
    }
}

/// External job-template renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererSettings {
    /// Command invoked as `{command} {template_path}` with the parameter
    /// dictionary as JSON on stdin
    #[serde(default = "RendererSettings::default_command")]
    pub command: String,
    #[serde(default = "RendererSettings::default_templates")]
    pub templates: PathBuf,
}

impl RendererSettings {
    fn default_command() -> String {
        "j2".to_string()
    }
    fn default_templates() -> PathBuf {
        PathBuf::from("templates")
    }
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self { command: Self::default_command(), templates: Self::default_templates() }
    }
}

/// The whole static catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub api: ApiSettings,
    pub storage: StorageSettings,
    #[serde(default)]
    pub trigger: TriggerSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub callback: CallbackSettings,
    #[serde(default)]
    pub renderer: RendererSettings,
    #[serde(default)]
    pub trees: IndexMap<String, Tree>,
    #[serde(default)]
    pub build_configs: IndexMap<String, BuildConfig>,
    #[serde(default)]
    pub platforms: IndexMap<String, Platform>,
    #[serde(default)]
    pub runtimes: IndexMap<String, RuntimeDef>,
    #[serde(default)]
    pub jobs: IndexMap<String, JobDef>,
    #[serde(default)]
    pub scheduler: Vec<SchedulerEntry>,
}

impl Settings {
    /// Load and validate the catalog; any error here aborts startup.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| CatalogError::Read { path: path.to_path_buf(), source })?;
        let settings: Settings = toml::from_str(&raw).map_err(|source| CatalogError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        for (name, tree) in &self.trees {
            if tree.url.is_empty() {
                return Err(CatalogError::Invalid(format!("tree {name:?} has an empty url")));
            }
        }
        for (name, config) in &self.build_configs {
            if !self.trees.contains_key(&config.tree) {
                return Err(CatalogError::Invalid(format!(
                    "build config {name:?} references unknown tree {:?}",
                    config.tree
                )));
            }
        }
        for (name, job) in &self.jobs {
            job.rules
                .validate()
                .map_err(|e| CatalogError::Invalid(format!("job {name:?}: {e}")))?;
            if let Some(ref timeout) = job.timeout {
                parse_window(timeout)
                    .map_err(|e| CatalogError::Invalid(format!("job {name:?}: {e}")))?;
            }
        }
        for (name, runtime) in &self.runtimes {
            if let Some(ref timeout) = runtime.timeout {
                parse_window(timeout)
                    .map_err(|e| CatalogError::Invalid(format!("runtime {name:?}: {e}")))?;
            }
        }
        for entry in &self.scheduler {
            if !self.jobs.contains_key(&entry.job) {
                return Err(CatalogError::Invalid(format!(
                    "scheduler entry references unknown job {:?}",
                    entry.job
                )));
            }
            if !self.runtimes.contains_key(&entry.runtime) {
                return Err(CatalogError::Invalid(format!(
                    "scheduler entry for {:?} references unknown runtime {:?}",
                    entry.job, entry.runtime
                )));
            }
            for platform in &entry.platforms {
                if !self.platforms.contains_key(platform) {
                    return Err(CatalogError::Invalid(format!(
                        "scheduler entry for {:?} references unknown platform {platform:?}",
                        entry.job
                    )));
                }
            }
        }
        parse_window(&self.trigger.frequency)?;
        parse_window(&self.trigger.checkout_timeout)?;
        parse_window(&self.timeouts.node)?;
        parse_window(&self.timeouts.holdoff)?;
        Ok(())
    }

    pub fn job(&self, name: &str) -> Option<&JobDef> {
        self.jobs.get(name)
    }

    pub fn platform(&self, name: &str) -> Option<&Platform> {
        self.platforms.get(name)
    }

    pub fn runtime(&self, name: &str) -> Option<&RuntimeDef> {
        self.runtimes.get(name)
    }

    /// Timeout for a node dispatched as `job` onto `runtime`: the job's
    /// override wins, then the runtime's, then the global default.
    ///
    /// Validation already proved every window parses, so failures here fall
    /// back to the hard default.
    pub fn node_timeout(&self, job: &JobDef, runtime: &RuntimeDef) -> chrono::Duration {
        job.timeout
            .as_deref()
            .or(runtime.timeout.as_deref())
            .map_or_else(|| self.default_node_timeout(), |w| {
                parse_window(w).unwrap_or_else(|_| self.default_node_timeout())
            })
    }

    fn default_node_timeout(&self) -> chrono::Duration {
        parse_window(&self.timeouts.node).unwrap_or_else(|_| chrono::Duration::hours(6))
    }

    pub fn holdoff(&self) -> chrono::Duration {
        parse_window(&self.timeouts.holdoff).unwrap_or_else(|_| chrono::Duration::minutes(10))
    }

    pub fn checkout_timeout(&self) -> chrono::Duration {
        parse_window(&self.trigger.checkout_timeout)
            .unwrap_or_else(|_| chrono::Duration::hours(12))
    }

    pub fn frequency(&self) -> chrono::Duration {
        parse_window(&self.trigger.frequency).unwrap_or_else(|_| chrono::Duration::days(1))
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
