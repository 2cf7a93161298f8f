// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cv-catalog: static configuration catalog for the Conveyor pipeline.
//!
//! Everything the services need to know up front lives in two TOML files:
//! the settings catalog (trees, build configs, platforms, runtimes, job
//! definitions, scheduler entries) and the secrets file (runtime tokens,
//! reporting credentials, user-token signing secret). Both are loaded once at
//! startup; a parse or validation error aborts the process.

pub mod error;
pub mod job;
pub mod platform;
pub mod rules;
pub mod runtime;
pub mod scheduler;
pub mod secrets;
pub mod settings;

pub use error::CatalogError;
pub use job::JobDef;
pub use platform::Platform;
pub use rules::{parse_window, Rules, Version};
pub use runtime::{RuntimeDef, RuntimeKindDef};
pub use scheduler::SchedulerEntry;
pub use secrets::{CallbackToken, ReportingSecret, RuntimeSecret, Secrets};
pub use settings::{
    ApiSettings, BuildConfig, CallbackSettings, RendererSettings, Settings, StorageSettings,
    TimeoutSettings, Tree, TriggerSettings,
};
