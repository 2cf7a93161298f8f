// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic service runner with graceful shutdown.

use crate::error::PipelineError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Grace period for draining outstanding work after SIGINT/SIGTERM.
pub const DRAIN_GRACE: Duration = Duration::from_secs(30);

/// A service driven by a periodic tick.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;

    async fn tick(&self) -> Result<(), PipelineError>;
}

/// Tick `service` every `interval` until shutdown.
///
/// A running service never exits on a failed tick; the failure is logged and
/// the next tick proceeds.
pub async fn run_loop<S: Service>(service: &S, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(service = service.name(), interval_secs = interval.as_secs(), "service loop started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(service = service.name(), "service loop stopping");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = service.tick().await {
                    error!(service = service.name(), error = %e, "tick failed");
                }
            }
        }
    }
}
