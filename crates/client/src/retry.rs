// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded exponential backoff for transient collaborator failures.

use crate::error::ClientError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff: the delay doubles each attempt up to a cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    base: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { attempt: 0, base, cap }
    }

    /// Balanced policy for store/bus calls: 2s base, 2min cap.
    pub fn default_policy() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(120))
    }

    pub fn next_delay(&mut self) -> Duration {
        let exp = self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);
        self.base.saturating_mul(1u32 << exp).min(self.cap)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Run `op`, retrying transient failures forever with bounded backoff.
/// Permanent errors are returned to the caller immediately.
pub async fn retry_transient<T, F, Fut>(label: &str, mut op: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut backoff = Backoff::default_policy();
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                let delay = backoff.next_delay();
                warn!(op = label, error = %e, delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
