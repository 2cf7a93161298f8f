// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log-analysis helper: pick the interesting lines out of build and boot
//! logs so the forwarder can attach issues to failed nodes.

use tracing::warn;

/// Line fragments that mark a reportable problem.
const PATTERNS: &[&str] = &[
    "error:",
    "Error:",
    "ERROR:",
    "BUG:",
    "Oops",
    "Kernel panic",
    "undefined reference",
    "Segmentation fault",
    "WARNING:",
];

/// Cap on extracted lines per log; one log rarely has more distinct causes.
const MAX_FINDINGS: usize = 10;

/// Extract problem lines from a log, deduplicated, in order of appearance.
pub fn scan(text: &str) -> Vec<String> {
    let mut findings: Vec<String> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if PATTERNS.iter().any(|p| trimmed.contains(p))
            && !findings.iter().any(|f| f == trimmed)
        {
            findings.push(trimmed.to_string());
            if findings.len() >= MAX_FINDINGS {
                break;
            }
        }
    }
    findings
}

/// Fetch a log artifact and scan it. Any fetch problem yields no findings;
/// log analysis never blocks forwarding.
pub async fn fetch_and_scan(http: &reqwest::Client, url: &str) -> Vec<String> {
    let text = match http.get(url).send().await {
        Ok(response) => match response.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!(url, error = %e, "log body unreadable");
                return Vec::new();
            }
        },
        Err(e) => {
            warn!(url, error = %e, "log fetch failed");
            return Vec::new();
        }
    };
    scan(&text)
}

#[cfg(test)]
#[path = "loganalysis_tests.rs"]
mod tests;
