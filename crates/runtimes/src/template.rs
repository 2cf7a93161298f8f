// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job-template rendering seam.
//!
//! Rendering is delegated to an external collaborator; the pipeline only
//! supplies the template name and a parameter dictionary drawn from the node
//! tree.

use crate::adapter::RuntimeError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(
        &self,
        template: &str,
        params: &serde_json::Value,
    ) -> Result<String, RuntimeError>;
}

/// Shells out to the configured renderer command with the parameter
/// dictionary as JSON on stdin and the rendered job on stdout.
pub struct CommandRenderer {
    command: String,
    templates: PathBuf,
}

impl CommandRenderer {
    pub fn new(command: impl Into<String>, templates: PathBuf) -> Self {
        Self { command: command.into(), templates }
    }
}

#[async_trait]
impl TemplateRenderer for CommandRenderer {
    async fn render(
        &self,
        template: &str,
        params: &serde_json::Value,
    ) -> Result<String, RuntimeError> {
        let template_path = self.templates.join(template);
        let mut child = tokio::process::Command::new(&self.command)
            .arg(&template_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RuntimeError::Render(format!("{}: {e}", self.command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let body = serde_json::to_vec(params)
                .map_err(|e| RuntimeError::Render(e.to_string()))?;
            stdin.write_all(&body).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::Render(format!(
                "{} {}: {}",
                self.command,
                template_path.display(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Test renderer: records calls and produces a deterministic body.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeRenderer {
    calls: parking_lot::Mutex<Vec<(String, serde_json::Value)>>,
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeRenderer {
    fn default() -> Self {
        Self { calls: parking_lot::Mutex::new(Vec::new()) }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl FakeRenderer {
    pub fn calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.lock().clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl TemplateRenderer for FakeRenderer {
    async fn render(
        &self,
        template: &str,
        params: &serde_json::Value,
    ) -> Result<String, RuntimeError> {
        self.calls.lock().push((template.to_string(), params.clone()));
        Ok(format!("# rendered {template}\nexit 0\n"))
    }
}
