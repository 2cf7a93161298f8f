// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Helpers for driving the `cv` binary in specs.

use assert_cmd::Command;
use std::path::PathBuf;

fn cv_bin_path() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("target");
    path.push(if cfg!(debug_assertions) { "debug" } else { "release" });
    path.push("cv");
    path
}

pub fn cli() -> CliRunner {
    CliRunner { cmd: Command::new(cv_bin_path()), args: Vec::new() }
}

pub struct CliRunner {
    cmd: Command,
    args: Vec<String>,
}

impl CliRunner {
    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    fn run(mut self) -> CliAssert {
        let output = self.cmd.args(&self.args).output().unwrap();
        CliAssert {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    pub fn passes(self) -> CliAssert {
        let result = self.run();
        assert!(result.success, "expected success, stderr: {}", result.stderr);
        result
    }

    pub fn fails(self) -> CliAssert {
        let result = self.run();
        assert!(!result.success, "expected failure, stdout: {}", result.stdout);
        result
    }
}

pub struct CliAssert {
    success: bool,
    stdout: String,
    stderr: String,
}

impl CliAssert {
    pub fn stdout_has(self, needle: &str) -> Self {
        assert!(
            self.stdout.contains(needle),
            "stdout missing {needle:?}:\n{}",
            self.stdout
        );
        self
    }

    pub fn stderr_has(self, needle: &str) -> Self {
        assert!(
            self.stderr.contains(needle),
            "stderr missing {needle:?}:\n{}",
            self.stderr
        );
        self
    }
}
