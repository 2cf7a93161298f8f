// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup behavior specs: configuration errors must abort with a non-zero
//! exit before any service work begins.

use crate::specs::prelude::*;

const MINIMAL_SETTINGS: &str = r#"
[api]
url = "http://127.0.0.1:1"

[storage]
url = "http://127.0.0.1:1"

[trees.mainline]
url = "https://git.kernel.org/pub/scm/linux/kernel/git/torvalds/linux.git"

[runtimes.shell-local]
kind = "shell"

[jobs.kbuild-gcc-12-arm64]
template = "kbuild.jinja2"
kind = "kbuild"

[[scheduler]]
job = "kbuild-gcc-12-arm64"
event = { kind = "checkout", state = "available" }
runtime = "shell-local"
"#;

fn write_settings(dir: &tempfile::TempDir, body: &str) -> String {
    let path = dir.path().join("conveyor.toml");
    std::fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn missing_settings_file_exits_nonzero() {
    cli()
        .args(&["--settings", "/nonexistent/conveyor.toml", "reconcile", "run"])
        .fails()
        .stderr_has("loading settings");
}

#[test]
fn unparseable_settings_exit_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_settings(&dir, "not = [valid\n");
    cli().args(&["--settings", &path, "reconcile", "run"]).fails();
}

#[test]
fn invalid_catalog_reference_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let broken = MINIMAL_SETTINGS.replace("job = \"kbuild-gcc-12-arm64\"", "job = \"missing\"");
    let path = write_settings(&dir, &broken);
    cli()
        .args(&["--settings", &path, "reconcile", "run"])
        .fails()
        .stderr_has("unknown job");
}

#[test]
fn unknown_runtime_selection_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_settings(&dir, MINIMAL_SETTINGS);
    cli()
        .args(&["--settings", &path, "scheduler", "--runtimes", "no-such-lab"])
        .fails()
        .stderr_has("unknown runtime");
}

#[test]
fn missing_reporting_credentials_exit_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_settings(&dir, MINIMAL_SETTINGS);
    cli()
        .args(&["--settings", &path, "forward", "run"])
        .fails()
        .stderr_has("reporting sink credentials");
}
