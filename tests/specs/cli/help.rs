// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI help output specs.

use crate::specs::prelude::*;

#[test]
fn cv_help_lists_every_service() {
    cli()
        .args(&["--help"])
        .passes()
        .stdout_has("Usage:")
        .stdout_has("trigger")
        .stdout_has("tarball")
        .stdout_has("scheduler")
        .stdout_has("callback")
        .stdout_has("reconcile")
        .stdout_has("regression")
        .stdout_has("forward");
}

#[test]
fn cv_version_prints_version() {
    cli().args(&["--version"]).passes().stdout_has("0.2");
}

#[test]
fn trigger_help_shows_modes_and_force() {
    cli()
        .args(&["trigger", "--help"])
        .passes()
        .stdout_has("run")
        .stdout_has("loop")
        .stdout_has("--force");
}

#[test]
fn scheduler_help_shows_runtime_selection() {
    cli().args(&["scheduler", "--help"]).passes().stdout_has("--runtimes");
}

#[test]
fn global_settings_flag_is_documented() {
    cli().args(&["--help"]).passes().stdout_has("--settings").stdout_has("--secrets");
}
