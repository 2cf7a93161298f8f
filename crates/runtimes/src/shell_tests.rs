// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::adapter::JobStatus;
use std::time::Duration;

fn runtime(dir: &tempfile::TempDir) -> ShellRuntime {
    ShellRuntime::with_workdir("shell-test", dir.path().to_path_buf())
}

fn job(content: &str) -> RenderedJob {
    RenderedJob { name: "baseline".to_string(), content: content.to_string(), image: None }
}

async fn wait_done(runtime: &ShellRuntime, handle: &SubmitHandle) -> JobOutcome {
    for _ in 0..100 {
        if let JobStatus::Done(outcome) = runtime.poll(handle).await.unwrap() {
            return outcome;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job never finished");
}

#[tokio::test]
async fn clean_exit_is_pass_with_captured_log() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime(&dir);
    let node = Node::builder().build();

    let handle = runtime.submit(&job("echo building\n"), &node).await.unwrap();
    let outcome = wait_done(&runtime, &handle).await;

    assert_eq!(outcome.result, Some(NodeResult::Pass));
    let log = std::fs::read_to_string(outcome.log.unwrap()).unwrap();
    assert!(log.contains("building"));
}

#[tokio::test]
async fn nonzero_exit_is_fail() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime(&dir);
    let node = Node::builder().build();

    let handle = runtime.submit(&job("echo broken >&2\nexit 2\n"), &node).await.unwrap();
    let outcome = wait_done(&runtime, &handle).await;

    assert_eq!(outcome.result, Some(NodeResult::Fail));
    assert_eq!(outcome.error_msg.as_deref(), Some("exit code 2"));
    // stderr lands in the same log
    let log = std::fs::read_to_string(outcome.log.unwrap()).unwrap();
    assert!(log.contains("broken"));
}

#[tokio::test]
async fn cancel_kills_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime(&dir);
    let node = Node::builder().build();

    let handle = runtime.submit(&job("sleep 60\n"), &node).await.unwrap();
    assert_eq!(runtime.poll(&handle).await.unwrap(), JobStatus::Running);

    runtime.cancel(&handle).await.unwrap();
    let outcome = wait_done(&runtime, &handle).await;
    assert_eq!(outcome.result, Some(NodeResult::Incomplete));
    assert_eq!(outcome.error_code.as_deref(), Some("canceled"));
}

#[tokio::test]
async fn poll_unknown_handle_errors() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime(&dir);
    let handle = SubmitHandle { runtime: "shell-test".into(), external_id: "nope".into() };
    assert!(matches!(
        runtime.poll(&handle).await,
        Err(RuntimeError::UnknownHandle(_))
    ));
}

#[test]
fn exit_mapping_covers_signals() {
    use std::os::unix::process::ExitStatusExt;
    let killed = std::process::ExitStatus::from_raw(9);
    let outcome = outcome_from_exit(killed, std::path::PathBuf::from("/tmp/x.log"));
    assert_eq!(outcome.result, Some(NodeResult::Incomplete));
    assert_eq!(outcome.error_code.as_deref(), Some("killed"));
}
