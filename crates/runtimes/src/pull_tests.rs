// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::adapter::RenderedJob;

#[tokio::test]
async fn submit_spools_descriptor_keyed_by_node() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = PullRuntime::new("lab-pull", dir.path().join("spool"));
    let node = Node::builder().build();
    let job = RenderedJob {
        name: "baseline-arm64".to_string(),
        content: "steps: []".to_string(),
        image: None,
    };

    let handle = runtime.submit(&job, &node).await.unwrap();
    assert_eq!(handle.external_id, node.id.to_string());

    let path = dir.path().join("spool").join(format!("{}.json", node.id));
    let body: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(body["node"], node.id.as_str());
    assert_eq!(body["name"], "baseline-arm64");
    assert_eq!(body["definition"], "steps: []");

    // the lab drives completion; we only ever report running
    assert_eq!(runtime.poll(&handle).await.unwrap(), JobStatus::Running);
}

#[tokio::test]
async fn cancel_removes_descriptor_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = PullRuntime::new("lab-pull", dir.path().to_path_buf());
    let node = Node::builder().build();
    let job = RenderedJob { name: "j".to_string(), content: String::new(), image: None };

    let handle = runtime.submit(&job, &node).await.unwrap();
    let path = dir.path().join(format!("{}.json", node.id));
    assert!(path.exists());

    runtime.cancel(&handle).await.unwrap();
    assert!(!path.exists());
    // canceling again is fine
    runtime.cancel(&handle).await.unwrap();
}
