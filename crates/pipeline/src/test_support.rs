// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for service tests.

use cv_catalog::{Secrets, Settings};
use cv_client::{FakeStore, NodeStore};
use cv_core::{Clock, FakeClock, KernelRevision, Node, NodeKind, NodeResult, NodeSeed, NodeState};
use std::sync::Arc;

pub(crate) const SETTINGS: &str = r#"
[api]
url = "https://api.test"

[storage]
url = "https://storage.test"

[trigger]
poll_interval_secs = 60
frequency = "1d"

[timeouts]
node = "6h"
holdoff = "10m"

[trees.mainline]
url = "https://git.kernel.org/pub/scm/linux/kernel/git/torvalds/linux.git"

[trees.next]
url = "https://git.kernel.org/pub/scm/linux/kernel/git/next/linux-next.git"

[build_configs.mainline-master]
tree = "mainline"
branch = "master"

[platforms.bcm2711-rpi-4-b]
arch = "arm64"
compatible = ["raspberrypi,4-model-b", "brcm,bcm2711"]
boot_method = "u-boot"

[platforms.qemu-x86]
arch = "x86_64"

[runtimes.k8s-gke]
kind = "kubernetes"
namespace = "conveyor"

[runtimes.lava-collabora]
kind = "lava"
url = "https://lava.collabora.dev"

[runtimes.shell-local]
kind = "shell"
concurrency = 2

[jobs.kbuild-gcc-12-arm64]
template = "kbuild.jinja2"
kind = "kbuild"
image = "conveyor/gcc-12:arm64"
params = { arch = "arm64", compiler = "gcc-12", defconfig = "defconfig" }

[jobs.kbuild-gcc-12-arm64.rules]
tree = ["mainline", "!android"]

[jobs.baseline-arm64]
template = "baseline.jinja2"
kind = "job"

[jobs.baseline-arm64.rules]
arch = ["arm64"]

[jobs.kbuild-clang-weekly]
template = "kbuild.jinja2"
kind = "kbuild"
image = "conveyor/clang-17:arm64"
params = { arch = "arm64", compiler = "clang-17", defconfig = "defconfig" }

[jobs.kbuild-clang-weekly.rules]
frequency = "1d"

[[scheduler]]
job = "kbuild-gcc-12-arm64"
event = { kind = "checkout", state = "available" }
runtime = "k8s-gke"

[[scheduler]]
job = "kbuild-clang-weekly"
event = { kind = "checkout", state = "available" }
runtime = "shell-local"

[[scheduler]]
job = "baseline-arm64"
event = { kind = "kbuild", state = "available", result = "pass" }
runtime = "lava-collabora"
platforms = ["bcm2711-rpi-4-b", "qemu-x86"]
"#;

pub(crate) const SECRETS: &str = r#"
user_token_secret = "signing-secret"

[runtimes.lava-collabora]
runtime_token = "submit-token"
callback_token = { description = "conveyor-callback", value = "s3cret" }

[runtimes.lab-pull]
callback_token = { description = "pull-callback", value = "pull-s3cret" }

[reporting]
url = "https://kcidb.test/submit"
"#;

pub(crate) fn settings() -> Arc<Settings> {
    let settings: Settings = toml::from_str(SETTINGS).unwrap();
    settings.validate().unwrap();
    Arc::new(settings)
}

pub(crate) fn secrets() -> Arc<Secrets> {
    Arc::new(toml::from_str(SECRETS).unwrap())
}

pub(crate) fn revision(commit: &str) -> KernelRevision {
    KernelRevision {
        tree: "mainline".to_string(),
        branch: "master".to_string(),
        commit: commit.to_string(),
        url: Some("https://git.kernel.org/pub/scm/linux/kernel/git/torvalds/linux.git".into()),
        describe: Some("v6.6-rc1".to_string()),
    }
}

/// Seed a checkout in `available` state, the way the tarball service leaves
/// it: tarball artifact attached, describe resolved, holdoff open.
pub(crate) async fn available_checkout(store: &FakeStore) -> Node {
    let mut seed = NodeSeed::root(NodeKind::Checkout, "checkout");
    seed.data.kernel_revision = Some(revision("deadbeef"));
    seed.treeid = Some("treeid-test".to_string());
    seed.timeout = Some(store.clock().now() + chrono::Duration::hours(12));
    let node = store.create(seed).await.unwrap();

    let mut available = node.clone();
    available.advance(NodeState::Available).unwrap();
    available.holdoff = Some(store.clock().now() + chrono::Duration::minutes(10));
    available.artifacts.insert(
        "tarball".to_string(),
        "https://blobs.test/linux-mainline-master-v6.6-rc1.tar.gz".to_string(),
    );
    store.update(&available, Some(NodeState::Running)).await.unwrap()
}

/// Seed a kbuild child under `checkout` that a runtime is executing.
pub(crate) async fn running_kbuild(store: &FakeStore, checkout: &Node) -> Node {
    let mut seed = NodeSeed::child_of(checkout, NodeKind::Kbuild, "kbuild-gcc-12-arm64");
    seed.group = Some("kbuild-gcc-12-arm64".to_string());
    seed.data.arch = Some("arm64".to_string());
    seed.data.compiler = Some("gcc-12".to_string());
    seed.data.defconfig = Some("defconfig".to_string());
    seed.data.runtime = Some("lava-collabora".to_string());
    seed.data.runtime_job_id = Some("4021".to_string());
    seed.timeout = Some(store.clock().now() + chrono::Duration::hours(6));
    store.create(seed).await.unwrap()
}

/// Close a node with the given result, bypassing service logic.
pub(crate) async fn finish(store: &FakeStore, node: &Node, result: NodeResult) -> Node {
    let mut done = store.node(node.id).unwrap();
    done.finish(result).unwrap();
    store.update(&done, None).await.unwrap()
}

pub(crate) fn fresh_store() -> Arc<FakeStore> {
    Arc::new(FakeStore::new(FakeClock::new()))
}
