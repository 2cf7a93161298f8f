// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const SAMPLE: &str = r#"
user_token_secret = "signing-secret"

[runtimes.lava-collabora]
runtime_token = "submit-token"
callback_token = { description = "conveyor-callback", value = "s3cret" }

[runtimes.k8s-gke]
runtime_token = "kube-token"

[reporting]
url = "https://kcidb.example.org/submit"
token = "report-token"
"#;

fn sample() -> Secrets {
    toml::from_str(SAMPLE).unwrap()
}

#[test]
fn callback_secret_maps_to_runtime() {
    let secrets = sample();
    assert_eq!(secrets.runtime_for_callback("s3cret"), Some("lava-collabora"));
    assert_eq!(secrets.runtime_for_callback("wrong"), None);
    assert_eq!(secrets.runtime_for_callback(""), None);
}

#[test]
fn description_is_distinct_from_value() {
    let secrets = sample();
    let token = secrets.runtime("lava-collabora").unwrap().callback_token.as_ref().unwrap();
    assert_eq!(token.description, "conveyor-callback");
    assert_eq!(token.value, "s3cret");
    // the public description must never authenticate
    assert_eq!(secrets.runtime_for_callback("conveyor-callback"), None);
}

#[test]
fn runtime_without_callback_token() {
    let secrets = sample();
    assert!(secrets.runtime("k8s-gke").unwrap().callback_token.is_none());
}

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secrets.toml");
    std::fs::write(&path, SAMPLE).unwrap();
    let secrets = Secrets::load(&path).unwrap();
    assert_eq!(secrets.user_token_secret.as_deref(), Some("signing-secret"));
    assert_eq!(secrets.reporting.as_ref().map(|r| r.url.as_str()),
        Some("https://kcidb.example.org/submit"));
}

#[test]
fn load_missing_file_is_read_error() {
    let err = match Secrets::load(std::path::Path::new("/nonexistent/secrets.toml")) {
        Err(err) => err,
        Ok(_) => panic!("expected load to fail"),
    };
    assert!(matches!(err, CatalogError::Read { .. }));
}
