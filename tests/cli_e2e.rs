//! End-to-end CLI tests for the web-downloads binary.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[macro_use]
mod support;

/// Runs inside `work_dir`, downloading into `<work_dir>/files`.
fn cli(work_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("web-downloads").unwrap();
    cmd.env_remove("RUST_LOG")
        .current_dir(work_dir)
        .arg("--downloads-dir")
        .arg(work_dir.join("files"));
    cmd
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("web-downloads").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Fetch files over HTTP"))
        .stdout(predicate::str::contains("get"))
        .stdout(predicate::str::contains("list"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("web-downloads").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("web-downloads"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let mut cmd = Command::cargo_bin("web-downloads").unwrap();
    cmd.args(["--invalid-flag", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_list_on_fresh_directory_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    cli(temp_dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No downloads"));
    assert!(temp_dir.path().join("web-downloads.db").exists());
    assert!(!temp_dir.path().join("files").exists());
}

#[test]
fn test_download_list_is_kept_out_of_downloads_dir() {
    let temp_dir = TempDir::new().unwrap();
    let files = temp_dir.path().join("files");
    std::fs::create_dir(&files).unwrap();

    cli(temp_dir.path()).args(["-q", "clear"]).assert().success();
    assert!(temp_dir.path().join("web-downloads.db").exists());
    assert_eq!(std::fs::read_dir(&files).unwrap().count(), 0);

    let explicit = temp_dir.path().join("state").join("list.db");
    cli(temp_dir.path())
        .arg("--db")
        .arg(&explicit)
        .arg("list")
        .assert()
        .success();
    assert!(explicit.exists());
}

#[test]
fn test_list_json_on_fresh_directory_is_empty_array() {
    let temp_dir = TempDir::new().unwrap();
    cli(temp_dir.path())
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[]"));
}

#[test]
fn test_clear_on_fresh_directory_succeeds() {
    let temp_dir = TempDir::new().unwrap();
    cli(temp_dir.path()).arg("-q").arg("clear").assert().success();
}

#[test]
fn test_remove_unknown_id_fails() {
    let temp_dir = TempDir::new().unwrap();
    cli(temp_dir.path())
        .args(["remove", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no download with id 42"));
}

#[test]
fn test_get_rejects_unsupported_scheme() {
    let temp_dir = TempDir::new().unwrap();
    cli(temp_dir.path())
        .args(["-q", "get", "ftp://example.com/file.bin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 1 downloads failed"));
}

#[test]
fn test_invalid_config_file_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("engine.json");
    std::fs::write(&config, "{ not json").unwrap();
    cli(temp_dir.path())
        .arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .failure();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_then_list_then_remove() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/files/manual.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 manual".to_vec()))
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().to_path_buf();
    let url = format!("{}/files/manual.pdf", mock_server.uri());

    let outputs = tokio::task::spawn_blocking(move || {
        cli(&dir).args(["-q", "get", url.as_str()]).assert().success();
        let listed = cli(&dir).arg("list").assert().success().get_output().stdout.clone();
        let json = cli(&dir)
            .args(["list", "--json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        cli(&dir)
            .args(["-q", "remove", "1", "--delete-file"])
            .assert()
            .success();
        (listed, json)
    })
    .await
    .unwrap();

    let listed = String::from_utf8(outputs.0).unwrap();
    assert!(listed.contains("Completed"), "list output: {listed}");
    assert!(listed.contains("manual.pdf"), "list output: {listed}");
    assert!(listed.contains("100%"), "list output: {listed}");

    let records: serde_json::Value = serde_json::from_slice(&outputs.1).unwrap();
    assert_eq!(records[0]["id"], 1);
    assert_eq!(records[0]["status"], "completed");
    assert_eq!(records[0]["mime_type"], serde_json::Value::Null);

    assert!(!temp_dir.path().join("files").join("manual.pdf").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_http_error_exits_non_zero() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().to_path_buf();
    let url = format!("{}/broken.bin", mock_server.uri());

    tokio::task::spawn_blocking(move || {
        cli(&dir)
            .args(["-q", "get", url.as_str()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("1 of 1 downloads failed"));
        cli(&dir)
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("Failed"))
            .stdout(predicate::str::contains("Server returned HTTP 500 Internal Server Error"));
    })
    .await
    .unwrap();
}
