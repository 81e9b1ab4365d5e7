//! Binary-level tests: configuration validation and early failures.
//!
//! These run the compiled `advisor-chat` binary and never reach a backend.

use assert_cmd::Command;
use predicates::prelude::*;
mod common;

const MEMORY_CREDENTIALS: &str = "credentials:\n  backend: memory\n";

#[test]
fn test_valid_config_accepted() {
    let (_temp_dir, config_path) = common::temp_config_file(&format!(
        "server:\n  api_url: https://advising.example.edu/api\n{}",
        MEMORY_CREDENTIALS
    ));

    let mut cmd = Command::cargo_bin("advisor-chat").unwrap();
    cmd.arg("--config").arg(config_path).arg("--version");

    cmd.assert().success();
}

#[test]
fn test_zero_request_timeout_rejected() {
    let (_temp_dir, config_path) = common::temp_config_file(&format!(
        "server:\n  request_timeout_seconds: 0\n{}",
        MEMORY_CREDENTIALS
    ));

    let mut cmd = Command::cargo_bin("advisor-chat").unwrap();
    cmd.arg("--config").arg(config_path).arg("whoami");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("must be greater than 0"));
}

#[test]
fn test_socket_url_scheme_rejected() {
    let (_temp_dir, config_path) = common::temp_config_file(&format!(
        "server:\n  socket_url: http://localhost:3000\n{}",
        MEMORY_CREDENTIALS
    ));

    let mut cmd = Command::cargo_bin("advisor-chat").unwrap();
    cmd.arg("--config").arg(config_path).arg("whoami");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("socket_url must use ws or wss"));
}

#[test]
fn test_whoami_without_session_fails() {
    let (_temp_dir, config_path) = common::temp_config_file(MEMORY_CREDENTIALS);

    let mut cmd = Command::cargo_bin("advisor-chat").unwrap();
    cmd.arg("--config").arg(config_path).arg("whoami");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("not signed in"));
}

#[test]
fn test_blank_message_rejected_before_network() {
    let (_temp_dir, config_path) = common::temp_config_file(MEMORY_CREDENTIALS);

    let mut cmd = Command::cargo_bin("advisor-chat").unwrap();
    cmd.arg("--config")
        .arg(config_path)
        .arg("send")
        .arg("--with")
        .arg("42")
        .arg("   ");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("message is empty"));
}

#[test]
fn test_with_and_box_conflict() {
    let mut cmd = Command::cargo_bin("advisor-chat").unwrap();
    cmd.arg("history").arg("--with").arg("1").arg("--box").arg("2");

    cmd.assert().failure();
}
