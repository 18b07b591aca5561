use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper: get a Command for the gitward binary using `config` as its
/// config directory.
fn gitward(config: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("gitward").expect("gitward binary not found");
    cmd.env("GITWARD_CONFIG_DIR", config.path());
    cmd
}

const TWO_HOSTS: &str = r#"
[hosts."github.com"]
kind = "token"
token = "ghp_example"

[hosts."git.internal"]
kind = "password"
username = "build"
password = "hunter2"
"#;

const ANSWERS: &str = r#"{
  "hosts": {
    "git.internal": {
      "The authenticity of host 'git.internal' can't be established. Continue?": {
        "answer": true,
        "answered_at": "2026-03-01T12:00:00Z"
      }
    }
  }
}"#;

#[test]
fn test_help_lists_commands() {
    let config = TempDir::new().unwrap();
    gitward(&config)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fetch"))
        .stdout(predicate::str::contains("push"))
        .stdout(predicate::str::contains("credentials"))
        .stdout(predicate::str::contains("trust"));
}

#[test]
fn test_credentials_list_empty() {
    let config = TempDir::new().unwrap();
    gitward(&config)
        .args(["credentials", "list"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("No stored credentials"));
}

#[test]
fn test_credentials_list_shows_hosts_not_secrets() {
    let config = TempDir::new().unwrap();
    fs::write(config.path().join("credentials.toml"), TWO_HOSTS).unwrap();

    gitward(&config)
        .args(["credentials", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("git.internal\tpassword"))
        .stdout(predicate::str::contains("github.com\ttoken"))
        .stdout(predicate::str::contains("hunter2").not())
        .stdout(predicate::str::contains("ghp_example").not());
}

#[test]
fn test_credentials_rm() {
    let config = TempDir::new().unwrap();
    fs::write(config.path().join("credentials.toml"), TWO_HOSTS).unwrap();

    gitward(&config)
        .args(["credentials", "rm", "github.com"])
        .assert()
        .success();

    let remaining = fs::read_to_string(config.path().join("credentials.toml")).unwrap();
    assert!(!remaining.contains("github.com"));
    assert!(remaining.contains("git.internal"));
}

#[test]
fn test_credentials_rm_unknown_host() {
    let config = TempDir::new().unwrap();
    gitward(&config)
        .args(["credentials", "rm", "nowhere.example"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no credentials stored for 'nowhere.example'"))
        .stderr(predicate::str::contains("hint:"));
}

#[test]
fn test_malformed_credentials_file() {
    let config = TempDir::new().unwrap();
    fs::write(config.path().join("credentials.toml"), "hosts = 7\n").unwrap();
    gitward(&config)
        .args(["credentials", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid credentials.toml"));
}

#[test]
fn test_trust_list_and_reset() {
    let config = TempDir::new().unwrap();
    fs::write(config.path().join("host_answers.json"), ANSWERS).unwrap();

    gitward(&config)
        .args(["trust", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("git.internal\tyes\t2026-03-01 12:00:00"));

    gitward(&config)
        .args(["trust", "reset"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Forgot 1 remembered answer(s)"));

    gitward(&config)
        .args(["trust", "list"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_malformed_config_is_reported() {
    let config = TempDir::new().unwrap();
    fs::write(config.path().join("config.toml"), "max_attempts = \"many\"\n").unwrap();
    gitward(&config)
        .args(["fetch", "https://example.invalid/repo.git", "--non-interactive"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config.toml"))
        .stderr(predicate::str::contains("hint:"));
}

#[test]
fn test_zero_max_attempts_rejected() {
    let config = TempDir::new().unwrap();
    gitward(&config)
        .args(["push", "origin", "--max-attempts", "0"])
        .assert()
        .failure();
}

#[test]
fn test_completions_bash() {
    let config = TempDir::new().unwrap();
    gitward(&config)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gitward"));
}
