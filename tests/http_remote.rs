use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const OID: &str = "4444444444444444444444444444444444444444";

/// Helper: get a Command for the gitward binary with an isolated config dir.
fn gitward(config: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("gitward").expect("gitward binary not found");
    cmd.env("GITWARD_CONFIG_DIR", config.path())
        .env_remove("RUST_LOG");
    cmd
}

/// Config dir that never consults git credential helpers.
fn config_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("config.toml"),
        "use_git_credential_helper = false\ntimeout_secs = 5\n",
    )
    .unwrap();
    dir
}

fn pkt(payload: &str) -> String {
    format!("{:04x}{}", payload.len() + 4, payload)
}

fn advertisement() -> Vec<u8> {
    let mut body = pkt("# service=git-upload-pack\n");
    body.push_str("0000");
    body.push_str(&pkt(&format!("{} HEAD\0multi_ack side-band-64k\n", OID)));
    body.push_str(&pkt(&format!("{} refs/heads/main\n", OID)));
    body.push_str("0000");
    body.into_bytes()
}

/// Serve one canned response per connection and record each request's
/// Authorization header.
fn serve(responses: Vec<(u16, Vec<u8>)>) -> (String, Arc<Mutex<Vec<Option<String>>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_server = seen.clone();
    std::thread::spawn(move || {
        for (status, body) in responses {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let text = String::from_utf8_lossy(&request).to_string();
            let auth = text
                .lines()
                .find(|l| l.to_ascii_lowercase().starts_with("authorization:"))
                .map(|l| l["authorization:".len()..].trim().to_string());
            seen_by_server.lock().unwrap().push(auth);

            let challenge = if status == 401 {
                "WWW-Authenticate: Basic realm=\"git\"\r\n"
            } else {
                ""
            };
            let head = format!(
                "HTTP/1.1 {} X\r\n{}Content-Type: application/x-git-upload-pack-advertisement\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                challenge,
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
        }
    });
    (format!("http://127.0.0.1:{}/team/app.git", port), seen)
}

#[test]
fn test_fetch_prints_advertised_refs() {
    let config = config_dir();
    let (url, seen) = serve(vec![(200, advertisement())]);

    gitward(&config)
        .args(["fetch", url.as_str(), "--non-interactive"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{}\tHEAD", OID)))
        .stdout(predicate::str::contains(format!("{}\trefs/heads/main", OID)));

    assert_eq!(*seen.lock().unwrap(), vec![None]);
}

#[test]
fn test_challenge_answered_from_credential_store() {
    let config = config_dir();
    fs::write(
        config.path().join("credentials.toml"),
        "[hosts.\"127.0.0.1\"]\nkind = \"password\"\nusername = \"ann\"\npassword = \"s3cret\"\n",
    )
    .unwrap();
    let (url, seen) = serve(vec![(401, Vec::new()), (200, advertisement())]);

    gitward(&config)
        .args(["pull", url.as_str(), "--non-interactive"])
        .assert()
        .success()
        .stdout(predicate::str::contains("refs/heads/main"));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], None);
    // base64("ann:s3cret")
    assert_eq!(seen[1].as_deref(), Some("Basic YW5uOnMzY3JldA=="));
}

#[test]
fn test_unauthorized_without_credentials_aborts() {
    let config = config_dir();
    let (url, _) = serve(vec![(401, Vec::new())]);

    gitward(&config)
        .args(["fetch", url.as_str(), "--non-interactive"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("error: fetch aborted"))
        .stderr(predicate::str::contains("hint: no credentials found"));
}

#[test]
fn test_forbidden_reports_insufficient_rights() {
    let config = config_dir();
    let (url, _) = serve(vec![(403, Vec::new())]);

    gitward(&config)
        .args(["fetch", url.as_str(), "--non-interactive"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: fetch aborted"))
        .stderr(predicate::str::contains("not permitted"));
}

#[test]
fn test_missing_repository_fails_without_retry() {
    let config = config_dir();
    let (url, seen) = serve(vec![(404, Vec::new()), (404, Vec::new())]);

    gitward(&config)
        .args(["fetch", url.as_str(), "--non-interactive"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: fetch failed"))
        .stderr(predicate::str::contains("does not point to a repository"));

    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn test_unreachable_host_is_transport_failure() {
    let config = config_dir();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let url = format!("http://127.0.0.1:{}/app.git", port);

    gitward(&config)
        .args(["fetch", url.as_str(), "--non-interactive"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not be reached"));
}

#[test]
fn test_unknown_remote_name_aborts_when_not_linked() {
    let git_available = std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !git_available {
        return;
    }

    let config = config_dir();
    let repo = TempDir::new().unwrap();
    std::process::Command::new("git")
        .arg("init")
        .arg("-q")
        .arg(repo.path())
        .status()
        .unwrap();

    gitward(&config)
        .args(["fetch", "origin", "--non-interactive", "--repo"])
        .arg(repo.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: fetch aborted"))
        .stderr(predicate::str::contains("link a remote"));
}
