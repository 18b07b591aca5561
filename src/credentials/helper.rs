//! Platform-default credential lookup.
//!
//! When neither the credential store nor an earlier prompt has produced a
//! record for a host, the authenticator falls back to whatever the platform
//! would normally use. For git that is the configured credential helper,
//! queried with `git credential fill`.

use std::io::Write;
use std::process::{Command, Stdio};

use super::CredentialRecord;

/// Fallback source of credentials for hosts nothing else knows about.
pub trait PlatformCredentials: Send + Sync {
    fn lookup(&self, host: &str) -> Option<CredentialRecord>;
}

/// Never returns credentials.
pub struct NoPlatformCredentials;

impl PlatformCredentials for NoPlatformCredentials {
    fn lookup(&self, _host: &str) -> Option<CredentialRecord> {
        None
    }
}

/// Asks git's configured credential helpers, with terminal prompts disabled.
pub struct GitCredentialHelper {
    protocol: String,
}

impl GitCredentialHelper {
    pub fn new() -> Self {
        Self {
            protocol: "https".to_string(),
        }
    }
}

impl Default for GitCredentialHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformCredentials for GitCredentialHelper {
    fn lookup(&self, host: &str) -> Option<CredentialRecord> {
        let mut child = Command::new("git")
            .args(["credential", "fill"])
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_ASKPASS", "")
            .env("SSH_ASKPASS", "")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| tracing::debug!("git credential fill unavailable: {}", e))
            .ok()?;

        if let Some(mut stdin) = child.stdin.take() {
            let request = format!("protocol={}\nhost={}\n\n", self.protocol, host);
            if stdin.write_all(request.as_bytes()).is_err() {
                let _ = child.kill();
                return None;
            }
        }

        let output = child.wait_with_output().ok()?;
        if !output.status.success() {
            tracing::debug!(host = %host, "git credential helper had nothing for host");
            return None;
        }

        let text = zeroize::Zeroizing::new(String::from_utf8(output.stdout).ok()?);
        parse_fill_output(&text)
    }
}

/// Parse `key=value` lines printed by `git credential fill`.
fn parse_fill_output(text: &str) -> Option<CredentialRecord> {
    let mut username = None;
    let mut password = None;
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("username=") {
            username = Some(value);
        } else if let Some(value) = line.strip_prefix("password=") {
            password = Some(value);
        }
    }
    match (username, password) {
        (Some(user), Some(pass)) if !user.is_empty() => {
            Some(CredentialRecord::password(user, pass))
        }
        _ => None,
    }
}
