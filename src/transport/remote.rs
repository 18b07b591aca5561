//! Resolving a remote argument (URL or configured remote name) and linking
//! a missing remote, using the git CLI.

use std::path::Path;
use std::process::Command;

use super::url::{parse_remote_url, RemoteUrl};
use super::TransportError;
use crate::error::GitwardError;

/// Turn `name_or_url` into a URL: either it already is one, or it names a remote
/// configured in the repository at `repo_dir`.
pub fn resolve(repo_dir: &Path, name_or_url: &str) -> Result<RemoteUrl, GitwardError> {
    if let Some(url) = parse_remote_url(name_or_url) {
        return Ok(url);
    }

    let missing = || {
        TransportError::configuration("not found; no configured remote URL").with_remote(name_or_url)
    };
    let configured = run_git(repo_dir, &["remote", "get-url", name_or_url])?.ok_or_else(missing)?;
    let url = parse_remote_url(&configured).ok_or_else(|| {
        TransportError::configuration(format!("unsupported remote URL '{}'", configured))
            .with_remote(name_or_url)
    })?;
    tracing::debug!(remote = %name_or_url, url = %url, "Resolved remote name");
    Ok(url)
}

/// Configure remote `name` with `url` in the repository at `repo_dir`.
pub fn link_remote(repo_dir: &Path, name: &str, url: &str) -> Result<(), GitwardError> {
    if parse_remote_url(url).is_none() {
        return Err(GitwardError::Config(format!(
            "'{}' is not a supported remote URL",
            url
        )));
    }
    let args = ["remote", "add", name, url];
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(repo_dir).args(args);
    let output = cmd.output()?;
    if !output.status.success() {
        return Err(GitwardError::GitCommand {
            args: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    tracing::info!(remote = %name, %url, "Linked remote");
    Ok(())
}

/// Run git in `repo_dir`. `Ok(None)` when git ran but failed or printed
/// nothing; an error only when git could not be started.
fn run_git(repo_dir: &Path, args: &[&str]) -> Result<Option<String>, GitwardError> {
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(repo_dir).args(args);
    tracing::trace!(cmd = ?cmd, "Running git command");

    let output = match cmd.output() {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(GitwardError::GitCommand {
                args: args.join(" "),
                stderr: "git not found in PATH".to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    if !output.status.success() {
        tracing::debug!(
            args = ?args,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "git command returned non-zero"
        );
        return Ok(None);
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok((!stdout.is_empty()).then_some(stdout))
}
