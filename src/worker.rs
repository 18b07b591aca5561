//! Runs a remote action off the foreground thread.
//!
//! The worker owns the authenticator and drives the retry coordinator. Its
//! dialogs travel through an `InteractionBridge`, so the foreground thread
//! must keep serving until the worker finishes.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::authenticator::Authenticator;
use crate::error::GitwardError;
use crate::interact::Interaction;
use crate::protocol;
use crate::retry::{Attempt, LogListener, RetryCoordinator};
use crate::transport::url::parse_remote_url;
use crate::transport::{self, remote, RemoteRef, Service, TransportOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Fetch,
    Pull,
    Push,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Fetch => "fetch",
            Action::Pull => "pull",
            Action::Push => "push",
        }
    }

    /// The git service whose refs the action needs.
    pub fn service(&self) -> Service {
        match self {
            Action::Fetch | Action::Pull => Service::UploadPack,
            Action::Push => Service::ReceivePack,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user-initiated remote action.
#[derive(Debug, Clone)]
pub struct Job {
    pub action: Action,
    /// Remote URL or configured remote name.
    pub remote: String,
    pub repo_dir: PathBuf,
    pub max_attempts: u32,
    pub options: TransportOptions,
}

/// Start `job` on a named worker thread.
pub fn spawn(
    job: Job,
    authenticator: Authenticator,
    interaction: Arc<dyn Interaction>,
) -> Result<JoinHandle<Result<Vec<RemoteRef>, GitwardError>>, GitwardError> {
    let handle = std::thread::Builder::new()
        .name(format!("gitward-{}", job.action))
        .spawn(move || run(&job, &authenticator, interaction))?;
    Ok(handle)
}

/// Wait for a worker started with `spawn`.
pub fn join(
    handle: JoinHandle<Result<Vec<RemoteRef>, GitwardError>>,
) -> Result<Vec<RemoteRef>, GitwardError> {
    handle
        .join()
        .map_err(|_| GitwardError::Worker("worker thread panicked".into()))?
}

/// Run `job` on the current thread under a retry coordinator.
pub fn run(
    job: &Job,
    authenticator: &Authenticator,
    interaction: Arc<dyn Interaction>,
) -> Result<Vec<RemoteRef>, GitwardError> {
    let action = job.action.as_str();
    let mut touched = None;
    let outcome = RetryCoordinator::new(authenticator, interaction, job.max_attempts)
        .with_listener(Arc::new(LogListener))
        .run(action, |attempt| {
            let result = discover(job, authenticator, attempt);
            touched = attempt.host.clone();
            result
        });

    // A protocol lives for one action; the next action starts fresh.
    if let Some(host) = touched {
        match authenticator.unbind(&host) {
            Ok(_) => tracing::debug!(%host, %action, "Released credential protocol"),
            Err(e) => tracing::warn!(%host, "Could not release credential protocol: {}", e),
        }
    }
    outcome.into_result(action)
}

fn discover(
    job: &Job,
    authenticator: &Authenticator,
    attempt: &mut Attempt,
) -> Result<Vec<RemoteRef>, GitwardError> {
    if parse_remote_url(&job.remote).is_none() {
        attempt.remote = Some(job.remote.clone());
    }
    let url = remote::resolve(&job.repo_dir, &job.remote)?;
    attempt.host = Some(url.host().to_string());

    let shared = authenticator.bind(url.host())?;
    let mut protocol = protocol::lock(&shared)?;
    protocol.set_final_attempt(attempt.last);
    let refs = transport::list_refs(&url, job.action.service(), &mut protocol, &job.options)?;
    tracing::debug!(remote = %url, scheme = url.scheme(), count = refs.len(), "Discovered refs");
    Ok(refs)
}
