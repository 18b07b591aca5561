//! Failure classification for remote operations.
//!
//! `classify` maps a transport failure onto a small set of categories and a
//! remedy message. Rules are checked in priority order, first match wins,
//! against the lowercased message of the failure and of every cause in its
//! chain. A verdict is computed fresh for every failure: the same kind of
//! error can carry a different message next time.

use std::error::Error as StdError;

use crate::credentials::CredentialRecord;
use crate::transport::{DisconnectCode, TransportError, TransportErrorKind};

pub const NO_CREDENTIALS_FOUND: &str = "no credentials found";
pub const CHECK_CREDENTIALS: &str = "check your credentials";
pub const CHECK_TOKEN: &str = "check your token value and permissions";

const CREDENTIALS_INVALID_MARKERS: &[&str] = &[
    "not authorized",
    "authorization",
    "authentication not supported",
];
const INSUFFICIENT_RIGHTS_MARKERS: &[&str] = &["not permitted"];
const MISSING_REMOTE_MARKERS: &[&str] = &[
    "origin: not found",
    "origin not found",
    "no configured remote url",
];
const PASSPHRASE_MARKERS: &[&str] = &["auth fail"];
const NOT_A_REPOSITORY_MARKERS: &[&str] = &["invalid advertisement of"];
const UPLOAD_PACK_MARKER: &str = "upload-pack";
const NO_REMOTE_BRANCH_MARKERS: &[&str] = &["no matching remote branch", "couldn't find remote ref"];

/// What went wrong, from the user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    CredentialsInvalid,
    InsufficientRights,
    MissingRemote,
    PassphraseRequired,
    NotARepository,
    TransportFailure,
    Unknown,
}

impl FailureCategory {
    /// Whether new input from the user can turn this failure into a success.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureCategory::CredentialsInvalid
                | FailureCategory::InsufficientRights
                | FailureCategory::MissingRemote
                | FailureCategory::PassphraseRequired
        )
    }
}

/// A classification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub category: FailureCategory,
    pub remedy: String,
}

impl Verdict {
    fn new(category: FailureCategory, remedy: impl Into<String>) -> Self {
        Self {
            category,
            remedy: remedy.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

/// Remedy shown when credentials were rejected, matching what is held.
pub fn credentials_remedy(record: &CredentialRecord) -> String {
    match record {
        CredentialRecord::Password { username, .. } if username.is_empty() => {
            NO_CREDENTIALS_FOUND.to_string()
        }
        CredentialRecord::Password { .. } => CHECK_CREDENTIALS.to_string(),
        CredentialRecord::Token { .. } => CHECK_TOKEN.to_string(),
    }
}

/// Classify a failure. `record` is the credential currently held for the
/// host, if one is bound.
pub fn classify(failure: &TransportError, record: Option<&CredentialRecord>) -> Verdict {
    let messages = chain_messages(failure);
    let has = |markers: &[&str]| {
        messages
            .iter()
            .any(|m| markers.iter().any(|marker| m.contains(marker)))
    };
    let root = root_transport_error(failure);

    if has(CREDENTIALS_INVALID_MARKERS) {
        let remedy = record
            .map(credentials_remedy)
            .unwrap_or_else(|| NO_CREDENTIALS_FOUND.to_string());
        return Verdict::new(FailureCategory::CredentialsInvalid, remedy);
    }

    if has(INSUFFICIENT_RIGHTS_MARKERS) {
        let remedy = match record {
            Some(CredentialRecord::Password { username, .. }) if !username.is_empty() => format!(
                "user '{}' is not permitted to perform this operation",
                username
            ),
            Some(CredentialRecord::Token { .. }) => {
                "the token is not permitted to perform this operation".to_string()
            }
            _ => "you are not permitted to perform this operation".to_string(),
        };
        return Verdict::new(FailureCategory::InsufficientRights, remedy);
    }

    if has(MISSING_REMOTE_MARKERS) {
        return Verdict::new(
            FailureCategory::MissingRemote,
            "no remote repository is configured; link a remote to continue",
        );
    }

    let no_more_auth_methods =
        root.and_then(TransportError::disconnect) == Some(DisconnectCode::NoMoreAuthMethodsAvailable);
    if has(PASSPHRASE_MARKERS) || no_more_auth_methods {
        return Verdict::new(
            FailureCategory::PassphraseRequired,
            "enter the passphrase for your SSH key",
        );
    }

    let no_such_repository =
        root.map(TransportError::kind) == Some(TransportErrorKind::NoRemoteRepository);
    if no_such_repository || has(NOT_A_REPOSITORY_MARKERS) {
        let remedy = match record {
            Some(CredentialRecord::Token { .. }) => {
                "the remote URL does not point to a repository, or the token cannot access it"
            }
            _ => "the remote URL does not point to a repository, or your account cannot see it",
        };
        return Verdict::new(FailureCategory::NotARepository, remedy);
    }

    if failure.kind() == TransportErrorKind::Network {
        let remedy = if has(&[UPLOAD_PACK_MARKER]) {
            "the remote does not speak the git protocol (upload-pack failed)"
        } else {
            "the remote host could not be reached"
        };
        return Verdict::new(FailureCategory::TransportFailure, remedy);
    }

    if has(NO_REMOTE_BRANCH_MARKERS) {
        return Verdict::new(FailureCategory::Unknown, "the remote branch does not exist");
    }

    Verdict::new(
        FailureCategory::Unknown,
        format!("{}: {}", failure.kind().as_str(), failure.message()),
    )
}

/// Lowercased messages of the failure and every cause below it. Transport
/// errors contribute their message only, never the remote they name.
fn chain_messages(failure: &TransportError) -> Vec<String> {
    std::iter::successors(Some(failure as &(dyn StdError + 'static)), |e| (*e).source())
        .map(|e| match e.downcast_ref::<TransportError>() {
            Some(transport) => transport.message().to_lowercase(),
            None => e.to_string().to_lowercase(),
        })
        .collect()
}

/// The deepest `TransportError` in the cause chain.
fn root_transport_error(failure: &TransportError) -> Option<&TransportError> {
    std::iter::successors(Some(failure as &(dyn StdError + 'static)), |e| (*e).source())
        .filter_map(|e| e.downcast_ref::<TransportError>())
        .last()
}
