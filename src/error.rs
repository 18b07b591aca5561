use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum GitwardError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential store error: {0}")]
    CredentialStore(String),

    #[error("Host answer store error: {0}")]
    AnswerStore(String),

    /// The transport issued a prompt the credential protocol does not answer.
    #[error("Unsupported prompt from transport: {text:?}")]
    UnsupportedPrompt { text: String },

    #[error("{0}")]
    Remote(#[from] TransportError),

    #[error("git {args} failed: {stderr}")]
    GitCommand { args: String, stderr: String },

    #[error("{action} failed: {message}")]
    OperationFailed { action: String, message: String },

    #[error("{action} aborted")]
    Aborted { action: String, reason: String },

    #[error("Worker error: {0}")]
    Worker(String),
}

impl GitwardError {
    /// Returns a user-friendly suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            GitwardError::Config(_) => {
                Some("Check config.toml in the gitward config directory (see GITWARD_CONFIG_DIR).")
            }
            GitwardError::CredentialStore(_) => {
                Some("Check credentials.toml, or re-add the host with `gitward credentials set`.")
            }
            GitwardError::AnswerStore(_) => {
                Some("Run `gitward trust reset` to discard stored host answers.")
            }
            GitwardError::UnsupportedPrompt { .. } => {
                Some("The remote asked for input gitward cannot provide. Try the git CLI directly.")
            }
            GitwardError::GitCommand { .. } => {
                Some("Check that git is installed and --repo points at a git repository.")
            }
            GitwardError::Aborted { reason, .. } => Some(reason.as_str()),
            GitwardError::Remote(_) => {
                Some("Check the remote URL and that the host is reachable.")
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for GitwardError {
    fn from(err: serde_json::Error) -> Self {
        GitwardError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for GitwardError {
    fn from(err: toml::ser::Error) -> Self {
        GitwardError::Config(format!("TOML serialization error: {}", err))
    }
}
