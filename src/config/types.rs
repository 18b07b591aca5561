use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::paths::default_identity_files;
use crate::error::GitwardError;
use crate::retry::DEFAULT_MAX_ATTEMPTS;

/// Verbosity level controlling tracing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Suppress all output except errors
    Quiet,
    /// Normal output (info level)
    Normal,
    /// Verbose output (debug level)
    Verbose,
    /// Maximum output (trace level)
    Trace,
}

impl From<(bool, u8)> for Verbosity {
    /// Convert from (quiet_flag, verbose_count) to Verbosity.
    ///
    /// - quiet=true -> Quiet (regardless of verbose count)
    /// - verbose=0  -> Normal
    /// - verbose=1  -> Verbose
    /// - verbose=2+ -> Trace
    fn from((quiet, verbose_count): (bool, u8)) -> Self {
        if quiet {
            Verbosity::Quiet
        } else {
            match verbose_count {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}

impl Verbosity {
    /// Return the tracing filter string for this verbosity level.
    pub fn as_tracing_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::Trace => "trace",
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Settings read from `config.toml`. Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitwardConfig {
    /// Attempts per operation, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Connect and read timeout for transports.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Persist yes/no answers (host keys) across runs.
    #[serde(default = "default_true")]
    pub remember_host_answers: bool,

    /// Save credentials typed into the login dialog.
    #[serde(default)]
    pub remember_credentials: bool,

    /// Ask git's credential helpers when nothing is stored for a host.
    #[serde(default = "default_true")]
    pub use_git_credential_helper: bool,

    /// SSH private keys to try, in order.
    #[serde(default = "default_identity_files")]
    pub identity_files: Vec<PathBuf>,
}

impl Default for GitwardConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
            remember_host_answers: true,
            remember_credentials: false,
            use_git_credential_helper: true,
            identity_files: default_identity_files(),
        }
    }
}

impl GitwardConfig {
    /// Load `config.toml` from `config_dir`; defaults when the file is absent.
    pub fn load(config_dir: &Path) -> Result<Self, GitwardError> {
        let path = config_dir.join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        let mut config: Self = toml::from_str(&contents)
            .map_err(|e| GitwardError::Config(format!("Invalid config.toml: {}", e)))?;
        config.max_attempts = config.max_attempts.max(1);
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
