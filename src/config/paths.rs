//! Config directory resolution.
//!
//! `$GITWARD_CONFIG_DIR` wins when set; otherwise the platform config
//! directory from `dirs` with a `gitward` subdirectory:
//! - Linux:   `~/.config/gitward/`
//! - Windows: `%APPDATA%\gitward\`
//! - macOS:   `~/Library/Application Support/gitward/`

use std::path::PathBuf;

use crate::error::GitwardError;

pub const CONFIG_DIR_ENV: &str = "GITWARD_CONFIG_DIR";

/// Get the gitward config directory, creating it if needed.
pub fn gitward_config_dir() -> Result<PathBuf, GitwardError> {
    let dir = match std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::config_dir()
            .ok_or_else(|| GitwardError::Config("Could not determine config directory".into()))?
            .join("gitward"),
    };
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

/// Default SSH identity files, in the order they are tried.
pub fn default_identity_files() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|home| {
            let ssh_dir = home.join(".ssh");
            vec![
                ssh_dir.join("id_ed25519"),
                ssh_dir.join("id_rsa"),
                ssh_dir.join("id_ecdsa"),
            ]
        })
        .unwrap_or_default()
}
