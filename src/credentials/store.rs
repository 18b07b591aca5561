//! Credential storage keyed by host.
//!
//! The interactive core only ever reads from a store. Writes come from the
//! login flow (when `remember_credentials` is on) and from the
//! `gitward credentials` subcommands.
//!
//! `FileCredentialStore` persists to `credentials.toml` in the config
//! directory. Secrets are kept in plain text, so the file is written with
//! owner-only permissions on Unix and replaced atomically (tmp + rename).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{CredentialKind, CredentialRecord};
use crate::error::GitwardError;

/// Read/write access to stored credentials.
pub trait CredentialStore: Send + Sync {
    /// Look up the record for a host.
    fn get(&self, host: &str) -> Option<CredentialRecord>;

    /// Store (or replace) the record for a host.
    fn put(&self, host: &str, record: &CredentialRecord) -> Result<(), GitwardError>;

    /// Remove a host. Returns whether it existed.
    fn remove(&self, host: &str) -> Result<bool, GitwardError>;

    /// All stored hosts with their credential kind, sorted by host.
    fn hosts(&self) -> Vec<(String, CredentialKind)>;
}

/// On-disk representation of one host's credential.
#[derive(Serialize, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum StoredCredential {
    Password {
        username: String,
        password: Zeroizing<String>,
    },
    Token {
        token: Zeroizing<String>,
    },
}

impl StoredCredential {
    fn from_record(record: &CredentialRecord) -> Result<Self, GitwardError> {
        match record {
            CredentialRecord::Password { username, secret } => Ok(StoredCredential::Password {
                username: username.clone(),
                password: Zeroizing::new(secret_text(secret.expose_str())?),
            }),
            CredentialRecord::Token { token } => Ok(StoredCredential::Token {
                token: Zeroizing::new(secret_text(token.expose_str())?),
            }),
        }
    }

    fn to_record(&self) -> CredentialRecord {
        match self {
            StoredCredential::Password { username, password } => {
                CredentialRecord::password(username.clone(), password.as_str())
            }
            StoredCredential::Token { token } => CredentialRecord::token(token.as_str()),
        }
    }

    fn kind(&self) -> CredentialKind {
        match self {
            StoredCredential::Password { .. } => CredentialKind::PasswordBased,
            StoredCredential::Token { .. } => CredentialKind::TokenBased,
        }
    }
}

fn secret_text(value: Option<&str>) -> Result<String, GitwardError> {
    value
        .map(str::to_string)
        .ok_or_else(|| GitwardError::CredentialStore("secret is not valid UTF-8".into()))
}

#[derive(Serialize, Deserialize, Default)]
struct CredentialFile {
    #[serde(default)]
    hosts: BTreeMap<String, StoredCredential>,
}

/// Credential store backed by `credentials.toml`.
pub struct FileCredentialStore {
    path: PathBuf,
    data: Mutex<CredentialFile>,
}

impl FileCredentialStore {
    /// Load `credentials.toml` from the config directory.
    /// Returns an empty store if the file does not exist.
    pub fn load(config_dir: &Path) -> Result<Self, GitwardError> {
        let path = config_dir.join("credentials.toml");
        let data = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            toml::from_str(&contents).map_err(|e| {
                GitwardError::CredentialStore(format!("Invalid credentials.toml: {}", e))
            })?
        } else {
            CredentialFile::default()
        };
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    fn save(&self, data: &CredentialFile) -> Result<(), GitwardError> {
        let contents = Zeroizing::new(toml::to_string_pretty(data).map_err(|e| {
            GitwardError::CredentialStore(format!("Failed to serialize credentials: {}", e))
        })?);
        let tmp_path = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, contents.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&tmp_path, perms).map_err(|e| {
                GitwardError::CredentialStore(format!(
                    "Failed to set credential file permissions: {}",
                    e
                ))
            })?;
        }

        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CredentialFile>, GitwardError> {
        self.data
            .lock()
            .map_err(|_| GitwardError::CredentialStore("credential store lock was poisoned".into()))
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, host: &str) -> Option<CredentialRecord> {
        let data = self.lock().ok()?;
        data.hosts.get(host).map(StoredCredential::to_record)
    }

    fn put(&self, host: &str, record: &CredentialRecord) -> Result<(), GitwardError> {
        let stored = StoredCredential::from_record(record)?;
        let mut data = self.lock()?;
        data.hosts.insert(host.to_string(), stored);
        self.save(&data)?;
        tracing::debug!(host = %host, kind = record.kind().as_str(), "Stored credentials");
        Ok(())
    }

    fn remove(&self, host: &str) -> Result<bool, GitwardError> {
        let mut data = self.lock()?;
        let existed = data.hosts.remove(host).is_some();
        if existed {
            self.save(&data)?;
        }
        Ok(existed)
    }

    fn hosts(&self) -> Vec<(String, CredentialKind)> {
        match self.lock() {
            Ok(data) => data
                .hosts
                .iter()
                .map(|(host, stored)| (host.clone(), stored.kind()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// In-process credential store with no backing file.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryCredentialStore {
    records: Mutex<BTreeMap<String, CredentialRecord>>,
}

#[cfg(test)]
impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(host: &str, record: CredentialRecord) -> Self {
        let store = Self::new();
        if let Ok(mut records) = store.records.lock() {
            records.insert(host.to_string(), record);
        }
        store
    }
}

#[cfg(test)]
impl CredentialStore for MemoryCredentialStore {
    fn get(&self, host: &str) -> Option<CredentialRecord> {
        self.records.lock().ok()?.get(host).cloned()
    }

    fn put(&self, host: &str, record: &CredentialRecord) -> Result<(), GitwardError> {
        self.records
            .lock()
            .map_err(|_| GitwardError::CredentialStore("credential store lock was poisoned".into()))?
            .insert(host.to_string(), record.clone());
        Ok(())
    }

    fn remove(&self, host: &str) -> Result<bool, GitwardError> {
        Ok(self
            .records
            .lock()
            .map_err(|_| GitwardError::CredentialStore("credential store lock was poisoned".into()))?
            .remove(host)
            .is_some())
    }

    fn hosts(&self) -> Vec<(String, CredentialKind)> {
        match self.records.lock() {
            Ok(records) => records
                .iter()
                .map(|(host, record)| (host.clone(), record.kind()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}
