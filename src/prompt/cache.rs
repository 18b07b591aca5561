//! Remembered answers to yes/no prompts.
//!
//! `PromptAnswerCache` is shared by every protocol instance in the process
//! and keyed by the exact prompt text, so a host key question answered once
//! is never asked again in the same run. It can be backed by an
//! `AnswerStore`, a JSON file (`host_answers.json`) in the config directory
//! keyed by host and then prompt text, so answers also survive restarts.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GitwardError;

/// A persisted answer.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StoredAnswer {
    pub answer: bool,
    /// When the question was first answered.
    pub answered_at: DateTime<Utc>,
}

/// Persistent store of yes/no answers, grouped by host.
///
/// Uses atomic writes (write to `.tmp`, then rename).
#[derive(Serialize, Deserialize)]
pub struct AnswerStore {
    hosts: BTreeMap<String, BTreeMap<String, StoredAnswer>>,
    #[serde(skip)]
    path: PathBuf,
}

impl AnswerStore {
    /// Load the store from `config_dir/host_answers.json`.
    /// Returns an empty store if the file does not exist, and starts fresh
    /// (with a warning) if it is corrupted.
    pub fn load(config_dir: &Path) -> Result<Self, GitwardError> {
        let path = config_dir.join("host_answers.json");

        if !path.exists() {
            return Ok(Self {
                hosts: BTreeMap::new(),
                path,
            });
        }

        let data = std::fs::read_to_string(&path).map_err(|e| {
            GitwardError::AnswerStore(format!("Failed to read host answers: {}", e))
        })?;
        match serde_json::from_str::<AnswerStore>(&data) {
            Ok(mut store) => {
                store.path = path;
                Ok(store)
            }
            Err(e) => {
                tracing::warn!(
                    "Host answer store corrupted ({}), starting fresh. \
                     Host trust questions will be asked again.",
                    e
                );
                Ok(Self {
                    hosts: BTreeMap::new(),
                    path,
                })
            }
        }
    }

    /// Save the store to disk using atomic write.
    pub fn save(&self) -> Result<(), GitwardError> {
        let tmp_path = self.path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(&self).map_err(|e| {
            GitwardError::AnswerStore(format!("Failed to serialize host answers: {}", e))
        })?;
        std::fs::write(&tmp_path, &json).map_err(|e| {
            GitwardError::AnswerStore(format!("Failed to write host answers: {}", e))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            GitwardError::AnswerStore(format!("Failed to save host answers: {}", e))
        })?;

        Ok(())
    }

    pub fn get(&self, host: &str, text: &str) -> Option<bool> {
        self.hosts
            .get(host)
            .and_then(|answers| answers.get(text))
            .map(|stored| stored.answer)
    }

    /// Record an answer. The first-answered timestamp is kept on overwrite.
    pub fn put(&mut self, host: &str, text: &str, answer: bool) {
        let answers = self.hosts.entry(host.to_string()).or_default();
        match answers.get_mut(text) {
            Some(existing) => existing.answer = answer,
            None => {
                answers.insert(
                    text.to_string(),
                    StoredAnswer {
                        answer,
                        answered_at: Utc::now(),
                    },
                );
            }
        }
    }

    /// All stored answers as `(host, prompt text, answer)`, sorted.
    pub fn list(&self) -> Vec<(&str, &str, &StoredAnswer)> {
        self.hosts
            .iter()
            .flat_map(|(host, answers)| {
                answers
                    .iter()
                    .map(move |(text, stored)| (host.as_str(), text.as_str(), stored))
            })
            .collect()
    }

    /// Forget every stored answer. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let count = self.hosts.values().map(BTreeMap::len).sum();
        self.hosts.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.hosts.values().map(BTreeMap::len).sum()
    }
}

/// Process-wide memo of yes/no answers keyed by exact prompt text.
///
/// Cloning yields another handle to the same cache.
#[derive(Clone, Default)]
pub struct PromptAnswerCache {
    answers: Arc<RwLock<HashMap<String, bool>>>,
    persisted: Option<Arc<Mutex<AnswerStore>>>,
}

impl PromptAnswerCache {
    /// A cache that lives only as long as the process.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that also reads from and writes through to `store`.
    pub fn with_store(store: AnswerStore) -> Self {
        Self {
            answers: Arc::default(),
            persisted: Some(Arc::new(Mutex::new(store))),
        }
    }

    /// Cached answer for `text`, or `None` if it was never answered.
    ///
    /// `host` only scopes the persisted lookup; the in-memory cache is keyed
    /// by text alone.
    pub fn lookup(&self, host: &str, text: &str) -> Option<bool> {
        if let Some(answer) = self
            .answers
            .read()
            .ok()
            .and_then(|answers| answers.get(text).copied())
        {
            return Some(answer);
        }

        let persisted = self.persisted.as_ref()?;
        let answer = persisted.lock().ok()?.get(host, text)?;
        if let Ok(mut answers) = self.answers.write() {
            answers.insert(text.to_string(), answer);
        }
        Some(answer)
    }

    /// Remember an answer. Storing the same text again overwrites it.
    pub fn store(&self, host: &str, text: &str, answer: bool) {
        if let Ok(mut answers) = self.answers.write() {
            answers.insert(text.to_string(), answer);
        }

        if let Some(persisted) = &self.persisted {
            match persisted.lock() {
                Ok(mut store) => {
                    store.put(host, text, answer);
                    if let Err(e) = store.save() {
                        tracing::warn!("Could not persist host answer: {}", e);
                    }
                }
                Err(_) => tracing::warn!("Host answer store lock was poisoned; answer not saved"),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.answers.read().map(|answers| answers.len()).unwrap_or(0)
    }
}
