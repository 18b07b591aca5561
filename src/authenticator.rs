//! Owns one credential protocol per host for the lifetime of a command.
//!
//! Built once by the composition root and passed to whoever needs it.
//! `bind` hands out the protocol for a host, creating it from the
//! credential store, else the platform fallback, else an empty record.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::credentials::{CredentialRecord, CredentialStore, PlatformCredentials};
use crate::error::GitwardError;
use crate::interact::Interaction;
use crate::prompt::PromptAnswerCache;
use crate::protocol::{CredentialProtocol, SharedProtocol};

pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    fallback: Arc<dyn PlatformCredentials>,
    answers: PromptAnswerCache,
    interaction: Arc<dyn Interaction>,
    bound: Mutex<HashMap<String, SharedProtocol>>,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        fallback: Arc<dyn PlatformCredentials>,
        answers: PromptAnswerCache,
        interaction: Arc<dyn Interaction>,
    ) -> Self {
        Self {
            store,
            fallback,
            answers,
            interaction,
            bound: Mutex::new(HashMap::new()),
        }
    }

    /// The protocol for `host`, created on first use.
    pub fn bind(&self, host: &str) -> Result<SharedProtocol, GitwardError> {
        let mut bound = self.lock()?;
        if let Some(existing) = bound.get(host) {
            return Ok(Arc::clone(existing));
        }

        let record = self.initial_record(host);
        tracing::debug!(%host, kind = record.kind().as_str(), "Binding credential protocol");
        let protocol = Arc::new(Mutex::new(CredentialProtocol::new(
            host,
            record,
            self.answers.clone(),
            Arc::clone(&self.interaction),
        )));
        bound.insert(host.to_string(), Arc::clone(&protocol));
        Ok(protocol)
    }

    /// Forget the protocol for `host`. The next `bind` starts fresh.
    pub fn unbind(&self, host: &str) -> Result<bool, GitwardError> {
        Ok(self.lock()?.remove(host).is_some())
    }

    pub fn bound(&self, host: &str) -> Option<SharedProtocol> {
        self.bound.lock().ok()?.get(host).cloned()
    }

    fn initial_record(&self, host: &str) -> CredentialRecord {
        if let Some(record) = self.store.get(host) {
            tracing::debug!(%host, "Using stored credentials");
            return record;
        }
        if let Some(record) = self.fallback.lookup(host) {
            tracing::debug!(%host, "Using platform credentials");
            return record;
        }
        CredentialRecord::empty()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, SharedProtocol>>, GitwardError> {
        self.bound
            .lock()
            .map_err(|_| GitwardError::Worker("authenticator mutex was poisoned".into()))
    }
}
