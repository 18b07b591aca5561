//! Interactive credential protocol for one host.
//!
//! A transport hands `get` the prompts it needs for a connection attempt and
//! calls `reset` when the server rejected what it was given. The protocol
//! answers from the credential record it holds, the shared yes/no answer
//! cache, or by asking the user through an `Interaction`.
//!
//! Lifecycle: `Created` -> `get` -> `Requested` -> `reset` -> login dialog ->
//! `Updated` or `Canceled`. `Canceled` is terminal for the instance: every
//! later `get` returns `false` without showing anything.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::classify;
use crate::credentials::CredentialRecord;
use crate::error::GitwardError;
use crate::interact::Interaction;
use crate::prompt::{Answer, Prompt, PromptAnswerCache, PromptItem};
use crate::secret::SecretBuffer;

/// A protocol instance shared between the worker driving an attempt and the
/// retry coordinator inspecting it afterwards.
pub type SharedProtocol = Arc<Mutex<CredentialProtocol>>;

/// Lock a shared protocol, converting a poisoned mutex into an error.
pub fn lock(protocol: &SharedProtocol) -> Result<MutexGuard<'_, CredentialProtocol>, GitwardError> {
    protocol
        .lock()
        .map_err(|_| GitwardError::Worker("credential protocol mutex was poisoned".into()))
}

/// Where an instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Created,
    Requested,
    Updated,
    Canceled,
}

pub struct CredentialProtocol {
    host: String,
    record: CredentialRecord,
    passphrase: Option<SecretBuffer>,
    answers: PromptAnswerCache,
    interaction: Arc<dyn Interaction>,
    was_reset: bool,
    user_canceled: bool,
    asked_once: bool,
    passphrase_declined: bool,
    refreshed: bool,
    updated: bool,
    final_attempt: bool,
}

impl CredentialProtocol {
    pub fn new(
        host: impl Into<String>,
        record: CredentialRecord,
        answers: PromptAnswerCache,
        interaction: Arc<dyn Interaction>,
    ) -> Self {
        Self {
            host: host.into(),
            record,
            passphrase: None,
            answers,
            interaction,
            was_reset: false,
            user_canceled: false,
            asked_once: false,
            passphrase_declined: false,
            refreshed: false,
            updated: false,
            final_attempt: false,
        }
    }

    pub fn credentials(&self) -> &CredentialRecord {
        &self.record
    }

    /// Answer a sequence of prompts.
    ///
    /// Returns `Ok(true)` when every prompt received a usable answer and
    /// `Ok(false)` as soon as one could not be answered (or the user already
    /// gave up on this instance). A `FreeText` prompt is a contract violation
    /// and fails with `UnsupportedPrompt` before any dialog is shown.
    pub fn get(&mut self, items: &mut [PromptItem]) -> Result<bool, GitwardError> {
        if self.user_canceled {
            tracing::debug!(host = %self.host, "Credentials were canceled; not answering prompts");
            return Ok(false);
        }

        if let Some(text) = items.iter().find_map(|item| match &item.prompt {
            Prompt::FreeText { text } => Some(text.clone()),
            _ => None,
        }) {
            return Err(GitwardError::UnsupportedPrompt { text });
        }

        for item in items.iter_mut() {
            let satisfied = match item.prompt.clone() {
                Prompt::Username => self.answer_username(item),
                Prompt::Secret => self.answer_secret(item),
                Prompt::Passphrase { text } => self.answer_passphrase(&text, item),
                Prompt::YesNo { text } => self.answer_yes_no(&text, item),
                Prompt::FreeText { text } => {
                    return Err(GitwardError::UnsupportedPrompt { text });
                }
            };
            if !satisfied {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// The server rejected the last answers.
    ///
    /// If credentials were already requested from this instance and the user
    /// has not given up, shows the login dialog with a message matching the
    /// credentials held. Confirming replaces the record; dismissing cancels
    /// the instance for good. On the final allowed attempt nothing could use
    /// new credentials, so no dialog is shown.
    pub fn reset(&mut self) {
        self.was_reset = true;
        self.forget_passphrase();

        if self.final_attempt {
            tracing::debug!(host = %self.host, "Reset on final attempt; not prompting");
            return;
        }
        if !self.asked_once || self.user_canceled {
            tracing::debug!(host = %self.host, asked = self.asked_once, "Reset without prompting");
            return;
        }

        let message = classify::credentials_remedy(&self.record);
        match self.interaction.show_login(&self.host, &message) {
            Some(record) => {
                tracing::debug!(host = %self.host, kind = record.kind().as_str(), "Credentials replaced");
                self.replace_credentials(record);
            }
            None => {
                tracing::info!(host = %self.host, "Login dialog dismissed; giving up on host");
                self.cancel();
            }
        }
    }

    /// Install credentials obtained outside the protocol (e.g. by the retry
    /// coordinator's own login dialog).
    pub fn replace_credentials(&mut self, record: CredentialRecord) {
        self.record = record;
        self.refreshed = true;
        self.updated = true;
    }

    /// Latch the canceled state. There is no way back.
    pub fn cancel(&mut self) {
        self.user_canceled = true;
    }

    /// Mark whether the attempt using this instance is the last one allowed.
    pub fn set_final_attempt(&mut self, last: bool) {
        self.final_attempt = last;
    }

    pub fn user_canceled(&self) -> bool {
        self.user_canceled
    }

    pub fn was_reset(&self) -> bool {
        self.was_reset
    }

    /// Whether the credentials were replaced since the last call.
    pub fn take_refreshed(&mut self) -> bool {
        std::mem::take(&mut self.refreshed)
    }

    /// Hold a passphrase for the next passphrase prompt.
    pub fn supply_passphrase(&mut self, passphrase: SecretBuffer) {
        self.passphrase_declined = !passphrase.is_usable();
        self.passphrase = Some(passphrase);
    }

    /// Drop a held passphrase that turned out to be wrong.
    pub fn forget_passphrase(&mut self) {
        if let Some(mut stale) = self.passphrase.take() {
            stale.clear();
        }
    }

    /// Whether the last passphrase dialog was canceled or left empty.
    pub fn passphrase_declined(&self) -> bool {
        self.passphrase_declined
    }

    pub fn state(&self) -> ProtocolState {
        if self.user_canceled {
            ProtocolState::Canceled
        } else if self.updated {
            ProtocolState::Updated
        } else if self.asked_once {
            ProtocolState::Requested
        } else {
            ProtocolState::Created
        }
    }

    fn answer_username(&mut self, item: &mut PromptItem) -> bool {
        self.asked_once = true;
        match &self.record {
            CredentialRecord::Password { username, .. } => {
                item.answer = Some(Answer::Text(username.clone()));
                !username.is_empty()
            }
            CredentialRecord::Token { token } => {
                item.answer = Some(Answer::Token(token.clone()));
                token.is_usable()
            }
        }
    }

    fn answer_secret(&mut self, item: &mut PromptItem) -> bool {
        self.asked_once = true;
        match &self.record {
            CredentialRecord::Password { username, secret } => {
                item.answer = Some(Answer::Secret(secret.clone()));
                !username.is_empty() && secret.is_usable()
            }
            CredentialRecord::Token { token } => {
                item.answer = Some(Answer::Token(token.clone()));
                token.is_usable()
            }
        }
    }

    fn answer_passphrase(&mut self, text: &str, item: &mut PromptItem) -> bool {
        if let Some(held) = self.passphrase.as_ref().filter(|p| p.is_usable()) {
            item.answer = Some(Answer::Secret(held.clone()));
            return true;
        }

        let answer = self.interaction.show_passphrase(text);
        self.asked_once = true;
        let usable = answer.as_ref().is_some_and(SecretBuffer::is_usable);
        self.passphrase_declined = !usable;
        if usable {
            item.answer = answer.clone().map(Answer::Secret);
        }
        self.passphrase = answer;
        usable
    }

    fn answer_yes_no(&mut self, text: &str, item: &mut PromptItem) -> bool {
        let answer = match self.answers.lookup(&self.host, text) {
            Some(cached) => {
                tracing::debug!(host = %self.host, "Answered prompt from cache");
                cached
            }
            None => {
                let answer = self.interaction.show_yes_no(&self.host, text);
                self.answers.store(&self.host, text, answer);
                answer
            }
        };
        item.answer = Some(Answer::Flag(answer));
        answer
    }
}
