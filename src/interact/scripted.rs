//! Test double that answers dialogs from a script and records every call.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::Interaction;
use crate::credentials::CredentialRecord;
use crate::secret::SecretBuffer;

/// A recorded dialog invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Login { host: String, message: String },
    Passphrase { message: String },
    YesNo { text: String },
    Error { message: String },
    LinkRemote { remote: String },
}

#[derive(Default)]
pub struct ScriptedInteraction {
    logins: Mutex<VecDeque<Option<CredentialRecord>>>,
    passphrases: Mutex<VecDeque<Option<String>>>,
    yes_no: Mutex<VecDeque<bool>>,
    link_remote: Mutex<VecDeque<bool>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(self, answer: Option<CredentialRecord>) -> Self {
        self.logins.lock().unwrap().push_back(answer);
        self
    }

    pub fn passphrase(self, answer: Option<&str>) -> Self {
        self.passphrases
            .lock()
            .unwrap()
            .push_back(answer.map(str::to_string));
        self
    }

    pub fn yes_no(self, answer: bool) -> Self {
        self.yes_no.lock().unwrap().push_back(answer);
        self
    }

    pub fn link_remote(self, answer: bool) -> Self {
        self.link_remote.lock().unwrap().push_back(answer);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Interaction for ScriptedInteraction {
    fn show_login(&self, host: &str, message: &str) -> Option<CredentialRecord> {
        self.record(Call::Login {
            host: host.to_string(),
            message: message.to_string(),
        });
        self.logins.lock().unwrap().pop_front().flatten()
    }

    fn show_passphrase(&self, message: &str) -> Option<SecretBuffer> {
        self.record(Call::Passphrase {
            message: message.to_string(),
        });
        self.passphrases
            .lock()
            .unwrap()
            .pop_front()
            .flatten()
            .map(SecretBuffer::from_string)
    }

    fn show_yes_no(&self, _title: &str, text: &str) -> bool {
        self.record(Call::YesNo {
            text: text.to_string(),
        });
        self.yes_no.lock().unwrap().pop_front().unwrap_or(false)
    }

    fn show_error(&self, message: &str) {
        self.record(Call::Error {
            message: message.to_string(),
        });
    }

    fn show_link_remote(&self, remote: &str) -> bool {
        self.record(Call::LinkRemote {
            remote: remote.to_string(),
        });
        self.link_remote.lock().unwrap().pop_front().unwrap_or(false)
    }
}
