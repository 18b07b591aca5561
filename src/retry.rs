//! Runs one remote action with bounded, user-driven retries.
//!
//! A failed attempt is classified; a retryable category asks the user for
//! whatever can fix it (new credentials, a key passphrase, a remote URL) and
//! runs the action again. Listeners hear `started` once and `finished` once
//! per call, however many attempts happened in between.

use std::sync::Arc;

use crate::authenticator::Authenticator;
use crate::classify::{classify, FailureCategory, Verdict};
use crate::error::GitwardError;
use crate::interact::Interaction;
use crate::protocol::{self, SharedProtocol};

/// Default bound on attempts per user-initiated action.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What an attempt learned about its target, read by the coordinator when
/// the attempt fails.
#[derive(Debug, Default, Clone)]
pub struct Attempt {
    /// 1-based attempt number.
    pub number: u32,
    /// Host whose credential protocol the attempt used.
    pub host: Option<String>,
    /// Remote name given by the user, if it was a name and not a URL.
    pub remote: Option<String>,
    /// This is the last attempt the coordinator allows. A failure now is
    /// final, so nothing should ask the user for new input.
    pub last: bool,
}

/// Terminal event reported to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Succeeded,
    Failed {
        category: Option<FailureCategory>,
        message: String,
    },
    Aborted {
        category: FailureCategory,
    },
}

pub trait OperationListener: Send + Sync {
    fn started(&self, action: &str);
    fn finished(&self, action: &str, completion: &Completion);
}

/// Logs operation start and end.
pub struct LogListener;

impl OperationListener for LogListener {
    fn started(&self, action: &str) {
        tracing::info!(%action, "Operation started");
    }

    fn finished(&self, action: &str, completion: &Completion) {
        match completion {
            Completion::Succeeded => tracing::info!(%action, "Operation succeeded"),
            Completion::Failed { category, message } => {
                tracing::warn!(%action, ?category, %message, "Operation failed")
            }
            Completion::Aborted { category } => {
                tracing::info!(%action, ?category, "Operation aborted by user")
            }
        }
    }
}

/// Result of a coordinated run.
#[derive(Debug)]
pub enum Outcome<T> {
    Succeeded(T),
    /// `verdict` is `None` when the failure was not a remote failure at all
    /// (a contract violation such as an unsupported prompt).
    Failed {
        verdict: Option<Verdict>,
        error: GitwardError,
    },
    /// The user declined the dialog that could have fixed the failure.
    Aborted { verdict: Verdict },
}

impl<T> Outcome<T> {
    pub fn completion(&self) -> Completion {
        match self {
            Outcome::Succeeded(_) => Completion::Succeeded,
            Outcome::Failed { verdict, error } => Completion::Failed {
                category: verdict.as_ref().map(|v| v.category),
                message: failure_message(verdict.as_ref(), error),
            },
            Outcome::Aborted { verdict } => Completion::Aborted {
                category: verdict.category,
            },
        }
    }

    pub fn into_result(self, action: &str) -> Result<T, GitwardError> {
        match self {
            Outcome::Succeeded(value) => Ok(value),
            Outcome::Failed {
                verdict: Some(verdict),
                error,
            } => Err(GitwardError::OperationFailed {
                action: action.to_string(),
                message: failure_message(Some(&verdict), &error),
            }),
            Outcome::Failed {
                verdict: None,
                error,
            } => Err(error),
            Outcome::Aborted { verdict } => Err(GitwardError::Aborted {
                action: action.to_string(),
                reason: verdict.remedy,
            }),
        }
    }
}

fn failure_message(verdict: Option<&Verdict>, error: &GitwardError) -> String {
    match verdict {
        Some(v) if v.category == FailureCategory::Unknown => v.remedy.clone(),
        Some(v) => format!("{} ({})", v.remedy, error),
        None => error.to_string(),
    }
}

enum Remedy {
    Retry,
    Abort,
    GiveUp,
}

pub struct RetryCoordinator<'a> {
    authenticator: &'a Authenticator,
    interaction: Arc<dyn Interaction>,
    max_attempts: u32,
    listeners: Vec<Arc<dyn OperationListener>>,
}

impl<'a> RetryCoordinator<'a> {
    pub fn new(
        authenticator: &'a Authenticator,
        interaction: Arc<dyn Interaction>,
        max_attempts: u32,
    ) -> Self {
        Self {
            authenticator,
            interaction,
            max_attempts: max_attempts.max(1),
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn OperationListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Run `op` until it succeeds, fails terminally, the user declines a
    /// remedy, or `max_attempts` invocations have been made.
    pub fn run<T>(
        &self,
        action: &str,
        mut op: impl FnMut(&mut Attempt) -> Result<T, GitwardError>,
    ) -> Outcome<T> {
        for listener in &self.listeners {
            listener.started(action);
        }

        let mut attempt = Attempt::default();
        let outcome = loop {
            attempt.number += 1;
            attempt.last = attempt.number >= self.max_attempts;
            tracing::debug!(%action, attempt = attempt.number, last = attempt.last, "Running attempt");

            let error = match op(&mut attempt) {
                Ok(value) => break Outcome::Succeeded(value),
                Err(error) => error,
            };

            let GitwardError::Remote(remote) = &error else {
                tracing::error!(%action, attempt = attempt.number, "Attempt failed: {}", error);
                break Outcome::Failed {
                    verdict: None,
                    error,
                };
            };

            let bound = attempt
                .host
                .as_deref()
                .and_then(|host| self.authenticator.bound(host));
            let (record, state, was_reset) = match bound.as_ref().map(protocol::lock) {
                Some(Ok(protocol)) => (
                    Some(protocol.credentials().clone()),
                    Some(protocol.state()),
                    protocol.was_reset(),
                ),
                _ => (None, None, false),
            };
            tracing::debug!(host = ?attempt.host, ?state, was_reset, "Protocol after failed attempt");
            let verdict = classify(remote, record.as_ref());
            tracing::info!(
                %action,
                attempt = attempt.number,
                category = ?verdict.category,
                "Attempt failed: {}",
                remote
            );

            if !verdict.is_retryable() || attempt.last {
                break Outcome::Failed {
                    verdict: Some(verdict),
                    error,
                };
            }

            match self.remedy(&verdict, &attempt, bound.as_ref()) {
                Ok(Remedy::Retry) => continue,
                Ok(Remedy::Abort) => break Outcome::Aborted { verdict },
                Ok(Remedy::GiveUp) => {
                    break Outcome::Failed {
                        verdict: Some(verdict),
                        error,
                    }
                }
                Err(remedy_error) => {
                    break Outcome::Failed {
                        verdict: None,
                        error: remedy_error,
                    }
                }
            }
        };

        let completion = outcome.completion();
        if let Completion::Failed { message, .. } = &completion {
            self.interaction.show_error(message);
        }
        for listener in &self.listeners {
            listener.finished(action, &completion);
        }
        outcome
    }

    /// Ask the user for whatever the verdict needs.
    fn remedy(
        &self,
        verdict: &Verdict,
        attempt: &Attempt,
        bound: Option<&SharedProtocol>,
    ) -> Result<Remedy, GitwardError> {
        match verdict.category {
            FailureCategory::CredentialsInvalid | FailureCategory::InsufficientRights => {
                let (Some(host), Some(shared)) = (attempt.host.as_deref(), bound) else {
                    return Ok(Remedy::GiveUp);
                };
                {
                    let mut protocol = protocol::lock(shared)?;
                    if protocol.user_canceled() {
                        return Ok(Remedy::Abort);
                    }
                    // The transport's reset already collected new credentials.
                    if protocol.take_refreshed() {
                        return Ok(Remedy::Retry);
                    }
                }

                let answer = self.interaction.show_login(host, &verdict.remedy);
                let mut protocol = protocol::lock(shared)?;
                match answer {
                    Some(record) => {
                        protocol.replace_credentials(record);
                        protocol.take_refreshed();
                        Ok(Remedy::Retry)
                    }
                    None => {
                        protocol.cancel();
                        Ok(Remedy::Abort)
                    }
                }
            }

            FailureCategory::PassphraseRequired => {
                let Some(shared) = bound else {
                    return Ok(Remedy::GiveUp);
                };
                {
                    let protocol = protocol::lock(shared)?;
                    if protocol.user_canceled() || protocol.passphrase_declined() {
                        return Ok(Remedy::Abort);
                    }
                }

                match self.interaction.show_passphrase(&verdict.remedy) {
                    Some(passphrase) if passphrase.is_usable() => {
                        protocol::lock(shared)?.supply_passphrase(passphrase);
                        Ok(Remedy::Retry)
                    }
                    Some(mut empty) => {
                        empty.clear();
                        Ok(Remedy::Abort)
                    }
                    None => Ok(Remedy::Abort),
                }
            }

            FailureCategory::MissingRemote => {
                let Some(remote) = attempt.remote.as_deref() else {
                    return Ok(Remedy::GiveUp);
                };
                if self.interaction.show_link_remote(remote) {
                    Ok(Remedy::Retry)
                } else {
                    Ok(Remedy::Abort)
                }
            }

            FailureCategory::NotARepository
            | FailureCategory::TransportFailure
            | FailureCategory::Unknown => Ok(Remedy::GiveUp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::NO_CREDENTIALS_FOUND;
    use crate::credentials::{
        CredentialRecord, MemoryCredentialStore, NoPlatformCredentials,
    };
    use crate::interact::scripted::{Call, ScriptedInteraction};
    use crate::prompt::{items, Prompt, PromptAnswerCache};
    use crate::transport::TransportError;
    use std::sync::Mutex;

    const HOST: &str = "git.example.com";

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl OperationListener for Recorder {
        fn started(&self, action: &str) {
            self.events.lock().unwrap().push(format!("started {}", action));
        }

        fn finished(&self, action: &str, completion: &Completion) {
            let label = match completion {
                Completion::Succeeded => "succeeded",
                Completion::Failed { .. } => "failed",
                Completion::Aborted { .. } => "aborted",
            };
            self.events
                .lock()
                .unwrap()
                .push(format!("finished {} {}", action, label));
        }
    }

    struct Fixture {
        ui: Arc<ScriptedInteraction>,
        auth: Authenticator,
        recorder: Arc<Recorder>,
    }

    impl Fixture {
        fn new(ui: ScriptedInteraction) -> Self {
            Self::build(MemoryCredentialStore::new(), ui)
        }

        fn with_stored(record: CredentialRecord, ui: ScriptedInteraction) -> Self {
            Self::build(MemoryCredentialStore::with(HOST, record), ui)
        }

        fn build(store: MemoryCredentialStore, ui: ScriptedInteraction) -> Self {
            let ui = Arc::new(ui);
            let auth = Authenticator::new(
                Arc::new(store),
                Arc::new(NoPlatformCredentials),
                PromptAnswerCache::new(),
                ui.clone(),
            );
            Self {
                ui,
                auth,
                recorder: Arc::new(Recorder::default()),
            }
        }

        fn coordinator(&self, max_attempts: u32) -> RetryCoordinator<'_> {
            RetryCoordinator::new(&self.auth, self.ui.clone(), max_attempts)
                .with_listener(self.recorder.clone())
        }
    }

    fn not_authorized() -> GitwardError {
        TransportError::authentication("remote: not authorized").into()
    }

    /// Fails with "not authorized" until the protocol holds a username.
    fn needs_login<'a>(
        auth: &'a Authenticator,
        invocations: &'a Mutex<u32>,
    ) -> impl FnMut(&mut Attempt) -> Result<&'static str, GitwardError> + 'a {
        move |attempt| {
            *invocations.lock().unwrap() += 1;
            attempt.host = Some(HOST.to_string());
            let shared = auth.bind(HOST)?;
            let protocol = protocol::lock(&shared)?;
            match protocol.credentials().username() {
                Some(user) if !user.is_empty() => Ok("refs"),
                _ => Err(not_authorized()),
            }
        }
    }

    #[test]
    fn not_authorized_with_no_credentials_retries_once_after_login() {
        let fx = Fixture::new(
            ScriptedInteraction::new().login(Some(CredentialRecord::password("ann", "pw"))),
        );
        let invocations = Mutex::new(0);
        let outcome = fx.coordinator(3).run("fetch", needs_login(&fx.auth, &invocations));

        assert!(matches!(outcome, Outcome::Succeeded("refs")));
        assert_eq!(*invocations.lock().unwrap(), 2);
        assert_eq!(
            fx.ui.calls(),
            vec![Call::Login {
                host: HOST.into(),
                message: NO_CREDENTIALS_FOUND.into(),
            }]
        );
        assert_eq!(
            fx.recorder.events(),
            vec!["started fetch", "finished fetch succeeded"]
        );
    }

    #[test]
    fn missing_remote_offers_link_not_login() {
        let fx = Fixture::new(ScriptedInteraction::new().link_remote(true));
        let mut linked = false;
        let outcome = fx.coordinator(3).run("pull", |attempt| {
            attempt.remote = Some("origin".into());
            if linked {
                Ok(())
            } else {
                linked = true;
                Err(TransportError::configuration("origin: not found").into())
            }
        });

        assert!(matches!(outcome, Outcome::Succeeded(())));
        assert_eq!(
            fx.ui.calls(),
            vec![Call::LinkRemote {
                remote: "origin".into()
            }]
        );
    }

    #[test]
    fn never_exceeds_max_attempts() {
        let mut ui = ScriptedInteraction::new();
        for _ in 0..10 {
            ui = ui.login(Some(CredentialRecord::password("ann", "wrong")));
        }
        let fx = Fixture::new(ui);
        let mut invocations = 0;
        let outcome = fx.coordinator(3).run("push", |attempt| {
            invocations += 1;
            attempt.host = Some(HOST.to_string());
            fx.auth.bind(HOST)?;
            Err::<(), _>(not_authorized())
        });

        assert_eq!(invocations, 3);
        match outcome {
            Outcome::Failed {
                verdict: Some(verdict),
                ..
            } => assert_eq!(verdict.category, FailureCategory::CredentialsInvalid),
            other => panic!("Expected failure, got {:?}", other),
        }
        assert_eq!(fx.ui.count(|c| matches!(c, Call::Login { .. })), 2);
        assert_eq!(fx.ui.count(|c| matches!(c, Call::Error { .. })), 1);
        assert_eq!(
            fx.recorder.events(),
            vec!["started push", "finished push failed"]
        );
    }

    #[test]
    fn dismissed_login_aborts_without_error_dialog() {
        let fx = Fixture::new(ScriptedInteraction::new().login(None));
        let invocations = Mutex::new(0);
        let outcome = fx.coordinator(3).run("fetch", needs_login(&fx.auth, &invocations));

        assert!(matches!(
            outcome,
            Outcome::Aborted {
                verdict: Verdict {
                    category: FailureCategory::CredentialsInvalid,
                    ..
                }
            }
        ));
        assert_eq!(*invocations.lock().unwrap(), 1);
        assert_eq!(fx.ui.count(|c| matches!(c, Call::Error { .. })), 0);
        let shared = fx.auth.bound(HOST).unwrap();
        assert!(protocol::lock(&shared).unwrap().user_canceled());
        assert_eq!(
            fx.recorder.events(),
            vec!["started fetch", "finished fetch aborted"]
        );
    }

    #[test]
    fn credentials_refreshed_by_transport_reset_retry_without_second_dialog() {
        let fx = Fixture::new(
            ScriptedInteraction::new().login(Some(CredentialRecord::password("ann", "right"))),
        );
        let mut invocations = 0;
        let outcome = fx.coordinator(3).run("fetch", |attempt| {
            invocations += 1;
            attempt.host = Some(HOST.to_string());
            let shared = fx.auth.bind(HOST)?;
            let mut protocol = protocol::lock(&shared)?;
            protocol.set_final_attempt(attempt.last);
            let mut prompts = items([Prompt::Username, Prompt::Secret]);
            protocol.get(&mut prompts)?;
            match prompts[1].take_secret() {
                Some(secret) if secret.value() == b"right" => Ok(()),
                _ => {
                    // What a transport does when the server rejects credentials.
                    protocol.reset();
                    Err(not_authorized())
                }
            }
        });

        assert!(matches!(outcome, Outcome::Succeeded(())));
        assert_eq!(invocations, 2);
        assert_eq!(fx.ui.count(|c| matches!(c, Call::Login { .. })), 1);
    }

    #[test]
    fn final_attempt_rejection_shows_no_unused_login_dialog() {
        let fx = Fixture::with_stored(
            CredentialRecord::password("ann", "bad"),
            ScriptedInteraction::new()
                .login(Some(CredentialRecord::password("ann", "w1")))
                .login(Some(CredentialRecord::password("ann", "w2"))),
        );
        let mut tried = Vec::new();
        let outcome = fx.coordinator(2).run("fetch", |attempt| {
            attempt.host = Some(HOST.to_string());
            let shared = fx.auth.bind(HOST)?;
            let mut protocol = protocol::lock(&shared)?;
            protocol.set_final_attempt(attempt.last);
            let mut prompts = items([Prompt::Username, Prompt::Secret]);
            protocol.get(&mut prompts)?;
            if let Some(secret) = prompts[1].take_secret() {
                tried.push(String::from_utf8_lossy(secret.value()).to_string());
            }
            // The server rejects every password.
            protocol.reset();
            Err::<(), _>(not_authorized())
        });

        assert_eq!(tried, vec!["bad", "w1"]);
        assert_eq!(fx.ui.count(|c| matches!(c, Call::Login { .. })), 1);
        match outcome {
            Outcome::Failed {
                verdict: Some(verdict),
                ..
            } => assert_eq!(verdict.category, FailureCategory::CredentialsInvalid),
            other => panic!("Expected failure, got {:?}", other),
        }
        assert_eq!(fx.ui.count(|c| matches!(c, Call::Error { .. })), 1);
    }

    #[test]
    fn passphrase_required_supplies_passphrase_then_retries() {
        let fx = Fixture::new(ScriptedInteraction::new().passphrase(Some("open sesame")));
        let outcome = fx.coordinator(3).run("fetch", |attempt| {
            attempt.host = Some(HOST.to_string());
            let shared = fx.auth.bind(HOST)?;
            let mut protocol = protocol::lock(&shared)?;
            let mut prompts = items([Prompt::passphrase("Passphrase for /k")]);
            // Held passphrase only; the first attempt has none and fails.
            if protocol.passphrase_declined() || fx.ui.calls().is_empty() {
                return Err(TransportError::authentication("Auth fail").into());
            }
            if protocol.get(&mut prompts)? {
                Ok(())
            } else {
                Err(TransportError::authentication("Auth fail").into())
            }
        });

        assert!(matches!(outcome, Outcome::Succeeded(())));
        assert_eq!(fx.ui.count(|c| matches!(c, Call::Passphrase { .. })), 1);
    }

    #[test]
    fn declined_passphrase_aborts() {
        let fx = Fixture::new(ScriptedInteraction::new().passphrase(None));
        let mut invocations = 0;
        let outcome = fx.coordinator(3).run("fetch", |attempt| {
            invocations += 1;
            attempt.host = Some(HOST.to_string());
            fx.auth.bind(HOST)?;
            Err::<(), _>(TransportError::network("Auth fail").into())
        });

        assert!(matches!(outcome, Outcome::Aborted { .. }));
        assert_eq!(invocations, 1);
    }

    #[test]
    fn terminal_category_fails_first_time() {
        let fx = Fixture::new(ScriptedInteraction::new());
        let mut invocations = 0;
        let outcome = fx.coordinator(3).run("fetch", |_| {
            invocations += 1;
            Err::<(), _>(TransportError::network("connection refused").into())
        });

        assert_eq!(invocations, 1);
        match outcome.completion() {
            Completion::Failed {
                category: Some(FailureCategory::TransportFailure),
                message,
            } => assert!(message.contains("connection refused")),
            other => panic!("Expected transport failure, got {:?}", other),
        }
        assert_eq!(fx.ui.count(|c| matches!(c, Call::Error { .. })), 1);
    }

    #[test]
    fn unsupported_prompt_fails_loudly_and_is_not_classified() {
        let fx = Fixture::new(ScriptedInteraction::new());
        let outcome = fx.coordinator(3).run("fetch", |attempt| {
            attempt.host = Some(HOST.to_string());
            let shared = fx.auth.bind(HOST)?;
            let mut protocol = protocol::lock(&shared)?;
            protocol.get(&mut items([Prompt::FreeText {
                text: "OTP:".into(),
            }]))?;
            Ok(())
        });

        match outcome {
            Outcome::Failed {
                verdict: None,
                error: GitwardError::UnsupportedPrompt { .. },
            } => {}
            other => panic!("Expected unclassified failure, got {:?}", other),
        }
        assert_eq!(fx.ui.count(|c| matches!(c, Call::Error { .. })), 1);
        assert_eq!(
            fx.recorder.events(),
            vec!["started fetch", "finished fetch failed"]
        );
    }

    #[test]
    fn single_attempt_bound_still_notifies_once() {
        let fx = Fixture::new(ScriptedInteraction::new());
        let invocations = Mutex::new(0);
        let outcome = fx.coordinator(1).run("fetch", needs_login(&fx.auth, &invocations));
        assert!(matches!(outcome, Outcome::Failed { .. }));
        assert_eq!(*invocations.lock().unwrap(), 1);
        assert_eq!(fx.ui.count(|c| matches!(c, Call::Login { .. })), 0);
        assert_eq!(fx.recorder.events().len(), 2);
    }

    #[test]
    fn outcome_into_result_maps_errors() {
        let aborted: Outcome<()> = Outcome::Aborted {
            verdict: Verdict {
                category: FailureCategory::CredentialsInvalid,
                remedy: NO_CREDENTIALS_FOUND.into(),
            },
        };
        let err = aborted.into_result("fetch").unwrap_err();
        assert_eq!(err.to_string(), "fetch aborted");
        assert_eq!(err.suggestion(), Some(NO_CREDENTIALS_FOUND));
    }
}
