//! Dialogs on the controlling terminal.
//!
//! Questions go to stderr so stdout stays clean for ref listings. Secrets are
//! read without echo via rpassword. In non-interactive mode every dialog
//! declines immediately.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use super::Interaction;
use crate::credentials::{CredentialRecord, CredentialStore};
use crate::secret::SecretBuffer;
use crate::transport::remote;

pub struct TerminalInteraction {
    non_interactive: bool,
    remember: Option<Arc<dyn CredentialStore>>,
    repo_dir: PathBuf,
}

impl TerminalInteraction {
    pub fn new(repo_dir: impl Into<PathBuf>, non_interactive: bool) -> Self {
        Self {
            non_interactive,
            remember: None,
            repo_dir: repo_dir.into(),
        }
    }

    /// Save credentials entered in the login dialog to `store`.
    pub fn remember_credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.remember = Some(store);
        self
    }

    fn declined(&self, dialog: &str) -> bool {
        if self.non_interactive {
            tracing::debug!(%dialog, "Non-interactive: declining dialog");
        }
        self.non_interactive
    }

    fn read_secret(&self, prompt: &str) -> Option<SecretBuffer> {
        match rpassword::prompt_password(prompt) {
            Ok(value) => Some(SecretBuffer::from_string(value)),
            Err(e) => {
                tracing::debug!("Could not read secret from terminal: {}", e);
                None
            }
        }
    }
}

/// Print `prompt` to stderr and read one line from stdin. `None` at EOF.
fn read_line(prompt: &str) -> Option<String> {
    eprint!("{}", prompt);
    std::io::stderr().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

impl Interaction for TerminalInteraction {
    fn show_login(&self, host: &str, message: &str) -> Option<CredentialRecord> {
        if self.declined("login") {
            return None;
        }

        eprintln!("Authentication for {} failed: {}", host, message);
        let username = read_line("Username (empty to enter a token instead): ")?;
        let record = if username.is_empty() {
            let token = self.read_secret("Token (empty to cancel): ")?;
            if !token.is_usable() {
                return None;
            }
            CredentialRecord::token(token)
        } else {
            let secret = self.read_secret(&format!("Password for {}@{}: ", username, host))?;
            CredentialRecord::password(username, secret)
        };

        if let Some(store) = &self.remember {
            match store.put(host, &record) {
                Ok(()) => tracing::info!(%host, "Saved credentials"),
                Err(e) => tracing::warn!(%host, "Could not save credentials: {}", e),
            }
        }
        Some(record)
    }

    fn show_passphrase(&self, message: &str) -> Option<SecretBuffer> {
        if self.declined("passphrase") {
            return None;
        }
        self.read_secret(&format!("{}: ", message.trim_end_matches(':')))
    }

    fn show_yes_no(&self, title: &str, text: &str) -> bool {
        if self.declined("yes/no") {
            return false;
        }
        eprintln!("[{}]", title);
        read_line(&format!("{} ", text)).is_some_and(|answer| is_yes(&answer))
    }

    fn show_error(&self, message: &str) {
        // The command prints the final error itself when it exits.
        tracing::debug!(%message, "Operation failed");
    }

    fn show_link_remote(&self, remote: &str) -> bool {
        if self.declined("link remote") {
            return false;
        }
        eprintln!("Remote '{}' is not configured.", remote);
        let Some(url) = read_line(&format!("URL for '{}' (empty to cancel): ", remote)) else {
            return false;
        };
        if url.is_empty() {
            return false;
        }
        match remote::link_remote(&self.repo_dir, remote, &url) {
            Ok(()) => true,
            Err(e) => {
                eprintln!("Could not add remote '{}': {}", remote, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;

    #[test]
    fn non_interactive_declines_every_dialog() {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let ui = TerminalInteraction::new(".", true).remember_credentials(store.clone());
        assert!(ui.show_login("example.com", "no credentials found").is_none());
        assert!(ui.show_passphrase("Passphrase for /k").is_none());
        assert!(!ui.show_yes_no("example.com", "Trust?"));
        assert!(!ui.show_link_remote("origin"));
        ui.show_error("ignored");
        assert!(store.hosts().is_empty());
    }

    #[test]
    fn yes_answers() {
        assert!(is_yes("yes"));
        assert!(is_yes(" Y\n"));
        assert!(!is_yes("no"));
        assert!(!is_yes(""));
        assert!(!is_yes("yess"));
    }
}
