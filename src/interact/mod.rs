//! The dialogs the credential core can ask a human to answer.
//!
//! Every method is synchronous: the caller blocks until the user responds.
//! When the core runs on a worker thread, `bridge` forwards each call to
//! the foreground thread that owns the terminal.

pub mod bridge;
#[cfg(test)]
pub mod scripted;
pub mod terminal;

use crate::credentials::CredentialRecord;
use crate::secret::SecretBuffer;

pub use terminal::TerminalInteraction;

/// Blocking user dialogs.
pub trait Interaction: Send + Sync {
    /// Ask for new credentials for `host`. `None` means the user dismissed
    /// the dialog.
    fn show_login(&self, host: &str, message: &str) -> Option<CredentialRecord>;

    /// Ask for a key passphrase. `None` means canceled.
    fn show_passphrase(&self, message: &str) -> Option<SecretBuffer>;

    /// Ask a yes/no question.
    fn show_yes_no(&self, title: &str, text: &str) -> bool;

    /// Tell the user an operation failed.
    fn show_error(&self, message: &str);

    /// Offer to configure the missing remote `remote`. Returns whether a
    /// remote was linked.
    fn show_link_remote(&self, remote: &str) -> bool;
}
