//! Translation of untyped prompt text into typed `Prompt`s.
//!
//! SSH servers (keyboard-interactive) and askpass-style sources only hand us
//! a line of text. The kind is recovered from textual conventions here, at
//! the edge, so nothing past this point inspects prompt strings. The
//! conventions are fragile by nature: a server that words its prompts
//! differently ends up as `FreeText`, which the protocol rejects loudly.

use super::Prompt;

/// Classify one untyped prompt line.
///
/// `echo` is whether the source would echo the typed answer; a non-echoing
/// prompt we cannot otherwise place is treated as a secret.
pub fn translate(text: &str, echo: bool) -> Prompt {
    let trimmed = text.trim();

    if trimmed.starts_with("Passphrase") || trimmed.starts_with("Enter passphrase") {
        return Prompt::Passphrase {
            text: trimmed.to_string(),
        };
    }
    if trimmed.starts_with("Password:") || trimmed.starts_with("Password for") {
        return Prompt::Secret;
    }
    if trimmed.starts_with("Username") {
        return Prompt::Username;
    }
    if trimmed.contains("(yes/no") || trimmed.ends_with('?') {
        return Prompt::YesNo {
            text: trimmed.to_string(),
        };
    }
    if !echo && trimmed.to_ascii_lowercase().contains("password") {
        return Prompt::Secret;
    }

    Prompt::FreeText {
        text: trimmed.to_string(),
    }
}
