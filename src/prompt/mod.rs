//! Typed prompts exchanged between a transport and the credential protocol.
//!
//! A transport describes what it needs for one connection attempt as a
//! sequence of `PromptItem`s. The protocol fills in each item's `answer`.
//! Untyped prompt text coming from legacy sources is translated into these
//! kinds by `legacy::translate` before it reaches the protocol.

pub mod cache;
pub mod legacy;

use crate::secret::SecretBuffer;

pub use cache::{AnswerStore, PromptAnswerCache};

/// One kind of input a transport can ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// The account name.
    Username,
    /// The password (or token) for the account.
    Secret,
    /// The passphrase protecting a private key.
    Passphrase { text: String },
    /// A yes/no question, such as trusting an unknown host key.
    YesNo { text: String },
    /// Free text the protocol has no way of answering.
    FreeText { text: String },
}

impl Prompt {
    pub fn passphrase(text: impl Into<String>) -> Self {
        Prompt::Passphrase { text: text.into() }
    }

    pub fn yes_no(text: impl Into<String>) -> Self {
        Prompt::YesNo { text: text.into() }
    }
}

/// A value supplied for a prompt.
#[derive(Debug, Clone)]
pub enum Answer {
    Text(String),
    Secret(SecretBuffer),
    /// An access token; the transport decides which wire slot it fills.
    Token(SecretBuffer),
    Flag(bool),
}

/// A prompt together with the answer the protocol supplied for it.
#[derive(Debug, Clone)]
pub struct PromptItem {
    pub prompt: Prompt,
    pub answer: Option<Answer>,
}

impl PromptItem {
    pub fn new(prompt: Prompt) -> Self {
        Self {
            prompt,
            answer: None,
        }
    }

    /// The answer as a boolean, for yes/no prompts.
    #[cfg(test)]
    pub fn flag(&self) -> Option<bool> {
        match &self.answer {
            Some(Answer::Flag(value)) => Some(*value),
            _ => None,
        }
    }

    /// Take the secret or token answer out of the item.
    pub fn take_secret(&mut self) -> Option<SecretBuffer> {
        match self.answer.take() {
            Some(Answer::Secret(secret)) | Some(Answer::Token(secret)) => Some(secret),
            other => {
                self.answer = other;
                None
            }
        }
    }
}

/// Build the item list for a sequence of prompts.
pub fn items(prompts: impl IntoIterator<Item = Prompt>) -> Vec<PromptItem> {
    prompts.into_iter().map(PromptItem::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_secret_leaves_other_answers_in_place() {
        let mut item = PromptItem::new(Prompt::yes_no("ok?"));
        item.answer = Some(Answer::Flag(true));
        assert!(item.take_secret().is_none());
        assert_eq!(item.flag(), Some(true));

        let mut item = PromptItem::new(Prompt::Secret);
        item.answer = Some(Answer::Token(SecretBuffer::from("tok")));
        assert_eq!(item.take_secret().unwrap().value(), b"tok");
        assert!(item.answer.is_none());
    }
}
