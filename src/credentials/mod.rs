//! Resolved identities used to authenticate against a remote host.
//!
//! A `CredentialRecord` is immutable once built. When the user re-enters
//! credentials the protocol swaps in a whole new record; nothing outside this
//! module edits a record field by field.

pub mod helper;
pub mod store;

use crate::secret::SecretBuffer;

pub use helper::{GitCredentialHelper, NoPlatformCredentials, PlatformCredentials};
#[cfg(test)]
pub use store::MemoryCredentialStore;
pub use store::{CredentialStore, FileCredentialStore};

/// Which flavour of credential a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    PasswordBased,
    TokenBased,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::PasswordBased => "password",
            CredentialKind::TokenBased => "token",
        }
    }
}

/// The identity presented to a host.
#[derive(Debug, Clone)]
pub enum CredentialRecord {
    /// Username + password (or password-like secret).
    Password {
        username: String,
        secret: SecretBuffer,
    },

    /// A single access token. Where it goes on the wire (username slot,
    /// password slot, or both) is decided by the transport.
    Token { token: SecretBuffer },
}

impl CredentialRecord {
    pub fn password(username: impl Into<String>, secret: impl Into<SecretBuffer>) -> Self {
        CredentialRecord::Password {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn token(token: impl Into<SecretBuffer>) -> Self {
        CredentialRecord::Token {
            token: token.into(),
        }
    }

    /// Placeholder used when nothing is known for a host: password-based with
    /// no username, which the classifier reports as "no credentials found".
    pub fn empty() -> Self {
        CredentialRecord::Password {
            username: String::new(),
            secret: SecretBuffer::new(),
        }
    }

    pub fn kind(&self) -> CredentialKind {
        match self {
            CredentialRecord::Password { .. } => CredentialKind::PasswordBased,
            CredentialRecord::Token { .. } => CredentialKind::TokenBased,
        }
    }

    /// Username for password-based records; `None` for tokens.
    pub fn username(&self) -> Option<&str> {
        match self {
            CredentialRecord::Password { username, .. } => Some(username),
            CredentialRecord::Token { .. } => None,
        }
    }

    /// True when the record carries something worth sending.
    pub fn is_usable(&self) -> bool {
        match self {
            CredentialRecord::Password { username, .. } => !username.is_empty(),
            CredentialRecord::Token { token } => token.is_usable(),
        }
    }
}
