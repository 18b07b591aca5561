//! Short-lived secret storage for passwords, tokens and key passphrases.
//!
//! A `SecretBuffer` owns the bytes of one secret. `clear()` overwrites every
//! byte with zero in place (the length is kept so callers can verify the
//! scrub), and the buffer is zeroed again on drop via the `zeroize` crate.
//! Code that hands a secret to a transport holds a `ScrubGuard` so the buffer
//! is cleared on every way out of the scope, including `?` returns and panics.

use std::fmt;

use zeroize::Zeroize;

/// Mutable, zero-on-clear buffer holding a single secret value.
#[derive(Clone, Default)]
pub struct SecretBuffer {
    bytes: Vec<u8>,
}

impl SecretBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Take ownership of an existing string's bytes without copying them.
    pub fn from_string(value: String) -> Self {
        Self {
            bytes: value.into_bytes(),
        }
    }

    /// The live buffer contents. This is not a copy.
    #[cfg(test)]
    pub fn value(&self) -> &[u8] {
        &self.bytes
    }

    /// The contents as UTF-8, or `None` if the bytes are not valid UTF-8.
    ///
    /// A cleared buffer is valid UTF-8 (NUL characters), so callers that need
    /// to know whether a usable secret is present should use `is_usable()`.
    pub fn expose_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    /// Overwrite every element with zero, keeping the length.
    pub fn clear(&mut self) {
        self.bytes.as_mut_slice().zeroize();
    }

    /// True when the buffer has at least one non-zero byte.
    pub fn is_usable(&self) -> bool {
        self.bytes.iter().any(|b| *b != 0)
    }

    /// Borrow the buffer behind a guard that clears it when the guard drops.
    pub fn scrub_on_exit(&mut self) -> ScrubGuard<'_> {
        ScrubGuard { buffer: self }
    }
}

impl From<String> for SecretBuffer {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

impl From<&str> for SecretBuffer {
    fn from(value: &str) -> Self {
        Self {
            bytes: value.as_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer([REDACTED])")
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Clears the borrowed `SecretBuffer` when dropped.
pub struct ScrubGuard<'a> {
    buffer: &'a mut SecretBuffer,
}

impl ScrubGuard<'_> {
    pub fn expose_str(&self) -> Option<&str> {
        self.buffer.expose_str()
    }
}

impl Drop for ScrubGuard<'_> {
    fn drop(&mut self) {
        self.buffer.clear();
    }
}
