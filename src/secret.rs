//! A password held only for the time it takes to hand it to an elevation tool.
//!
//! A [`Secret`] is created when the user answers a password prompt and is
//! dropped as soon as it has been written to the elevated process' standard
//! input. It cannot be serialized, it has no `Display` implementation and its
//! `Debug` output is always redacted, so it can neither reach the cache nor a
//! log line by accident. Its bytes are wiped on drop through [`Zeroizing`].

use std::fmt;
use zeroize::Zeroizing;

/// Password bytes with a redacted `Debug` and no `Display`.
pub struct Secret(Zeroizing<Vec<u8>>);

impl Secret {
    /// Create a new `Secret` from a `String`.
    pub fn new(value: String) -> Self {
        Self(Zeroizing::new(value.into_bytes()))
    }

    /// Return the raw bytes, to be written to the process input.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    /// `true` when the user validated an empty prompt.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
