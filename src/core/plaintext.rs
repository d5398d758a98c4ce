//! Ephemeral plaintext buffer.
//!
//! Wraps decrypted or freshly generated secret bytes and wipes them from
//! memory on drop. Nothing in the crate writes these bytes to permanent
//! storage unencrypted; the only persistence is a 0600 scratch file inside a
//! per-invocation temp dir during generator runs.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret bytes with a bounded lifetime.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Plaintext(Vec<u8>);

impl Plaintext {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Plaintext {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&str> for Plaintext {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

// Never leak secret bytes through Debug output.
impl std::fmt::Debug for Plaintext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Plaintext({} bytes redacted)", self.0.len())
    }
}
