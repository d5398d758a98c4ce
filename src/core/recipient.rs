//! Recipient and identity sets.
//!
//! A [`RecipientSet`] is the ordered, deduplicated list of public keys one
//! encryption operation targets: the single host key on the rekey path, or
//! the master identities' public counterparts plus any extra recipients on
//! the generation path. [`MasterIdentities`] loads the ordered master
//! identity files used for every decrypt.

use std::fs;
use std::path::{Path, PathBuf};

use age::x25519;
use tracing::debug;
#[cfg(unix)]
use tracing::warn;

use crate::error::{Error, Result};

/// The well-known all-zero age public key used as a stand-in before a host's
/// real key is known. Encrypting to it works, but nothing deployable should
/// ever be protected by it alone.
pub const DUMMY_HOST_KEY: &str =
    "age1qyqszqgpqyqszqgpqyqszqgpqyqszqgpqyqszqgpqyqszqgpqyqs3290gq";

/// Parse a public key string into an age recipient.
pub fn parse_recipient(key: &str) -> Result<x25519::Recipient> {
    key.parse::<x25519::Recipient>()
        .map_err(|_| Error::InvalidRecipient(key.to_string()))
}

/// Ordered, deduplicated set of public keys for one encryption operation.
pub struct RecipientSet {
    keys: Vec<x25519::Recipient>,
}

impl RecipientSet {
    /// Set containing exactly one recipient.
    pub fn single(recipient: x25519::Recipient) -> Self {
        Self {
            keys: vec![recipient],
        }
    }

    /// Set from explicit keys, deduplicated in declaration order.
    pub fn from_keys(keys: impl IntoIterator<Item = x25519::Recipient>) -> Self {
        let mut set = Self { keys: Vec::new() };
        for key in keys {
            set.push(key);
        }
        set
    }

    /// Set for the rekey path: the target host's public key only.
    pub fn host(key: &str) -> Result<Self> {
        Ok(Self::single(parse_recipient(key)?))
    }

    /// Set for the generation and edit path: every master identity's public
    /// counterpart, then the extra recipients, in declaration order.
    pub fn generation(masters: &MasterIdentities, extra: &[String]) -> Result<Self> {
        let mut set = Self { keys: Vec::new() };
        for key in masters.public_keys() {
            set.push(key);
        }
        for key in extra {
            set.push(parse_recipient(key)?);
        }
        Ok(set)
    }

    /// Insert a recipient, keeping declaration order and dropping duplicates.
    fn push(&mut self, recipient: x25519::Recipient) {
        let repr = recipient.to_string();
        if !self.keys.iter().any(|k| k.to_string() == repr) {
            self.keys.push(recipient);
        }
    }

    pub fn keys(&self) -> &[x25519::Recipient] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// The ordered list of master decryption identities.
///
/// Identity files are plain age key files; every `AGE-SECRET-KEY-` line is
/// loaded, in file order, files in declaration order.
pub struct MasterIdentities {
    identities: Vec<x25519::Identity>,
}

impl MasterIdentities {
    /// Load all identities from the given files.
    ///
    /// A file contributing no identity at all is an error: an unreadable
    /// master would silently shrink the recipient set on the next edit.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        let mut identities = Vec::new();

        for path in paths {
            debug!("loading master identity from {}", path.display());

            #[cfg(unix)]
            check_permissions(path);

            let contents = fs::read_to_string(path)?;
            let before = identities.len();
            for line in contents.lines() {
                let line = line.trim();
                if line.starts_with("AGE-SECRET-KEY-") {
                    let identity: x25519::Identity = line
                        .parse()
                        .map_err(|_| Error::InvalidIdentity(path.display().to_string()))?;
                    identities.push(identity);
                }
            }
            if identities.len() == before {
                return Err(Error::InvalidIdentity(path.display().to_string()));
            }
        }

        Ok(Self { identities })
    }

    /// Construct from already-parsed identities.
    pub fn from_identities(identities: Vec<x25519::Identity>) -> Self {
        Self { identities }
    }

    /// All identities, for a combined decrypt presentation.
    pub fn identities(&self) -> &[x25519::Identity] {
        &self.identities
    }

    /// Public counterparts, in identity order.
    pub fn public_keys(&self) -> Vec<x25519::Recipient> {
        self.identities.iter().map(|i| i.to_public()).collect()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

/// Warn when an identity file is readable by anyone but its owner.
#[cfg(unix)]
fn check_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(metadata) = fs::metadata(path) {
        let mode = metadata.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            warn!(
                "insecure identity file permissions ({:o}): run chmod 600 {}",
                mode,
                path.display()
            );
        }
    }
}
