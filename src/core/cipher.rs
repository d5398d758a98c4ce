//! Cryptographic gateway.
//!
//! Wraps the age primitive behind a small trait so the pipeline never touches
//! key material directly: recipients and identities pass through as-is, and a
//! failed decrypt carries no partial plaintext. Ciphertexts are ASCII-armored
//! so they diff cleanly in version control.

use std::io::{Read, Write};

use age::x25519;

use crate::core::plaintext::Plaintext;
use crate::core::recipient::RecipientSet;
use crate::error::{Error, Result};

/// Cryptographic backend trait.
///
/// The pipeline treats this as the opaque encryption boundary. Multiple
/// identities are supplied together in one decrypt call; the call succeeds if
/// any identity matches a recipient of the ciphertext.
pub trait Cipher {
    /// Encrypt plaintext for every key in the recipient set.
    fn encrypt(&self, plaintext: &Plaintext, recipients: &RecipientSet) -> Result<String>;

    /// Decrypt an armored ciphertext, trying all supplied identities at once.
    fn decrypt(&self, ciphertext: &str, identities: &[x25519::Identity]) -> Result<Plaintext>;
}

/// The age x25519 backend.
pub struct Age;

impl Cipher for Age {
    fn encrypt(&self, plaintext: &Plaintext, recipients: &RecipientSet) -> Result<String> {
        let encryptor = age::Encryptor::with_recipients(
            recipients.keys().iter().map(|r| r as &dyn age::Recipient),
        )
        .map_err(|e| Error::EncryptFailed(e.to_string()))?;

        let mut encrypted = Vec::new();
        let mut writer = encryptor
            .wrap_output(age::armor::ArmoredWriter::wrap_output(
                &mut encrypted,
                age::armor::Format::AsciiArmor,
            )?)
            .map_err(|e| Error::EncryptFailed(e.to_string()))?;

        writer.write_all(plaintext.as_bytes())?;
        let armored = writer
            .finish()
            .map_err(|e| Error::EncryptFailed(e.to_string()))?;
        armored
            .finish()
            .map_err(|e| Error::EncryptFailed(format!("armor: {}", e)))?;

        String::from_utf8(encrypted)
            .map_err(|e| Error::EncryptFailed(format!("UTF-8 error: {}", e)))
    }

    fn decrypt(&self, ciphertext: &str, identities: &[x25519::Identity]) -> Result<Plaintext> {
        let reader = age::armor::ArmoredReader::new(ciphertext.as_bytes());
        let decryptor =
            age::Decryptor::new(reader).map_err(|e| Error::DecryptFailed(e.to_string()))?;

        let mut decrypted = Vec::new();
        let mut reader = decryptor
            .decrypt(identities.iter().map(|i| i as &dyn age::Identity))
            .map_err(|e| Error::DecryptFailed(e.to_string()))?;

        reader
            .read_to_end(&mut decrypted)
            .map_err(|e| Error::DecryptFailed(e.to_string()))?;

        Ok(Plaintext::new(decrypted))
    }
}

/// Encrypt plaintext for every key in the recipient set using the age backend.
pub fn encrypt(plaintext: &Plaintext, recipients: &RecipientSet) -> Result<String> {
    Age.encrypt(plaintext, recipients)
}

/// Decrypt an armored ciphertext with the age backend, trying all identities
/// in a single presentation.
pub fn decrypt(ciphertext: &str, identities: &[x25519::Identity]) -> Result<Plaintext> {
    Age.decrypt(ciphertext, identities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipient::RecipientSet;

    fn host_set(recipient: &x25519::Recipient) -> RecipientSet {
        RecipientSet::single(recipient.clone())
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let identity = x25519::Identity::generate();
        let recipients = host_set(&identity.to_public());

        let plaintext = Plaintext::from("super secret password 123!");
        let encrypted = encrypt(&plaintext, &recipients).unwrap();

        assert!(encrypted.contains("-----BEGIN AGE ENCRYPTED FILE-----"));

        let decrypted = decrypt(&encrypted, &[identity]).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_any_identity_in_combined_presentation_works() {
        let wrong = x25519::Identity::generate();
        let right = x25519::Identity::generate();
        let recipients = host_set(&right.to_public());

        let plaintext = Plaintext::from("shared");
        let encrypted = encrypt(&plaintext, &recipients).unwrap();

        // Both identities supplied together; the second one matches.
        let decrypted = decrypt(&encrypted, &[wrong, right]).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_with_wrong_identity_fails() {
        let identity = x25519::Identity::generate();
        let other = x25519::Identity::generate();
        let recipients = host_set(&identity.to_public());

        let encrypted = encrypt(&Plaintext::from("secret"), &recipients).unwrap();

        let result = decrypt(&encrypted, &[other]);
        assert!(matches!(result, Err(Error::DecryptFailed(_))));
    }

    #[test]
    fn test_encrypt_empty_plaintext() {
        let identity = x25519::Identity::generate();
        let recipients = host_set(&identity.to_public());

        let encrypted = encrypt(&Plaintext::new(Vec::new()), &recipients).unwrap();
        let decrypted = decrypt(&encrypted, &[identity]).unwrap();
        assert!(decrypted.is_empty());
    }
}
