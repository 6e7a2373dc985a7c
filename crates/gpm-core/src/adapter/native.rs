//! Built-in ChaCha20-Poly1305 adapter
//!
//! Blob format:
//!
//! ```text
//! b"GPM\x01" | salt (16) | nonce (12) | ciphertext + tag (16)
//! ```
//!
//! The key is derived from the passphrase with Argon2id. One salt is drawn
//! per adapter instance, so a run pays for key derivation once when
//! encrypting and once per distinct salt when decrypting.

use std::collections::HashMap;
use std::sync::Mutex;

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::{AdapterError, EncryptionAdapter, RecipientConfig};

const MAGIC: &[u8; 4] = b"GPM\x01";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + SALT_LEN + NONCE_LEN;

type CacheKey = ([u8; SALT_LEN], [u8; 32]);

/// Passphrase-based authenticated encryption without external tools
pub struct NativeAdapter {
    salt: [u8; SALT_LEN],
    keys: Mutex<HashMap<CacheKey, Zeroizing<[u8; KEY_LEN]>>>,
}

impl Default for NativeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeAdapter {
    pub const NAME: &'static str = "native";

    pub fn new() -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self {
            salt,
            keys: Mutex::new(HashMap::new()),
        }
    }

    fn passphrase<'a>(&self, recipient: &'a RecipientConfig) -> Result<&'a str, AdapterError> {
        match recipient {
            RecipientConfig::Passphrase(p) if !p.is_empty() => Ok(p.expose()),
            RecipientConfig::Passphrase(_) => Err(AdapterError::MissingPassphrase {
                adapter: Self::NAME.into(),
            }),
            RecipientConfig::Recipients(_) => Err(AdapterError::Unsupported {
                adapter: Self::NAME.into(),
                what: "public-key recipients".into(),
            }),
        }
    }

    fn cipher(&self, passphrase: &str, salt: &[u8; SALT_LEN]) -> Result<ChaCha20Poly1305, AdapterError> {
        let fingerprint: [u8; 32] = Sha256::digest(passphrase.as_bytes()).into();
        let cache_key = (*salt, fingerprint);

        let mut keys = self
            .keys
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(key) = keys.get(&cache_key) {
            return Ok(ChaCha20Poly1305::new(Key::from_slice(key.as_slice())));
        }

        let params = Params::new(19 * 1024, 3, 1, Some(KEY_LEN))
            .map_err(|e| AdapterError::Encrypt(format!("argon2 parameters: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut output = Zeroizing::new([0u8; KEY_LEN]);
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, output.as_mut_slice())
            .map_err(|e| AdapterError::Encrypt(format!("key derivation failed: {e}")))?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(output.as_slice()));
        keys.insert(cache_key, output);
        Ok(cipher)
    }
}

impl EncryptionAdapter for NativeAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check_available(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn check_recipient(&self, recipient: &RecipientConfig) -> Result<(), AdapterError> {
        self.passphrase(recipient).map(|_| ())
    }

    fn encrypt(&self, plaintext: &[u8], recipient: &RecipientConfig) -> Result<Vec<u8>, AdapterError> {
        let passphrase = self.passphrase(recipient)?;
        let cipher = self.cipher(passphrase, &self.salt)?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

        let sealed = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| AdapterError::Encrypt(e.to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8], recipient: &RecipientConfig) -> Result<Vec<u8>, AdapterError> {
        let passphrase = self.passphrase(recipient)?;
        if ciphertext.len() < HEADER_LEN + TAG_LEN || &ciphertext[..MAGIC.len()] != MAGIC {
            return Err(AdapterError::Decrypt("not a gpm native blob".into()));
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&ciphertext[MAGIC.len()..MAGIC.len() + SALT_LEN]);
        let nonce = Nonce::from_slice(&ciphertext[MAGIC.len() + SALT_LEN..HEADER_LEN]);

        let cipher = self.cipher(passphrase, &salt)?;
        cipher
            .decrypt(nonce, &ciphertext[HEADER_LEN..])
            .map_err(|_| AdapterError::Decrypt("wrong passphrase or corrupted blob".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypts_and_decrypts_round_trip() {
        let adapter = NativeAdapter::new();
        let recipient = RecipientConfig::passphrase("correct horse");

        let sealed = adapter.encrypt(b"secret notes", &recipient).unwrap();
        assert_eq!(&sealed[..4], MAGIC);
        assert_ne!(&sealed[HEADER_LEN..], b"secret notes");

        let opened = adapter.decrypt(&sealed, &recipient).unwrap();
        assert_eq!(opened, b"secret notes");
    }

    #[test]
    fn another_instance_can_decrypt() {
        let recipient = RecipientConfig::passphrase("pw");
        let sealed = NativeAdapter::new().encrypt(b"payload", &recipient).unwrap();
        let opened = NativeAdapter::new().decrypt(&sealed, &recipient).unwrap();
        assert_eq!(opened, b"payload");
    }

    #[test]
    fn wrong_passphrase_fails() {
        let adapter = NativeAdapter::new();
        let sealed = adapter
            .encrypt(b"payload", &RecipientConfig::passphrase("right"))
            .unwrap();
        let err = adapter
            .decrypt(&sealed, &RecipientConfig::passphrase("wrong"))
            .unwrap_err();
        assert!(matches!(err, AdapterError::Decrypt(_)));
    }

    #[test]
    fn rejects_foreign_input() {
        let adapter = NativeAdapter::new();
        let err = adapter
            .decrypt(b"plain text", &RecipientConfig::passphrase("pw"))
            .unwrap_err();
        assert!(err.to_string().contains("not a gpm native blob"));
    }

    #[test]
    fn requires_a_passphrase() {
        let adapter = NativeAdapter::new();
        let err = adapter
            .encrypt(b"x", &RecipientConfig::Recipients(vec!["ABCD".into()]))
            .unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported { .. }));

        let err = adapter.encrypt(b"x", &RecipientConfig::passphrase("")).unwrap_err();
        assert!(matches!(err, AdapterError::MissingPassphrase { .. }));
    }
}
