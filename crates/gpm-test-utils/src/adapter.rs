//! Encryption adapters for tests.
//!
//! Both are reversible, fast and count their calls so tests can assert how
//! much work a run did.

use std::sync::atomic::{AtomicUsize, Ordering};

use gpm_core::{AdapterError, EncryptionAdapter, RecipientConfig};

const MAGIC: &[u8] = b"XOR1";

/// XORs every byte with a key derived from the passphrase.
///
/// Decrypting with a different passphrase fails on the embedded key byte,
/// like a real adapter would.
#[derive(Debug, Default)]
pub struct XorAdapter {
    encrypts: AtomicUsize,
    decrypts: AtomicUsize,
}

impl XorAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypts.load(Ordering::SeqCst)
    }

    pub fn decrypt_calls(&self) -> usize {
        self.decrypts.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.encrypts.store(0, Ordering::SeqCst);
        self.decrypts.store(0, Ordering::SeqCst);
    }
}

fn key_for(recipient: &RecipientConfig) -> u8 {
    let seed = match recipient {
        RecipientConfig::Passphrase(pass) => pass.expose().as_bytes().to_vec(),
        RecipientConfig::Recipients(ids) => ids.join(",").into_bytes(),
    };
    seed.iter().fold(0x5au8, |acc, b| acc.rotate_left(3) ^ b) | 1
}

impl EncryptionAdapter for XorAdapter {
    fn name(&self) -> &str {
        "xor"
    }

    fn check_available(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn encrypt(&self, plaintext: &[u8], recipient: &RecipientConfig) -> Result<Vec<u8>, AdapterError> {
        self.encrypts.fetch_add(1, Ordering::SeqCst);
        let key = key_for(recipient);
        let mut out = Vec::with_capacity(MAGIC.len() + 1 + plaintext.len());
        out.extend_from_slice(MAGIC);
        out.push(key);
        out.extend(plaintext.iter().map(|b| b ^ key));
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8], recipient: &RecipientConfig) -> Result<Vec<u8>, AdapterError> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        let key = key_for(recipient);
        let body = ciphertext
            .strip_prefix(MAGIC)
            .ok_or_else(|| AdapterError::Decrypt("not an xor blob".into()))?;
        match body.split_first() {
            Some((&stored, rest)) if stored == key => Ok(rest.iter().map(|b| b ^ key).collect()),
            Some(_) => Err(AdapterError::Decrypt("wrong passphrase".into())),
            None => Err(AdapterError::Decrypt("truncated blob".into())),
        }
    }
}

/// Wraps [`XorAdapter`] and fails to encrypt any plaintext containing
/// `poison`.
#[derive(Debug)]
pub struct FailingAdapter {
    inner: XorAdapter,
    poison: Vec<u8>,
}

impl FailingAdapter {
    pub fn new(poison: impl Into<Vec<u8>>) -> Self {
        Self {
            inner: XorAdapter::new(),
            poison: poison.into(),
        }
    }

    pub fn encrypt_calls(&self) -> usize {
        self.inner.encrypt_calls()
    }
}

impl EncryptionAdapter for FailingAdapter {
    fn name(&self) -> &str {
        "failing"
    }

    fn check_available(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn encrypt(&self, plaintext: &[u8], recipient: &RecipientConfig) -> Result<Vec<u8>, AdapterError> {
        if !self.poison.is_empty() && plaintext.windows(self.poison.len()).any(|w| w == self.poison) {
            return Err(AdapterError::Encrypt("poisoned plaintext".into()));
        }
        self.inner.encrypt(plaintext, recipient)
    }

    fn decrypt(&self, ciphertext: &[u8], recipient: &RecipientConfig) -> Result<Vec<u8>, AdapterError> {
        self.inner.decrypt(ciphertext, recipient)
    }
}
