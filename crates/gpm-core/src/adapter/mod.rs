//! Encryption adapters
//!
//! The engine never performs cryptography itself. Every byte transform goes
//! through an [`EncryptionAdapter`], selected by name from configuration;
//! tests inject deterministic fakes instead.

mod gpg;
mod native;

pub use gpg::GpgAdapter;
pub use native::NativeAdapter;

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::config::GpmConfig;
use crate::{Error, Result};

/// A passphrase held in memory that is wiped on drop
#[derive(Clone)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// Key material handed through the engine to the adapter unchanged
#[derive(Debug, Clone)]
pub enum RecipientConfig {
    /// Symmetric encryption under a passphrase
    Passphrase(Passphrase),
    /// Public-key encryption to these recipient key ids
    Recipients(Vec<String>),
}

impl RecipientConfig {
    pub fn passphrase(value: impl Into<String>) -> Self {
        Self::Passphrase(Passphrase::new(value))
    }
}

/// Errors reported by an adapter for a single transform
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("{adapter} is unavailable: {reason}")]
    Unavailable { adapter: String, reason: String },

    #[error("{adapter} requires a passphrase")]
    MissingPassphrase { adapter: String },

    #[error("{adapter} does not support {what}")]
    Unsupported { adapter: String, what: String },

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("{program} exited with status {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Byte-stream encryption engine
pub trait EncryptionAdapter: Send + Sync {
    /// Name used in configuration and logs
    fn name(&self) -> &str;

    /// Verify that the engine can be used at all.
    fn check_available(&self) -> std::result::Result<(), AdapterError>;

    /// Verify that `recipient` carries usable key material before any
    /// transform is attempted.
    fn check_recipient(&self, recipient: &RecipientConfig) -> std::result::Result<(), AdapterError> {
        match recipient {
            RecipientConfig::Passphrase(pass) if pass.is_empty() => Err(AdapterError::MissingPassphrase {
                adapter: self.name().to_string(),
            }),
            RecipientConfig::Recipients(ids) if ids.is_empty() => Err(AdapterError::Unsupported {
                adapter: self.name().to_string(),
                what: "an empty recipient list".into(),
            }),
            _ => Ok(()),
        }
    }

    fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &RecipientConfig,
    ) -> std::result::Result<Vec<u8>, AdapterError>;

    fn decrypt(
        &self,
        ciphertext: &[u8],
        recipient: &RecipientConfig,
    ) -> std::result::Result<Vec<u8>, AdapterError>;
}

/// Names accepted for `engine.adapter`
pub const ADAPTER_NAMES: &[&str] = &[NativeAdapter::NAME, GpgAdapter::NAME];

/// Build the adapter named in `config` and check that it is usable.
///
/// # Errors
///
/// `Config` for an unknown name, `AdapterUnavailable` if the engine cannot
/// be used.
pub fn build_adapter(config: &GpmConfig) -> Result<Arc<dyn EncryptionAdapter>> {
    let adapter: Arc<dyn EncryptionAdapter> = match config.engine.adapter.as_str() {
        NativeAdapter::NAME => Arc::new(NativeAdapter::new()),
        GpgAdapter::NAME => Arc::new(GpgAdapter::new(&config.gpg.program)),
        other => {
            return Err(Error::config(format!(
                "Unknown adapter '{}' (expected one of: {})",
                other,
                ADAPTER_NAMES.join(", ")
            )));
        }
    };

    adapter
        .check_available()
        .map_err(|e| Error::AdapterUnavailable {
            adapter: adapter.name().to_string(),
            reason: e.to_string(),
        })?;
    tracing::debug!(adapter = adapter.name(), "Encryption adapter ready");
    Ok(adapter)
}
