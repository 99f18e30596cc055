//! [`SecretsData`] and [`SecretOrKey`]: the validated multi-version secret set.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

use crate::crypto::KEY_LEN;

/// Secret version reported for plaintext envelopes and bare-string secrets.
pub const DEFAULT_VERSION: u32 = 0;

/// Errors produced while validating or resolving secrets.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The structured secrets do not satisfy the [`SecretsData`] invariants.
    #[error("invalid secrets data: {0}")]
    InvalidSecretsData(String),

    /// A secret marked `isKey` does not hold exactly [`KEY_LEN`] bytes.
    #[error("secret version {version} is flagged as a key but is {len} bytes, expected {KEY_LEN}")]
    InvalidKeyLength { version: u32, len: usize },

    /// A secret is flagged both as a raw key and for custom encryption.
    #[error("secret version {0} cannot be both a key and a custom encryption secret")]
    KeyAndCustomConflict(u32),

    /// No secret exists for the requested version.
    #[error("secret not found for version {0}")]
    SecretNotFound(u32),

    /// The user-supplied secret source returned an error.
    #[error("secret source failed: {0}")]
    Source(String),
}

impl SecretError {
    /// `true` for errors caused by client misconfiguration rather than by the
    /// data being decrypted.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, SecretError::SecretNotFound(_))
    }
}

/// One versioned secret (or raw AES key).
///
/// The secret bytes are zeroed on drop and never printed by `Debug`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretOrKey {
    secret: String,
    version: u32,
    #[serde(default)]
    is_key: bool,
    #[serde(default)]
    is_for_custom_encryption: bool,
}

impl SecretOrKey {
    /// A password-style secret; encryption keys are derived from it.
    pub fn new(secret: impl Into<String>, version: u32) -> Self {
        Self {
            secret: secret.into(),
            version,
            is_key: false,
            is_for_custom_encryption: false,
        }
    }

    /// Mark this secret as a raw 32-byte AES key (no derivation).
    pub fn as_key(mut self) -> Self {
        self.is_key = true;
        self
    }

    /// Mark this secret as reserved for custom ciphers.
    pub fn for_custom_encryption(mut self) -> Self {
        self.is_for_custom_encryption = true;
        self
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    pub fn is_for_custom_encryption(&self) -> bool {
        self.is_for_custom_encryption
    }

    /// Run `f` with the raw secret bytes.
    ///
    /// The bytes are only reachable for the duration of the call; callers
    /// must not copy them into anything that outlives it.
    pub(crate) fn with_material<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self.secret.as_bytes())
    }

    fn validate(&self) -> Result<(), SecretError> {
        if self.is_key && self.is_for_custom_encryption {
            return Err(SecretError::KeyAndCustomConflict(self.version));
        }
        if self.is_key && self.secret.len() != KEY_LEN {
            return Err(SecretError::InvalidKeyLength {
                version: self.version,
                len: self.secret.len(),
            });
        }
        if self.secret.is_empty() {
            return Err(SecretError::InvalidSecretsData(format!(
                "secret version {} is empty",
                self.version
            )));
        }
        Ok(())
    }
}

impl Drop for SecretOrKey {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl std::fmt::Debug for SecretOrKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretOrKey")
            .field("secret", &"[REDACTED]")
            .field("version", &self.version)
            .field("is_key", &self.is_key)
            .field("is_for_custom_encryption", &self.is_for_custom_encryption)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretsDataRepr {
    current_version: u32,
    secrets: Vec<SecretOrKey>,
}

/// A validated set of versioned secrets with one designated current version.
///
/// Invariants, checked on every construction path (including deserialisation):
/// - `secrets` is non-empty and versions are unique;
/// - some entry has `version == current_version`;
/// - every entry passes its own key/custom flag checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "SecretsDataRepr")]
pub struct SecretsData {
    current_version: u32,
    secrets: Vec<SecretOrKey>,
}

impl SecretsData {
    /// Build and validate a secret set.
    ///
    /// # Errors
    ///
    /// Returns a configuration [`SecretError`] if any invariant is violated.
    pub fn new(current_version: u32, secrets: Vec<SecretOrKey>) -> Result<Self, SecretError> {
        let data = Self {
            current_version,
            secrets,
        };
        data.validate()?;
        Ok(data)
    }

    /// Wrap a bare secret string as a single-entry set at [`DEFAULT_VERSION`].
    pub fn from_secret(secret: impl Into<String>) -> Result<Self, SecretError> {
        Self::new(
            DEFAULT_VERSION,
            vec![SecretOrKey::new(secret, DEFAULT_VERSION)],
        )
    }

    pub fn current_version(&self) -> u32 {
        self.current_version
    }

    pub fn secrets(&self) -> &[SecretOrKey] {
        &self.secrets
    }

    /// Look up a secret by version, defaulting to the current version.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::SecretNotFound`] when no entry has that version.
    pub fn resolve_version(&self, version: Option<u32>) -> Result<&SecretOrKey, SecretError> {
        let wanted = version.unwrap_or(self.current_version);
        self.secrets
            .iter()
            .find(|s| s.version == wanted)
            .ok_or(SecretError::SecretNotFound(wanted))
    }

    /// Secrets flagged for custom encryption.
    pub fn custom_secrets(&self) -> impl Iterator<Item = &SecretOrKey> {
        self.secrets.iter().filter(|s| s.is_for_custom_encryption)
    }

    fn validate(&self) -> Result<(), SecretError> {
        if self.secrets.is_empty() {
            return Err(SecretError::InvalidSecretsData(
                "secrets list must not be empty".into(),
            ));
        }
        let mut seen = HashSet::new();
        for s in &self.secrets {
            if !seen.insert(s.version) {
                return Err(SecretError::InvalidSecretsData(format!(
                    "duplicate secret version {}",
                    s.version
                )));
            }
            s.validate()?;
        }
        if !seen.contains(&self.current_version) {
            return Err(SecretError::InvalidSecretsData(format!(
                "no secret for current version {}",
                self.current_version
            )));
        }
        Ok(())
    }
}

impl TryFrom<SecretsDataRepr> for SecretsData {
    type Error = SecretError;

    fn try_from(repr: SecretsDataRepr) -> Result<Self, Self::Error> {
        Self::new(repr.current_version, repr.secrets)
    }
}
