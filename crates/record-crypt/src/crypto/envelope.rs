//! Envelope engine: tag-dispatched encryption and decryption of string values.
//!
//! An envelope is `"<tag>:<payload>"`:
//!
//! | tag          | meaning                         | payload          |
//! |--------------|---------------------------------|------------------|
//! | `pt`         | plaintext passthrough           | base64(utf8)     |
//! | `1`          | legacy AES-GCM (read-only)      | hex(sealed)      |
//! | `2`          | current AES-GCM                 | base64(sealed)   |
//! | `c<base64>`  | registered custom cipher        | cipher output    |

use std::{fmt, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::debug;

use super::cipher::{self, CipherError};
use crate::custom::{CustomCipherRegistry, CustomHandle};
use crate::secrets::{SecretError, SecretResolver, SecretsData, DEFAULT_VERSION};

const PLAINTEXT_TAG: &str = "pt";
const LEGACY_TAG: &str = "1";
const CURRENT_TAG: &str = "2";

/// Separates the tag from the payload; payloads may never contain it.
pub(crate) const SEPARATOR: char = ':';

/// Errors produced while building or opening envelopes.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The envelope is not `<tag>:<payload>`, or its payload is undecodable.
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(&'static str),

    #[error("unknown decryptor version: {0:?}")]
    UnknownDecryptorVersion(String),

    /// Authentication tag mismatch: wrong key or tampered data.
    #[error("decryption failed: authentication error")]
    DecryptionAuth,

    /// An encrypted envelope was read but no secret source is configured.
    #[error("no secret source configured to decrypt this envelope")]
    NoSecretResolver,

    #[error("secret version {0} is not flagged for custom encryption")]
    SecretNotForCustomEncryption(u32),

    /// The custom encrypt callback failed to produce a ciphertext string.
    #[error("custom encryption {version:?} did not return a string: {reason}")]
    CustomEncryptionReturnType { version: String, reason: String },

    /// The custom decrypt callback failed to produce a plaintext string.
    #[error("custom decryption {version:?} did not return a string: {reason}")]
    CustomDecryptionReturnType { version: String, reason: String },

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Envelope version tag. Dispatch is a match over this closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionTag {
    Plaintext,
    LegacyV1,
    CurrentV2,
    Custom(CustomHandle),
}

impl VersionTag {
    /// Parse the tag segment of an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::UnknownDecryptorVersion`] for anything outside
    /// the known set.
    pub fn parse(tag: &str) -> Result<Self, EnvelopeError> {
        match tag {
            PLAINTEXT_TAG => Ok(VersionTag::Plaintext),
            LEGACY_TAG => Ok(VersionTag::LegacyV1),
            CURRENT_TAG => Ok(VersionTag::CurrentV2),
            t if t.len() > 1 && t.starts_with('c') => Ok(VersionTag::Custom(CustomHandle::from_tag(t))),
            other => Err(EnvelopeError::UnknownDecryptorVersion(other.to_owned())),
        }
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionTag::Plaintext => f.write_str(PLAINTEXT_TAG),
            VersionTag::LegacyV1 => f.write_str(LEGACY_TAG),
            VersionTag::CurrentV2 => f.write_str(CURRENT_TAG),
            VersionTag::Custom(handle) => f.write_str(handle.as_str()),
        }
    }
}

/// Split an envelope into its tag and payload.
/// Split `<tag>:<payload>` and parse the tag.
pub(crate) fn split_envelope(envelope: &str) -> Result<(VersionTag, &str), EnvelopeError> {
    let mut parts = envelope.split(SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(tag), Some(payload), None) => Ok((VersionTag::parse(tag)?, payload)),
        _ => Err(EnvelopeError::InvalidCiphertext("expected exactly one ':' separator")),
    }
}

/// Output of an encryption: the envelope and the secret version it used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encrypted {
    pub message: String,
    pub secret_version: u32,
}

/// Stateless envelope encryption over a secret resolver and custom ciphers.
///
/// Cheap to clone; the configuration is fixed at construction and shared.
#[derive(Clone, Debug, Default)]
pub struct EnvelopeEngine {
    resolver: Option<SecretResolver>,
    custom: Arc<CustomCipherRegistry>,
}

impl EnvelopeEngine {
    /// Build an engine. With no resolver every write is a plaintext envelope.
    pub fn new(resolver: Option<SecretResolver>, custom: CustomCipherRegistry) -> Self {
        Self {
            resolver,
            custom: Arc::new(custom),
        }
    }

    pub fn has_secrets(&self) -> bool {
        self.resolver.is_some()
    }

    pub fn custom_ciphers(&self) -> &CustomCipherRegistry {
        &self.custom
    }

    /// Resolve secrets once for a logical operation.
    ///
    /// Returns `None` when no resolver is configured.
    pub async fn snapshot(&self) -> Result<Option<SecretsData>, EnvelopeError> {
        match &self.resolver {
            Some(resolver) => Ok(Some(resolver.resolve().await?)),
            None => Ok(None),
        }
    }

    /// Encrypt `text`, resolving secrets for this call only.
    pub async fn encrypt(&self, text: &str) -> Result<Encrypted, EnvelopeError> {
        let secrets = self.snapshot().await?;
        self.encrypt_with(secrets.as_ref(), text)
    }

    /// Decrypt `envelope` written under `secret_version`, resolving secrets
    /// for this call only.
    pub async fn decrypt(&self, envelope: &str, secret_version: u32) -> Result<String, EnvelopeError> {
        let secrets = self.snapshot().await?;
        self.decrypt_with(secrets.as_ref(), envelope, secret_version)
    }

    /// Encrypt against an already-resolved snapshot (see [`Self::snapshot`]).
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::SecretNotForCustomEncryption`] when the current custom
    ///   cipher's secret is not flagged for it.
    /// - [`EnvelopeError::CustomEncryptionReturnType`] when the custom cipher fails.
    /// - [`EnvelopeError::Cipher`] on an AEAD failure.
    pub fn encrypt_with(
        &self,
        secrets: Option<&SecretsData>,
        text: &str,
    ) -> Result<Encrypted, EnvelopeError> {
        let Some(secrets) = secrets else {
            return Ok(Encrypted {
                message: format!("{PLAINTEXT_TAG}:{}", STANDARD.encode(text)),
                secret_version: DEFAULT_VERSION,
            });
        };

        let secret = secrets.resolve_version(None)?;
        let version = secret.version();

        if let Some((handle, config)) = self.custom.current() {
            if !secret.is_for_custom_encryption() {
                return Err(EnvelopeError::SecretNotForCustomEncryption(version));
            }
            let payload = secret
                .with_material(|material| config.cipher.encrypt(text, material, version))
                .map_err(|e| EnvelopeError::CustomEncryptionReturnType {
                    version: config.version.clone(),
                    reason: format!("{e:#}"),
                })?;
            if payload.contains(SEPARATOR) {
                return Err(EnvelopeError::CustomEncryptionReturnType {
                    version: config.version.clone(),
                    reason: format!("ciphertext contains the reserved {SEPARATOR:?} separator"),
                });
            }
            return Ok(Encrypted {
                message: format!("{handle}:{payload}"),
                secret_version: version,
            });
        }

        let sealed = cipher::seal(secret, text.as_bytes())?;
        Ok(Encrypted {
            message: format!("{CURRENT_TAG}:{}", STANDARD.encode(sealed)),
            secret_version: version,
        })
    }

    /// Decrypt against an already-resolved snapshot (see [`Self::snapshot`]).
    ///
    /// # Errors
    ///
    /// See [`EnvelopeError`]; authentication failures never yield plaintext.
    pub fn decrypt_with(
        &self,
        secrets: Option<&SecretsData>,
        envelope: &str,
        secret_version: u32,
    ) -> Result<String, EnvelopeError> {
        let (tag, payload) = split_envelope(envelope)?;
        debug!(tag = %tag, secret_version, "decrypting envelope");

        match tag {
            VersionTag::Plaintext => {
                let bytes = STANDARD
                    .decode(payload)
                    .map_err(|_| EnvelopeError::InvalidCiphertext("plaintext payload is not base64"))?;
                utf8(bytes)
            }
            VersionTag::LegacyV1 => {
                let sealed = hex::decode(payload)
                    .map_err(|_| EnvelopeError::InvalidCiphertext("v1 payload is not hex"))?;
                self.open_sealed(secrets, &sealed, secret_version)
            }
            VersionTag::CurrentV2 => {
                let sealed = STANDARD
                    .decode(payload)
                    .map_err(|_| EnvelopeError::InvalidCiphertext("v2 payload is not base64"))?;
                self.open_sealed(secrets, &sealed, secret_version)
            }
            VersionTag::Custom(handle) => {
                let config = self
                    .custom
                    .get(&handle)
                    .ok_or_else(|| EnvelopeError::UnknownDecryptorVersion(handle.to_string()))?;
                let secrets = secrets.ok_or(EnvelopeError::NoSecretResolver)?;
                let secret = secrets.resolve_version(Some(secret_version))?;
                if !secret.is_for_custom_encryption() {
                    return Err(EnvelopeError::SecretNotForCustomEncryption(secret_version));
                }
                secret
                    .with_material(|material| config.cipher.decrypt(payload, material, secret_version))
                    .map_err(|e| EnvelopeError::CustomDecryptionReturnType {
                        version: config.version.clone(),
                        reason: format!("{e:#}"),
                    })
            }
        }
    }

    fn open_sealed(
        &self,
        secrets: Option<&SecretsData>,
        sealed: &[u8],
        secret_version: u32,
    ) -> Result<String, EnvelopeError> {
        let secrets = secrets.ok_or(EnvelopeError::NoSecretResolver)?;
        let secret = secrets.resolve_version(Some(secret_version))?;
        let plaintext = cipher::open(secret, sealed).map_err(|e| match e {
            CipherError::AeadFailure => EnvelopeError::DecryptionAuth,
            CipherError::Truncated(_) => EnvelopeError::InvalidCiphertext("sealed payload too short"),
            other => EnvelopeError::Cipher(other),
        })?;
        utf8(plaintext)
    }
}

fn utf8(bytes: Vec<u8>) -> Result<String, EnvelopeError> {
    String::from_utf8(bytes).map_err(|_| EnvelopeError::InvalidCiphertext("plaintext is not UTF-8"))
}
