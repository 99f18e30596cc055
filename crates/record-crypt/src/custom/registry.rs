//! [`CustomCipherRegistry`]: validated, immutable index of user-supplied ciphers.

use std::{collections::HashMap, fmt, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::{info, warn};

use crate::crypto::envelope::{split_envelope, VersionTag, SEPARATOR};
use crate::secrets::SecretsData;

/// Sample text encrypted and decrypted by the setup self-test.
const SELF_TEST_TEXT: &str = "record-crypt self-test";

/// A user-supplied cipher bound to a secret version at call time.
///
/// Returning `Err` from either method is treated as the cipher failing to
/// produce a string result.
pub trait CustomCipher: Send + Sync {
    fn encrypt(&self, text: &str, secret: &[u8], secret_version: u32) -> anyhow::Result<String>;
    fn decrypt(&self, ciphertext: &str, secret: &[u8], secret_version: u32)
        -> anyhow::Result<String>;
}

/// One registered custom cipher.
#[derive(Clone)]
pub struct CustomEncryptionConfig {
    /// User-chosen version label; packed into the envelope tag.
    pub version: String,
    pub cipher: Arc<dyn CustomCipher>,
    /// Whether new writes use this cipher.
    pub is_current: bool,
}

impl CustomEncryptionConfig {
    pub fn new(version: impl Into<String>, cipher: impl CustomCipher + 'static) -> Self {
        Self {
            version: version.into(),
            cipher: Arc::new(cipher),
            is_current: false,
        }
    }

    /// Builder-style flag marking this cipher as the write path.
    pub fn current(mut self) -> Self {
        self.is_current = true;
        self
    }

    /// Packed envelope tag for this config.
    pub fn handle(&self) -> CustomHandle {
        CustomHandle::for_version(&self.version)
    }
}

impl fmt::Debug for CustomEncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomEncryptionConfig")
            .field("version", &self.version)
            .field("is_current", &self.is_current)
            .finish_non_exhaustive()
    }
}

/// Packed custom envelope tag: `'c' + base64(version)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomHandle(String);

impl CustomHandle {
    pub fn for_version(version: &str) -> Self {
        Self(format!("c{}", STANDARD.encode(version)))
    }

    /// Wrap a tag read from an envelope. The caller has checked the `c` prefix.
    pub(crate) fn from_tag(tag: &str) -> Self {
        Self(tag.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single failed (config, secret) pair from the self-test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfTestFailure {
    pub config_version: String,
    pub secret_version: u32,
    pub reason: String,
}

impl fmt::Display for SelfTestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "custom cipher {:?} with secret version {}: {}",
            self.config_version, self.secret_version, self.reason
        )
    }
}

fn join_failures(failures: &[SelfTestFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from registering or validating custom ciphers.
#[derive(Debug, Error)]
pub enum CustomCipherError {
    /// Custom ciphers need key material, but no secret source is configured.
    #[error("custom encryption requires a secret source")]
    NoSecretSource,

    #[error("custom encryption version must not be empty")]
    EmptyVersion,

    #[error("custom encryption version {0:?} is registered more than once")]
    DuplicateVersion(String),

    #[error("more than one custom encryption config is marked current")]
    MultipleCurrent,

    /// Custom ciphers are registered, but no secret is flagged for them.
    #[error("no secret is flagged for custom encryption")]
    NoCustomSecrets,

    /// Aggregate of every failed self-test pair.
    #[error("custom encryption self-test failed: {}", join_failures(.0))]
    SelfTestFailed(Vec<SelfTestFailure>),
}

/// Immutable index of custom ciphers keyed by packed tag.
///
/// The current write cipher is fixed at registration. Changing it means
/// building a new registry.
#[derive(Clone, Debug, Default)]
pub struct CustomCipherRegistry {
    by_tag: HashMap<CustomHandle, CustomEncryptionConfig>,
    current: Option<CustomHandle>,
}

impl CustomCipherRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and index `configs`.
    ///
    /// # Errors
    ///
    /// - [`CustomCipherError::NoSecretSource`] when configs are given but
    ///   `has_secret_source` is false.
    /// - [`CustomCipherError::EmptyVersion`], [`CustomCipherError::DuplicateVersion`],
    ///   or [`CustomCipherError::MultipleCurrent`] for invalid sets.
    pub fn register(
        configs: Vec<CustomEncryptionConfig>,
        has_secret_source: bool,
    ) -> Result<Self, CustomCipherError> {
        if configs.is_empty() {
            return Ok(Self::new());
        }
        if !has_secret_source {
            return Err(CustomCipherError::NoSecretSource);
        }

        let mut by_tag = HashMap::with_capacity(configs.len());
        let mut current = None;
        for config in configs {
            if config.version.is_empty() {
                return Err(CustomCipherError::EmptyVersion);
            }
            let handle = config.handle();
            if config.is_current {
                if current.is_some() {
                    return Err(CustomCipherError::MultipleCurrent);
                }
                current = Some(handle.clone());
            }
            if by_tag.contains_key(&handle) {
                return Err(CustomCipherError::DuplicateVersion(config.version));
            }
            by_tag.insert(handle, config);
        }

        info!(
            count = by_tag.len(),
            current = current.as_ref().map(CustomHandle::as_str),
            "custom ciphers registered"
        );
        Ok(Self { by_tag, current })
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    /// Look up a config by packed tag.
    pub fn get(&self, handle: &CustomHandle) -> Option<&CustomEncryptionConfig> {
        self.by_tag.get(handle)
    }

    /// The config used for new writes, if any.
    pub fn current(&self) -> Option<(&CustomHandle, &CustomEncryptionConfig)> {
        let handle = self.current.as_ref()?;
        self.by_tag.get(handle).map(|config| (handle, config))
    }

    /// Round-trip sample text through every (config, custom secret) pair.
    ///
    /// An empty registry always passes.
    ///
    /// # Errors
    ///
    /// [`CustomCipherError::NoCustomSecrets`] when no secret is flagged for
    /// custom encryption; otherwise [`CustomCipherError::SelfTestFailed`]
    /// listing every failing pair.
    pub fn validate(&self, secrets: &SecretsData) -> Result<(), CustomCipherError> {
        if self.is_empty() {
            return Ok(());
        }
        let custom_secrets: Vec<_> = secrets.custom_secrets().collect();
        if custom_secrets.is_empty() {
            return Err(CustomCipherError::NoCustomSecrets);
        }

        let mut failures = Vec::new();
        for config in self.by_tag.values() {
            for secret in &custom_secrets {
                let version = secret.version();
                let outcome = secret.with_material(|material| {
                    let encrypted = config
                        .cipher
                        .encrypt(SELF_TEST_TEXT, material, version)
                        .map_err(|e| format!("encrypt failed: {e:#}"))?;
                    let packed = format!("{}{SEPARATOR}{encrypted}", config.handle());
                    let payload = match split_envelope(&packed) {
                        Ok((VersionTag::Custom(handle), payload)) if handle == config.handle() => payload,
                        _ => {
                            return Err(format!(
                                "ciphertext does not survive envelope packing (contains {SEPARATOR:?}?)"
                            ))
                        }
                    };
                    let decrypted = config
                        .cipher
                        .decrypt(payload, material, version)
                        .map_err(|e| format!("decrypt failed: {e:#}"))?;
                    if decrypted != SELF_TEST_TEXT {
                        return Err("decrypted value does not match the original".to_owned());
                    }
                    Ok(())
                });
                if let Err(reason) = outcome {
                    warn!(config = %config.version, secret_version = version, "custom cipher self-test failed");
                    failures.push(SelfTestFailure {
                        config_version: config.version.clone(),
                        secret_version: version,
                        reason,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            failures.sort_by(|a, b| {
                (&a.config_version, a.secret_version).cmp(&(&b.config_version, b.secret_version))
            });
            Err(CustomCipherError::SelfTestFailed(failures))
        }
    }
}
