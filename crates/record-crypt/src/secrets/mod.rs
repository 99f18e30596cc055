//! Secret resolution: turning a user-supplied source into a validated,
//! versioned secret set.
//!
//! # Lifecycle
//!
//! 1. The application supplies a [`SecretSource`] when building the storage
//!    client.
//! 2. Each logical operation calls [`SecretResolver::resolve`] exactly once and
//!    works from the returned [`SecretsData`] snapshot.
//! 3. The snapshot is dropped at the end of the operation. Nothing is cached,
//!    so a rotated secret is picked up by the next call without a restart.
//!
//! # Security invariants
//!
//! - Secret material is never logged; `Debug` output is redacted.
//! - Secret strings are zeroed when the owning [`SecretOrKey`] is dropped.

pub mod data;
pub mod source;

pub use data::{SecretError, SecretOrKey, SecretsData, DEFAULT_VERSION};
pub use source::{FileSecretSource, SecretSource, SecretsInput, StaticSecrets};

use std::sync::Arc;

use tracing::debug;

/// Resolves a [`SecretSource`] into a validated [`SecretsData`] on demand.
#[derive(Clone)]
pub struct SecretResolver {
    source: Arc<dyn SecretSource>,
}

impl SecretResolver {
    pub fn new(source: impl SecretSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Query the source and normalise its output.
    ///
    /// A bare string becomes a single secret at [`DEFAULT_VERSION`].
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Source`] if the source itself fails, or a
    /// validation error if the returned data breaks the [`SecretsData`]
    /// invariants.
    pub async fn resolve(&self) -> Result<SecretsData, SecretError> {
        let input = self
            .source
            .fetch()
            .await
            .map_err(|e| SecretError::Source(format!("{e:#}")))?;

        let data = match input {
            SecretsInput::Plain(secret) => SecretsData::from_secret(secret)?,
            SecretsInput::Structured(data) => data,
        };
        debug!(
            current_version = data.current_version(),
            versions = data.secrets().len(),
            "secrets resolved"
        );
        Ok(data)
    }
}

impl std::fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretResolver")
    }
}
