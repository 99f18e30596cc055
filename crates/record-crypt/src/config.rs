//! Environment-driven configuration for a storage client.
//!
//! Values come from environment variables (`ENVIRONMENT_ID`, `NORMALIZE_KEYS`,
//! `SECRETS_FILE`, `LOG_LEVEL`). Applications that wire everything in code can
//! skip this module and use [`StorageBuilder`](crate::storage::StorageBuilder)
//! directly.

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CryptConfig {
    /// Mixed into every searchable-key hash. **Required.**
    pub environment_id: String,

    /// Lowercase searchable values before hashing.
    #[serde(default)]
    pub normalize_keys: bool,

    /// JSON file holding a bare secret string or a secrets object. Without
    /// it, records are stored as plaintext envelopes.
    #[serde(default)]
    pub secrets_file: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl CryptConfig {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("failed to build configuration from environment")?;

        let c: CryptConfig = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    pub fn validate(&self) -> Result<()> {
        if self.environment_id.trim().is_empty() {
            anyhow::bail!("ENVIRONMENT_ID is required and must not be empty");
        }
        if let Some(path) = &self.secrets_file {
            if path.trim().is_empty() {
                anyhow::bail!("SECRETS_FILE must not be empty when set");
            }
        }
        Ok(())
    }
}
