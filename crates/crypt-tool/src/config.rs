//! Configuration loading and validation for `crypt-tool`.

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
    /// JSON secrets file. Without it only plaintext envelopes can be produced.
    #[serde(default)]
    pub secrets_file: Option<String>,

    /// Environment id mixed into key hashes.
    #[serde(default = "default_environment_id")]
    pub environment_id: String,

    #[serde(default)]
    pub normalize_keys: bool,

    /// Tracing log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_environment_id() -> String {
    "local".into()
}
fn default_log_level() -> String {
    "warn".into()
}

impl ToolConfig {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("failed to build crypt-tool configuration")?;

        let c: ToolConfig = cfg
            .try_deserialize()
            .context("failed to deserialise crypt-tool configuration")?;

        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<()> {
        if self.environment_id.trim().is_empty() {
            anyhow::bail!("ENVIRONMENT_ID must not be empty");
        }
        if self.secrets_file.as_deref().is_some_and(|p| p.trim().is_empty()) {
            anyhow::bail!("SECRETS_FILE must not be empty when set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ToolConfig {
        ToolConfig {
            secrets_file: Some("/run/secrets.json".into()),
            environment_id: "env-1".into(),
            normalize_keys: false,
            log_level: "warn".into(),
        }
    }

    #[test]
    fn defaults() {
        assert_eq!(default_environment_id(), "local");
        assert_eq!(default_log_level(), "warn");
    }

    #[test]
    fn validate_rejects_empty_environment_id() {
        let cfg = ToolConfig {
            environment_id: " ".into(),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_secrets_file() {
        let cfg = ToolConfig {
            secrets_file: Some("".into()),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_valid_config() {
        assert!(valid().validate().is_ok());
        let no_secrets = ToolConfig {
            secrets_file: None,
            ..valid()
        };
        assert!(no_secrets.validate().is_ok());
    }
}
