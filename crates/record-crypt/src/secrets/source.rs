//! User-supplied secret sources.
//!
//! A source is queried on every resolution; nothing here caches its output,
//! so rotating the backing secret takes effect on the next operation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::data::SecretsData;

/// What a [`SecretSource`] hands back: a bare secret or a full versioned set.
#[derive(Debug, Clone)]
pub enum SecretsInput {
    /// A single password-style secret, treated as version 0.
    Plain(String),
    /// A validated multi-version set.
    Structured(SecretsData),
}

impl From<&str> for SecretsInput {
    fn from(s: &str) -> Self {
        SecretsInput::Plain(s.to_owned())
    }
}

impl From<String> for SecretsInput {
    fn from(s: String) -> Self {
        SecretsInput::Plain(s)
    }
}

impl From<SecretsData> for SecretsInput {
    fn from(d: SecretsData) -> Self {
        SecretsInput::Structured(d)
    }
}

/// Provider of secret material. Implementations may suspend (e.g. to call a
/// secrets manager).
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Fetch the current secret material.
    async fn fetch(&self) -> Result<SecretsInput>;
}

/// A fixed secret value supplied at construction.
#[derive(Debug, Clone)]
pub struct StaticSecrets(SecretsInput);

impl StaticSecrets {
    pub fn new(input: impl Into<SecretsInput>) -> Self {
        Self(input.into())
    }
}

#[async_trait]
impl SecretSource for StaticSecrets {
    async fn fetch(&self) -> Result<SecretsInput> {
        Ok(self.0.clone())
    }
}

/// Reads secrets from a JSON file on every fetch.
///
/// The file holds either a JSON string (bare secret) or a `SecretsData`
/// object: `{"currentVersion": 1, "secrets": [{"secret": "..", "version": 1}]}`.
#[derive(Debug, Clone)]
pub struct FileSecretSource {
    path: PathBuf,
}

impl FileSecretSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SecretSource for FileSecretSource {
    async fn fetch(&self) -> Result<SecretsInput> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read secrets file {}", self.path.display()))?;
        parse_secrets_json(&bytes)
            .with_context(|| format!("invalid secrets file {}", self.path.display()))
    }
}

/// Parse a JSON document as either a bare secret string or a `SecretsData` object.
pub fn parse_secrets_json(bytes: &[u8]) -> Result<SecretsInput> {
    let value: Value = serde_json::from_slice(bytes).context("not valid JSON")?;
    match value {
        Value::String(s) => Ok(SecretsInput::Plain(s)),
        other => {
            let data: SecretsData =
                serde_json::from_value(other).context("not a valid secrets object")?;
            Ok(SecretsInput::Structured(data))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_bare_string() {
        let input = parse_secrets_json(br#""my-secret""#).unwrap();
        assert!(matches!(input, SecretsInput::Plain(ref s) if s == "my-secret"));
    }

    #[test]
    fn parses_structured() {
        let input = parse_secrets_json(
            br#"{"currentVersion":2,"secrets":[{"secret":"x","version":2}]}"#,
        )
        .unwrap();
        match input {
            SecretsInput::Structured(d) => assert_eq!(d.current_version(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_structure() {
        assert!(parse_secrets_json(br#"{"currentVersion":2,"secrets":[]}"#).is_err());
        assert!(parse_secrets_json(b"not json").is_err());
    }

    #[tokio::test]
    async fn file_source_rereads_on_every_fetch() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#""first""#).unwrap();
        let source = FileSecretSource::new(file.path());
        assert!(matches!(source.fetch().await.unwrap(), SecretsInput::Plain(ref s) if s == "first"));

        std::fs::write(
            file.path(),
            r#"{"currentVersion":1,"secrets":[{"secret":"second","version":1}]}"#,
        )
        .unwrap();
        assert!(matches!(
            source.fetch().await.unwrap(),
            SecretsInput::Structured(ref d) if d.current_version() == 1
        ));
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let source = FileSecretSource::new("/nonexistent/secrets.json");
        assert!(source.fetch().await.is_err());
    }
}
