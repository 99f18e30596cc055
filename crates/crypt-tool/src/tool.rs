//! Command implementations. Each returns the text printed on stdout.

use anyhow::{Context, Result};
use common::protocol::Record;
use record_crypt::custom::CustomCipherRegistry;
use record_crypt::secrets::{FileSecretSource, SecretResolver, SecretsData};
use record_crypt::{EnvelopeEngine, RecordCodec};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::args::Command;
use crate::config::ToolConfig;

const SELF_TEST_KEY: &str = "crypt-tool-self-test";
const SELF_TEST_BODY: &str = "crypt-tool self-test";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EncryptOutput {
    message: String,
    secret_version: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckReport {
    current_version: u32,
    versions: Vec<VersionReport>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionReport {
    version: u32,
    is_key: bool,
    status: String,
}

pub async fn run(command: Command, cfg: &ToolConfig) -> Result<String> {
    let codec = build_codec(cfg);
    match command {
        Command::Encrypt { text } => {
            let text = input_or_stdin(text).await?;
            let encrypted = codec.engine().encrypt(&text).await?;
            Ok(serde_json::to_string(&EncryptOutput {
                message: encrypted.message,
                secret_version: encrypted.secret_version,
            })?)
        }
        Command::Decrypt {
            secret_version,
            envelope,
        } => {
            let envelope = input_or_stdin(envelope).await?;
            Ok(codec.engine().decrypt(&envelope, secret_version).await?)
        }
        Command::Hash { value } => Ok(codec.hash(&value)),
        Command::Check {} => check(&codec).await,
    }
}

fn build_codec(cfg: &ToolConfig) -> RecordCodec {
    let resolver = cfg
        .secrets_file
        .as_ref()
        .map(|path| SecretResolver::new(FileSecretSource::new(path)));
    let engine = EnvelopeEngine::new(resolver, CustomCipherRegistry::new());
    RecordCodec::new(engine, cfg.environment_id.clone(), cfg.normalize_keys)
}

async fn input_or_stdin(arg: Option<String>) -> Result<String> {
    if let Some(value) = arg {
        return Ok(value);
    }
    let mut buf = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buf)
        .await
        .context("failed to read stdin")?;
    Ok(buf.trim_end_matches(['\r', '\n']).to_owned())
}

/// Write and read back a test record under every non-custom secret version.
async fn check(codec: &RecordCodec) -> Result<String> {
    let secrets = codec
        .engine()
        .snapshot()
        .await?
        .context("SECRETS_FILE is not set; nothing to check")?;

    let mut versions = Vec::with_capacity(secrets.secrets().len());
    let mut failed = 0;
    for secret in secrets.secrets() {
        let status = if secret.is_for_custom_encryption() {
            "skipped: reserved for custom encryption".to_owned()
        } else {
            match round_trip(codec, &secrets, secret.version()) {
                Ok(()) => "ok".to_owned(),
                Err(e) => {
                    failed += 1;
                    warn!(version = secret.version(), error = %e, "self-test failed");
                    format!("failed: {e:#}")
                }
            }
        };
        versions.push(VersionReport {
            version: secret.version(),
            is_key: secret.is_key(),
            status,
        });
    }

    let report = serde_json::to_string_pretty(&CheckReport {
        current_version: secrets.current_version(),
        versions,
    })?;
    if failed > 0 {
        anyhow::bail!("{failed} secret version(s) failed the self-test:\n{report}");
    }
    info!(current_version = secrets.current_version(), "secrets check passed");
    Ok(report)
}

fn round_trip(codec: &RecordCodec, secrets: &SecretsData, version: u32) -> Result<()> {
    // Pin the write path to `version` by making it current in a copy.
    let pinned = SecretsData::new(version, secrets.secrets().to_vec())?;
    let record = Record::new(SELF_TEST_KEY).with_body(SELF_TEST_BODY);
    let wire = codec.encode_with(Some(&pinned), record.clone())?;
    let decoded = codec.decode_with(Some(secrets), &wire)?;
    if decoded != record {
        anyhow::bail!("round trip returned a different record");
    }
    Ok(())
}
