//! Record codec: application [`Record`] ⇄ stored [`WireRecord`].
//!
//! # Write path
//!
//! 1. Each searchable field (`key`, `key2`, `key3`, `profile_key`) is moved
//!    into [`RecordBody::meta`] and replaced with
//!    `hex(SHA-256(normalize(value) + ":" + environment_id))`.
//! 2. The body becomes [`RecordBody::payload`].
//! 3. The serialised [`RecordBody`] is encrypted by the [`EnvelopeEngine`].
//!
//! # Read path
//!
//! The envelope is decrypted with the record's stored secret version. A
//! `{meta, payload}` document restores the original field values; anything
//! else is returned as an opaque body.

pub mod body;

pub use body::RecordBody;

use std::sync::Arc;

use common::protocol::{FindFilter, Record, WireRecord};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::crypto::{EnvelopeEngine, EnvelopeError};
use crate::secrets::{SecretsData, DEFAULT_VERSION};

/// Fields hashed before leaving the process.
pub const SEARCHABLE_FIELDS: [&str; 4] = ["key", "key2", "key3", "profile_key"];

/// Errors produced while encoding or decoding records.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("failed to serialise record body: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A fan-out worker panicked or was cancelled.
    #[error("record worker failed: {0}")]
    Worker(String),
}

/// A record that could not be decoded, kept alongside the raw stored form.
#[derive(Debug)]
pub struct DecodeFailure {
    pub error: CodecError,
    pub raw: WireRecord,
}

/// Maps records to and from their encrypted wire form.
///
/// Cheap to clone; the engine and environment id are shared.
#[derive(Clone, Debug)]
pub struct RecordCodec {
    engine: EnvelopeEngine,
    environment_id: Arc<str>,
    normalize_keys: bool,
}

impl RecordCodec {
    pub fn new(engine: EnvelopeEngine, environment_id: impl Into<String>, normalize_keys: bool) -> Self {
        Self {
            engine,
            environment_id: Arc::from(environment_id.into()),
            normalize_keys,
        }
    }

    pub fn engine(&self) -> &EnvelopeEngine {
        &self.engine
    }

    /// Hash a searchable value for this environment.
    pub fn hash(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        if self.normalize_keys {
            hasher.update(value.to_lowercase().as_bytes());
        } else {
            hasher.update(value.as_bytes());
        }
        hasher.update(b":");
        hasher.update(self.environment_id.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Rewrite a find filter so searchable-field operands match stored hashes.
    pub fn hash_filter(&self, filter: &FindFilter) -> FindFilter {
        filter
            .iter()
            .map(|(field, cond)| {
                let cond = if SEARCHABLE_FIELDS.contains(&field.as_str()) {
                    cond.map_strings(&|s| self.hash(s))
                } else {
                    cond.clone()
                };
                (field.clone(), cond)
            })
            .collect()
    }

    /// Encode one record, resolving secrets for this call.
    pub async fn encode(&self, record: Record) -> Result<WireRecord, CodecError> {
        let secrets = self.engine.snapshot().await?;
        self.encode_with(secrets.as_ref(), record)
    }

    /// Decode one record, resolving secrets for this call.
    pub async fn decode(&self, wire: &WireRecord) -> Result<Record, CodecError> {
        let secrets = self.engine.snapshot().await?;
        self.decode_with(secrets.as_ref(), wire)
    }

    /// Encode a record against an already-resolved secret snapshot.
    pub fn encode_with(
        &self,
        secrets: Option<&SecretsData>,
        record: Record,
    ) -> Result<WireRecord, CodecError> {
        let mut body = RecordBody {
            payload: record.body,
            ..RecordBody::default()
        };
        body.meta.insert("key".into(), Some(record.key.clone()));
        let key = self.hash(&record.key);

        let mut hash_optional = |name: &str, value: Option<String>| {
            let hashed = value.as_deref().map(|v| self.hash(v));
            if value.is_some() {
                body.meta.insert(name.to_owned(), value);
            }
            hashed
        };
        let key2 = hash_optional("key2", record.key2);
        let key3 = hash_optional("key3", record.key3);
        let profile_key = hash_optional("profile_key", record.profile_key);

        let encrypted = self
            .engine
            .encrypt_with(secrets, &serde_json::to_string(&body)?)?;

        Ok(WireRecord {
            key,
            key2,
            key3,
            profile_key,
            range_key: record.range_key,
            body: Some(encrypted.message),
            version: encrypted.secret_version,
        })
    }

    /// Decode a record against an already-resolved secret snapshot.
    pub fn decode_with(
        &self,
        secrets: Option<&SecretsData>,
        wire: &WireRecord,
    ) -> Result<Record, CodecError> {
        let mut record = Record {
            key: wire.key.clone(),
            key2: wire.key2.clone(),
            key3: wire.key3.clone(),
            profile_key: wire.profile_key.clone(),
            range_key: wire.range_key,
            body: None,
        };
        let Some(envelope) = wire.body.as_deref() else {
            return Ok(record);
        };

        let decrypted = self.engine.decrypt_with(secrets, envelope, wire.version)?;
        match RecordBody::parse(&decrypted) {
            Some(body) => {
                record.body = body.payload;
                for (field, value) in body.meta {
                    match field.as_str() {
                        "key" => {
                            if let Some(v) = value {
                                record.key = v;
                            }
                        }
                        "key2" => record.key2 = value,
                        "key3" => record.key3 = value,
                        "profile_key" => record.profile_key = value,
                        _ => {}
                    }
                }
            }
            None => record.body = Some(decrypted),
        }
        Ok(record)
    }

    /// Encode a batch. Secrets are resolved once; output order matches input.
    ///
    /// # Errors
    ///
    /// Fails on the first record that cannot be encoded.
    pub async fn encode_many(&self, records: Vec<Record>) -> Result<Vec<WireRecord>, CodecError> {
        let secrets = Arc::new(self.engine.snapshot().await?);
        self.encode_many_with(secrets, records).await
    }

    /// [`Self::encode_many`] against an already-resolved snapshot.
    pub async fn encode_many_with(
        &self,
        secrets: Arc<Option<SecretsData>>,
        records: Vec<Record>,
    ) -> Result<Vec<WireRecord>, CodecError> {
        let handles: Vec<JoinHandle<Result<WireRecord, CodecError>>> = records
            .into_iter()
            .map(|record| {
                let codec = self.clone();
                let secrets = Arc::clone(&secrets);
                tokio::task::spawn_blocking(move || codec.encode_with((*secrets).as_ref(), record))
            })
            .collect();

        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(join(handle).await??);
        }
        Ok(out)
    }

    /// Decode a batch, isolating per-record failures.
    ///
    /// Secrets are resolved once. Successfully decoded records keep their
    /// relative order; failures are returned separately with the raw record.
    ///
    /// # Errors
    ///
    /// Only fails as a whole if secret resolution itself fails.
    pub async fn decode_many(
        &self,
        wires: Vec<WireRecord>,
    ) -> Result<(Vec<Record>, Vec<DecodeFailure>), CodecError> {
        let secrets = Arc::new(self.engine.snapshot().await?);
        self.decode_many_with(secrets, wires).await
    }

    /// [`Self::decode_many`] against an already-resolved snapshot.
    ///
    /// # Errors
    ///
    /// Fails only if a worker task panics.
    pub async fn decode_many_with(
        &self,
        secrets: Arc<Option<SecretsData>>,
        wires: Vec<WireRecord>,
    ) -> Result<(Vec<Record>, Vec<DecodeFailure>), CodecError> {
        self.each_isolated(secrets, wires, RecordCodec::decode_with).await
    }

    /// Re-encrypt a stored record under the current secret.
    ///
    /// The decrypted body is sealed again as-is and the hashed fields are kept,
    /// so bodies written without a `{meta, payload}` document keep their keys.
    pub fn reseal_with(
        &self,
        secrets: Option<&SecretsData>,
        wire: &WireRecord,
    ) -> Result<WireRecord, CodecError> {
        let mut resealed = wire.clone();
        match wire.body.as_deref() {
            Some(envelope) => {
                let plaintext = self.engine.decrypt_with(secrets, envelope, wire.version)?;
                let encrypted = self.engine.encrypt_with(secrets, &plaintext)?;
                resealed.body = Some(encrypted.message);
                resealed.version = encrypted.secret_version;
            }
            None => {
                resealed.version = secrets.map_or(DEFAULT_VERSION, SecretsData::current_version);
            }
        }
        Ok(resealed)
    }

    /// [`Self::reseal_with`] over a batch, isolating per-record failures.
    ///
    /// # Errors
    ///
    /// Fails only if a worker task panics.
    pub async fn reseal_many_with(
        &self,
        secrets: Arc<Option<SecretsData>>,
        wires: Vec<WireRecord>,
    ) -> Result<(Vec<WireRecord>, Vec<DecodeFailure>), CodecError> {
        self.each_isolated(secrets, wires, RecordCodec::reseal_with).await
    }

    async fn each_isolated<T, F>(
        &self,
        secrets: Arc<Option<SecretsData>>,
        wires: Vec<WireRecord>,
        op: F,
    ) -> Result<(Vec<T>, Vec<DecodeFailure>), CodecError>
    where
        T: Send + 'static,
        F: Fn(&RecordCodec, Option<&SecretsData>, &WireRecord) -> Result<T, CodecError>
            + Copy
            + Send
            + 'static,
    {
        let handles: Vec<_> = wires
            .into_iter()
            .map(|wire| {
                let codec = self.clone();
                let secrets = Arc::clone(&secrets);
                tokio::task::spawn_blocking(move || {
                    let outcome = op(&codec, (*secrets).as_ref(), &wire);
                    (outcome, wire)
                })
            })
            .collect();

        let mut done = Vec::new();
        let mut errors = Vec::new();
        for handle in handles {
            let (outcome, raw) = join(handle).await?;
            match outcome {
                Ok(value) => done.push(value),
                Err(error) => {
                    warn!(error = %error, version = raw.version, "record decode failed");
                    errors.push(DecodeFailure { error, raw });
                }
            }
        }
        Ok((done, errors))
    }
}

async fn join<T>(handle: JoinHandle<T>) -> Result<T, CodecError> {
    handle.await.map_err(|e| CodecError::Worker(e.to_string()))
}
