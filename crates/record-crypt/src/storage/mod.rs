//! Storage facade: the record codec composed with a [`RecordStore`].
//!
//! # Request flow
//!
//! ```text
//! write:  Record ──► hash keys + seal body ──► WireRecord ──► store
//! read:   key ──► hash ──► store ──► WireRecord ──► open body ──► Record
//! find:   filter ──► hash searchable operands ──► store ──► decode each record
//! ```
//!
//! Every operation resolves secrets exactly once. Batch decodes isolate
//! per-record failures into [`FindResult::errors`].

pub mod migration;
pub mod store;

pub use store::RecordStore;

use std::sync::Arc;

use common::protocol::{FindFilter, FindMeta, FindOptions, Record};
use tracing::debug;

use crate::codec::{DecodeFailure, RecordCodec};
use crate::config::CryptConfig;
use crate::crypto::EnvelopeEngine;
use crate::custom::{CustomCipherRegistry, CustomEncryptionConfig};
use crate::error::Error;
use crate::secrets::{FileSecretSource, SecretResolver, SecretSource, SecretsData};

/// Largest page a single `find` may request.
pub const MAX_FIND_LIMIT: u32 = 100;

/// Decoded page of a `find`.
#[derive(Debug, Default)]
pub struct FindResult {
    pub records: Vec<Record>,
    /// Records that could not be decoded, with their raw stored form.
    pub errors: Vec<DecodeFailure>,
    pub meta: FindMeta,
}

/// Configures and validates a [`Storage`] client.
#[derive(Default)]
pub struct StorageBuilder {
    environment_id: Option<String>,
    normalize_keys: bool,
    resolver: Option<SecretResolver>,
    custom: Vec<CustomEncryptionConfig>,
}

impl StorageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a builder from [`CryptConfig`]. A configured secrets file becomes
    /// a [`FileSecretSource`].
    pub fn from_config(cfg: &CryptConfig) -> Self {
        let builder = Self::new()
            .environment_id(cfg.environment_id.clone())
            .normalize_keys(cfg.normalize_keys);
        match &cfg.secrets_file {
            Some(path) => builder.secret_source(FileSecretSource::new(path)),
            None => builder,
        }
    }

    pub fn environment_id(mut self, id: impl Into<String>) -> Self {
        self.environment_id = Some(id.into());
        self
    }

    pub fn normalize_keys(mut self, normalize: bool) -> Self {
        self.normalize_keys = normalize;
        self
    }

    pub fn secret_source(mut self, source: impl SecretSource + 'static) -> Self {
        self.resolver = Some(SecretResolver::new(source));
        self
    }

    pub fn custom_encryption(mut self, configs: Vec<CustomEncryptionConfig>) -> Self {
        self.custom = configs;
        self
    }

    /// Validate the configuration and attach `store`.
    ///
    /// When custom ciphers are registered, secrets are resolved once and every
    /// cipher is self-tested against them.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when the environment id is missing.
    /// - [`Error::Custom`] for an invalid custom cipher set or a failed self-test.
    /// - [`Error::Secret`] when the secrets needed for the self-test cannot be
    ///   resolved.
    pub async fn build<S: RecordStore>(self, store: S) -> Result<Storage<S>, Error> {
        let environment_id = self
            .environment_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| Error::Config("environment id is required".into()))?;

        let registry = CustomCipherRegistry::register(self.custom, self.resolver.is_some())?;
        if let (false, Some(resolver)) = (registry.is_empty(), &self.resolver) {
            let secrets = resolver.resolve().await?;
            registry.validate(&secrets)?;
        }

        let engine = EnvelopeEngine::new(self.resolver, registry);
        debug!(
            encrypted = engine.has_secrets(),
            custom_ciphers = engine.custom_ciphers().len(),
            normalize_keys = self.normalize_keys,
            "storage client configured"
        );
        Ok(Storage {
            store,
            codec: RecordCodec::new(engine, environment_id, self.normalize_keys),
        })
    }
}

/// Record storage client that hashes and encrypts on the way out and
/// reverses it on the way in.
#[derive(Debug, Clone)]
pub struct Storage<S> {
    store: S,
    codec: RecordCodec,
}

impl<S: RecordStore> Storage<S> {
    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub fn codec(&self) -> &RecordCodec {
        &self.codec
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn write(&self, country: &str, record: Record) -> Result<(), Error> {
        let country = normalize_country(country)?;
        validate_record(&record)?;
        let wire = self.codec.encode(record).await?;
        self.store.write(&country, wire).await?;
        Ok(())
    }

    /// Read one record by its plain key. `Ok(None)` when it does not exist.
    pub async fn read(&self, country: &str, key: &str) -> Result<Option<Record>, Error> {
        let country = normalize_country(country)?;
        if key.is_empty() {
            return Err(Error::Validation("key must not be empty".into()));
        }
        match self.store.read(&country, &self.codec.hash(key)).await? {
            Some(wire) => Ok(Some(self.codec.decode(&wire).await?)),
            None => Ok(None),
        }
    }

    /// Encode and write several records in one store call.
    pub async fn batch_write(&self, country: &str, records: Vec<Record>) -> Result<(), Error> {
        let country = normalize_country(country)?;
        if records.is_empty() {
            return Err(Error::Validation("batch must contain at least one record".into()));
        }
        records.iter().try_for_each(validate_record)?;
        let wires = self.codec.encode_many(records).await?;
        self.store.batch_write(&country, wires).await?;
        Ok(())
    }

    /// Find a page of records. Undecodable records land in
    /// [`FindResult::errors`] without failing the call.
    pub async fn find(
        &self,
        country: &str,
        filter: &FindFilter,
        options: FindOptions,
    ) -> Result<FindResult, Error> {
        let country = normalize_country(country)?;
        validate_limit(options.limit)?;

        let secrets = Arc::new(self.codec.engine().snapshot().await?);
        let page = self
            .store
            .find(&country, &self.codec.hash_filter(filter), options)
            .await?;
        let (records, errors) = self.codec.decode_many_with(secrets, page.records).await?;
        Ok(FindResult {
            records,
            errors,
            meta: page.meta,
        })
    }

    /// First record matching `filter`.
    ///
    /// If the only match cannot be decoded, its decode error is returned.
    pub async fn find_one(&self, country: &str, filter: &FindFilter) -> Result<Option<Record>, Error> {
        let options = FindOptions { limit: 1, offset: 0 };
        let FindResult {
            records, errors, ..
        } = self.find(country, filter, options).await?;
        if let Some(record) = records.into_iter().next() {
            return Ok(Some(record));
        }
        match errors.into_iter().next() {
            Some(failure) => Err(failure.error.into()),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, country: &str, key: &str) -> Result<(), Error> {
        let country = normalize_country(country)?;
        if key.is_empty() {
            return Err(Error::Validation("key must not be empty".into()));
        }
        self.store.delete(&country, &self.codec.hash(key)).await?;
        Ok(())
    }
}

/// Country codes are routed case-insensitively; stores always see lowercase.
fn normalize_country(country: &str) -> Result<String, Error> {
    let country = country.trim();
    if country.is_empty() {
        return Err(Error::Validation("country must not be empty".into()));
    }
    Ok(country.to_lowercase())
}

fn validate_record(record: &Record) -> Result<(), Error> {
    if record.key.is_empty() {
        return Err(Error::Validation("record key must not be empty".into()));
    }
    Ok(())
}

pub(crate) fn validate_limit(limit: u32) -> Result<(), Error> {
    if limit == 0 || limit > MAX_FIND_LIMIT {
        return Err(Error::Validation(format!(
            "limit must be between 1 and {MAX_FIND_LIMIT}, got {limit}"
        )));
    }
    Ok(())
}
