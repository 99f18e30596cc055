//! Shared fixtures for integration tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::protocol::{FindFilter, FindMeta, FindOptions, FindPage, WireRecord};
use common::StoreError;
use record_crypt::secrets::{SecretsInput, SecretSource};
use record_crypt::RecordStore;

/// In-memory record store keyed by (country, hashed key).
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<(String, String), WireRecord>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn all(&self, country: &str) -> Vec<WireRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|((c, _), _)| c == country)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn insert_raw(&self, country: &str, record: WireRecord) {
        self.records
            .lock()
            .unwrap()
            .insert((country.to_owned(), record.key.clone()), record);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn write(&self, country: &str, record: WireRecord) -> Result<(), StoreError> {
        self.insert_raw(country, record);
        Ok(())
    }

    async fn batch_write(&self, country: &str, records: Vec<WireRecord>) -> Result<(), StoreError> {
        for record in records {
            self.insert_raw(country, record);
        }
        Ok(())
    }

    async fn read(&self, country: &str, key: &str) -> Result<Option<WireRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(country.to_owned(), key.to_owned()))
            .cloned())
    }

    async fn find(
        &self,
        country: &str,
        filter: &FindFilter,
        options: FindOptions,
    ) -> Result<FindPage, StoreError> {
        let matching: Vec<WireRecord> = self
            .all(country)
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        let total = matching.len() as u64;
        let records: Vec<WireRecord> = matching
            .into_iter()
            .skip(options.offset as usize)
            .take(options.limit as usize)
            .collect();
        Ok(FindPage {
            meta: FindMeta {
                count: records.len() as u64,
                limit: options.limit,
                offset: options.offset,
                total,
            },
            records,
        })
    }

    async fn delete(&self, country: &str, key: &str) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap()
            .remove(&(country.to_owned(), key.to_owned()))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))
    }
}

/// Secret source whose contents can be swapped mid-test to simulate rotation.
#[derive(Clone)]
pub struct RotatingSecrets(Arc<Mutex<SecretsInput>>);

impl RotatingSecrets {
    pub fn new(input: impl Into<SecretsInput>) -> Self {
        Self(Arc::new(Mutex::new(input.into())))
    }

    pub fn rotate(&self, input: impl Into<SecretsInput>) {
        *self.0.lock().unwrap() = input.into();
    }
}

#[async_trait]
impl SecretSource for RotatingSecrets {
    async fn fetch(&self) -> anyhow::Result<SecretsInput> {
        Ok(self.0.lock().unwrap().clone())
    }
}
