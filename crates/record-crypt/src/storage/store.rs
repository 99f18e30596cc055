//! [`RecordStore`]: the transport collaborator the storage client writes through.
//!
//! Implementations own HTTP, retries, and endpoint routing. They only ever
//! see [`WireRecord`]s: hashed keys and encrypted bodies.

use std::sync::Arc;

use async_trait::async_trait;
use common::protocol::{FindFilter, FindOptions, FindPage, WireRecord};
use common::StoreError;

/// Backing storage for wire records, partitioned by country.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn write(&self, country: &str, record: WireRecord) -> Result<(), StoreError>;

    async fn batch_write(&self, country: &str, records: Vec<WireRecord>) -> Result<(), StoreError>;

    /// Fetch a record by hashed key; `Ok(None)` when it does not exist.
    async fn read(&self, country: &str, key: &str) -> Result<Option<WireRecord>, StoreError>;

    /// Return one page of records matching a (hashed) filter.
    async fn find(
        &self,
        country: &str,
        filter: &FindFilter,
        options: FindOptions,
    ) -> Result<FindPage, StoreError>;

    async fn delete(&self, country: &str, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    async fn write(&self, country: &str, record: WireRecord) -> Result<(), StoreError> {
        (**self).write(country, record).await
    }

    async fn batch_write(&self, country: &str, records: Vec<WireRecord>) -> Result<(), StoreError> {
        (**self).batch_write(country, records).await
    }

    async fn read(&self, country: &str, key: &str) -> Result<Option<WireRecord>, StoreError> {
        (**self).read(country, key).await
    }

    async fn find(
        &self,
        country: &str,
        filter: &FindFilter,
        options: FindOptions,
    ) -> Result<FindPage, StoreError> {
        (**self).find(country, filter, options).await
    }

    async fn delete(&self, country: &str, key: &str) -> Result<(), StoreError> {
        (**self).delete(country, key).await
    }
}
