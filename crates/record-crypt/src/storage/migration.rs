//! Re-encryption of records written under a stale secret version.
//!
//! Each call migrates one page:
//!
//! 1. Resolve secrets once and read the current version.
//! 2. Find up to `limit` records whose `version` is not current.
//! 3. Decrypt each body and seal it again under the current secret, keeping
//!    the stored hashed fields, then batch-write the page back.
//!
//! Callers loop until `total_left` reaches zero. Nothing is kept between
//! calls; progress is recomputed from the store every time.

use std::sync::Arc;

use common::protocol::{FilterValue, FindFilter, FindOptions, MigrationProgress};
use tracing::info;

use super::{normalize_country, validate_limit, RecordStore, Storage};
use crate::error::Error;

impl<S: RecordStore> Storage<S> {
    /// Migrate one page of at most `limit` records to the current secret.
    ///
    /// `filter` narrows the candidate records; the stale-version condition is
    /// always added on top of it.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when no secret source is configured.
    /// - The first decode error when the page holds records but none of them
    ///   could be decoded.
    /// - Store and encode errors from the write-back.
    pub async fn migrate(
        &self,
        country: &str,
        limit: u32,
        filter: Option<FindFilter>,
    ) -> Result<MigrationProgress, Error> {
        let country = normalize_country(country)?;
        validate_limit(limit)?;

        let secrets = self
            .codec
            .engine()
            .snapshot()
            .await?
            .ok_or_else(|| Error::Config("migration requires a secret source".into()))?;
        let current_version = secrets.current_version();
        let secrets = Arc::new(Some(secrets));

        let filter = filter
            .unwrap_or_default()
            .with("version", FilterValue::not(i64::from(current_version).into()));
        let options = FindOptions { limit, offset: 0 };
        let page = self
            .store
            .find(&country, &self.codec.hash_filter(&filter), options)
            .await?;
        let total = page.meta.total;

        let (resealed, errors) = self.codec.reseal_many_with(secrets, page.records).await?;
        if resealed.is_empty() {
            if let Some(failure) = errors.into_iter().next() {
                return Err(failure.error.into());
            }
            return Ok(MigrationProgress {
                migrated: 0,
                total_left: total,
            });
        }

        let migrated = resealed.len() as u64;
        self.store.batch_write(&country, resealed).await?;

        let progress = MigrationProgress {
            migrated,
            total_left: total.saturating_sub(migrated),
        };
        info!(
            country = %country,
            current_version,
            migrated = progress.migrated,
            total_left = progress.total_left,
            skipped = errors.len(),
            "migration step complete"
        );
        Ok(progress)
    }
}
