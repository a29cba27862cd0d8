use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::country::{Country, CountryFields, CountryId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Country {0} not found")]
    NotFound(String),
    #[error("Constraint violation: {0}")]
    Constraint(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Transactional record store for countries.
///
/// Each method runs in its own transaction. [`CountryStore::replace_all`] is
/// the one composite write: delete-all and bulk insert share a transaction, so
/// a failure anywhere leaves the previous dataset untouched.
#[async_trait]
pub trait CountryStore: Send + Sync {
    /// Legacy single-record save keyed by name.
    ///
    /// If a row with `fields.name` exists, its mutable fields and `updated_at`
    /// are overwritten and its id/`created_at` kept. Otherwise a new row with a
    /// fresh id and `created_at == updated_at == now` is inserted.
    async fn save(&self, fields: CountryFields, now: DateTime<Utc>) -> Result<Country, StorageError>;

    /// Overwrite an existing row by id. Fails with `NotFound` if absent.
    async fn update(&self, country: &Country) -> Result<(), StorageError>;

    async fn find_by_id(&self, id: CountryId) -> Result<Option<Country>, StorageError>;

    /// Exact-match region lookup, ordered by id.
    async fn find_by_region(&self, region: &str) -> Result<Vec<Country>, StorageError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Country>, StorageError>;

    /// Up to `limit` rows ordered by id, strictly after `cursor` when given.
    async fn find_page_after(
        &self,
        cursor: Option<CountryId>,
        limit: usize,
    ) -> Result<Vec<Country>, StorageError>;

    /// Returns whether a row was removed.
    async fn delete_by_id(&self, id: CountryId) -> Result<bool, StorageError>;

    /// Returns the number of rows removed.
    async fn delete_all(&self) -> Result<u64, StorageError>;

    /// Insert fully-formed records. All or nothing.
    async fn save_batch(&self, countries: &[Country]) -> Result<usize, StorageError>;

    async fn exists_after(&self, cursor: CountryId) -> Result<bool, StorageError>;

    /// Replace the whole dataset in one transaction.
    ///
    /// Names already present keep their id and `created_at`; every other
    /// record gets a fresh id. Rows whose name is not in `batch` are removed.
    async fn replace_all(
        &self,
        batch: Vec<CountryFields>,
        now: DateTime<Utc>,
    ) -> Result<usize, StorageError>;

    async fn count(&self) -> Result<u64, StorageError>;
}

/// Build the rows `replace_all` inserts, carrying identity over by name.
///
/// `existing` yields `(name, id, created_at)` of the rows being replaced.
pub(crate) fn carry_over_identity<I>(
    existing: I,
    batch: Vec<CountryFields>,
    now: DateTime<Utc>,
) -> Vec<Country>
where
    I: IntoIterator<Item = (String, CountryId, DateTime<Utc>)>,
{
    let known: std::collections::HashMap<String, (CountryId, DateTime<Utc>)> = existing
        .into_iter()
        .map(|(name, id, created_at)| (name, (id, created_at)))
        .collect();

    batch
        .into_iter()
        .map(|fields| match known.get(&fields.name) {
            Some(&(id, created_at)) => Country {
                id,
                fields,
                created_at,
                updated_at: now.max(created_at),
            },
            None => Country::new_at(fields, now),
        })
        .collect()
}
