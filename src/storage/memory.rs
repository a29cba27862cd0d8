//! In-memory country store.
//!
//! Rows live in a `BTreeMap` keyed by id so range scans come out in cursor
//! order. Writes that touch more than one row work on a staged copy and swap
//! it in only on success, which gives them the same all-or-nothing behavior
//! as a SQL transaction.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::traits::{carry_over_identity, CountryStore, StorageError};
use crate::country::{Country, CountryFields, CountryId};
use crate::metrics::LatencyTimer;

const NO_FAULT: usize = usize::MAX;

pub struct InMemoryCountryStore {
    rows: RwLock<BTreeMap<CountryId, Country>>,
    /// Fail a batch write after this many rows were staged
    fail_batch_after: AtomicUsize,
}

impl InMemoryCountryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            fail_batch_after: AtomicUsize::new(NO_FAULT),
        }
    }

    /// Seed the store with fully-formed rows (ids and timestamps as given).
    #[must_use]
    pub fn with_rows(rows: impl IntoIterator<Item = Country>) -> Self {
        let store = Self::new();
        {
            let mut map = store.rows.write();
            for row in rows {
                map.insert(row.id, row);
            }
        }
        store
    }

    /// Make the next batch writes fail once `rows` rows have been staged.
    ///
    /// `None` clears the fault.
    pub fn fail_batch_after(&self, rows: Option<usize>) {
        self.fail_batch_after.store(rows.unwrap_or(NO_FAULT), Ordering::SeqCst);
    }

    /// Snapshot of every row in id order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Country> {
        self.rows.read().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn name_taken(rows: &BTreeMap<CountryId, Country>, name: &str, except: Option<CountryId>) -> bool {
        rows.values().any(|c| c.fields.name == name && Some(c.id) != except)
    }

    /// Insert into a staged map, enforcing unique ids and names.
    fn stage_inserts(
        &self,
        staged: &mut BTreeMap<CountryId, Country>,
        countries: &[Country],
    ) -> Result<(), StorageError> {
        let fail_after = self.fail_batch_after.load(Ordering::SeqCst);
        for (staged_count, country) in countries.iter().enumerate() {
            if staged_count >= fail_after {
                return Err(StorageError::Backend(format!(
                    "injected failure after {} rows",
                    staged_count
                )));
            }
            if staged.contains_key(&country.id) {
                return Err(StorageError::Constraint(format!("duplicate id {}", country.id)));
            }
            if Self::name_taken(staged, &country.fields.name, None) {
                return Err(StorageError::Constraint(format!(
                    "duplicate country name '{}'",
                    country.fields.name
                )));
            }
            staged.insert(country.id, country.clone());
        }
        Ok(())
    }
}

impl Default for InMemoryCountryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CountryStore for InMemoryCountryStore {
    async fn save(&self, fields: CountryFields, now: DateTime<Utc>) -> Result<Country, StorageError> {
        let mut rows = self.rows.write();
        let existing = rows.values().find(|c| c.fields.name == fields.name).map(|c| c.id);

        let saved = match existing {
            Some(id) => {
                let row = rows
                    .get_mut(&id)
                    .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
                row.overwrite(fields, now);
                row.clone()
            }
            None => {
                let country = Country::new_at(fields, now);
                rows.insert(country.id, country.clone());
                country
            }
        };
        Ok(saved)
    }

    async fn update(&self, country: &Country) -> Result<(), StorageError> {
        let mut rows = self.rows.write();
        if !rows.contains_key(&country.id) {
            return Err(StorageError::NotFound(country.id.to_string()));
        }
        if Self::name_taken(&rows, &country.fields.name, Some(country.id)) {
            return Err(StorageError::Constraint(format!(
                "duplicate country name '{}'",
                country.fields.name
            )));
        }
        rows.insert(country.id, country.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: CountryId) -> Result<Option<Country>, StorageError> {
        Ok(self.rows.read().get(&id).cloned())
    }

    async fn find_by_region(&self, region: &str) -> Result<Vec<Country>, StorageError> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|c| c.region() == Some(region))
            .cloned()
            .collect())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Country>, StorageError> {
        Ok(self.rows.read().values().find(|c| c.fields.name == name).cloned())
    }

    async fn find_page_after(
        &self,
        cursor: Option<CountryId>,
        limit: usize,
    ) -> Result<Vec<Country>, StorageError> {
        let lower = match cursor {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        Ok(self
            .rows
            .read()
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn delete_by_id(&self, id: CountryId) -> Result<bool, StorageError> {
        Ok(self.rows.write().remove(&id).is_some())
    }

    async fn delete_all(&self) -> Result<u64, StorageError> {
        let mut rows = self.rows.write();
        let removed = rows.len() as u64;
        rows.clear();
        Ok(removed)
    }

    async fn save_batch(&self, countries: &[Country]) -> Result<usize, StorageError> {
        let mut rows = self.rows.write();
        let mut staged = rows.clone();
        self.stage_inserts(&mut staged, countries)?;
        *rows = staged;
        Ok(countries.len())
    }

    async fn exists_after(&self, cursor: CountryId) -> Result<bool, StorageError> {
        Ok(self
            .rows
            .read()
            .range((Bound::Excluded(cursor), Bound::Unbounded))
            .next()
            .is_some())
    }

    async fn replace_all(
        &self,
        batch: Vec<CountryFields>,
        now: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let _timer = LatencyTimer::new("memory", "replace_all");
        let mut rows = self.rows.write();
        let existing = rows
            .values()
            .map(|c| (c.fields.name.clone(), c.id, c.created_at));
        let replacement = carry_over_identity(existing, batch, now);

        let mut staged = BTreeMap::new();
        self.stage_inserts(&mut staged, &replacement)?;
        *rows = staged;
        Ok(replacement.len())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        Ok(self.rows.read().len() as u64)
    }
}
