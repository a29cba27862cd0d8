// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache-coherent write operations.
//!
//! | Operation | `country:<id>` | `countries:list:*` | `countries:region:<r>`  |
//! |-----------|----------------|--------------------|-------------------------|
//! | create    | if name existed| pattern            | new (+ previous)        |
//! | update    | point          | pattern            | old (+ new if changed)  |
//! | delete    | point          | pattern            | old                     |
//!
//! Invalidation starts once the store write has committed and runs to
//! completion even if the caller is dropped.

use tracing::debug;

use super::CountryService;
use crate::cache::keys::country_key;
use crate::cache::{Invalidation, KeyFamily};
use crate::country::{now_millis, Country, CountryFields, CountryId};
use crate::error::CountryError;
use crate::metrics;

impl CountryService {
    /// Persist a new country.
    ///
    /// Saving is keyed by name: a country with the same name is overwritten
    /// in place and keeps its id.
    #[tracing::instrument(skip(self, fields), fields(name = %fields.name))]
    pub async fn create(&self, fields: CountryFields) -> Result<Country, CountryError> {
        fields.validate()?;

        let previous = self.store.find_by_name(&fields.name).await?;
        let saved = self.store.save(fields, now_millis()).await?;

        let mut plan = Invalidation::new()
            .family(KeyFamily::CountryList)
            .region(saved.region());
        if let Some(previous) = previous {
            debug!(id = %previous.id, "Create overwrote an existing country");
            plan = plan.key(country_key(previous.id));
            if previous.region() != saved.region() {
                plan = plan.region(previous.region());
            }
        }
        self.cache.invalidate_committed(plan).await;

        metrics::record_service_call("create", "success");
        Ok(saved)
    }

    /// Overwrite the mutable fields of an existing country.
    #[tracing::instrument(skip(self, fields), fields(id = %id))]
    pub async fn update(&self, id: CountryId, fields: CountryFields) -> Result<Country, CountryError> {
        fields.validate()?;

        let mut country = match self.store.find_by_id(id).await? {
            Some(country) => country,
            None => {
                metrics::record_service_call("update", "not_found");
                return Err(CountryError::NotFound(id.to_string()));
            }
        };
        let old_region = country.fields.region.clone();

        country.overwrite(fields, now_millis());
        self.store.update(&country).await?;

        let mut plan = Invalidation::new()
            .key(country_key(id))
            .family(KeyFamily::CountryList)
            .region(old_region.as_deref());
        if country.region() != old_region.as_deref() {
            plan = plan.region(country.region());
        }
        self.cache.invalidate_committed(plan).await;

        metrics::record_service_call("update", "success");
        Ok(country)
    }

    /// Remove a country. A missing id is `NotFound` and leaves the cache alone.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub async fn delete(&self, id: CountryId) -> Result<(), CountryError> {
        let country = match self.store.find_by_id(id).await? {
            Some(country) => country,
            None => {
                metrics::record_service_call("delete", "not_found");
                return Err(CountryError::NotFound(id.to_string()));
            }
        };

        if !self.store.delete_by_id(id).await? {
            // Removed concurrently between the lookup and the delete
            metrics::record_service_call("delete", "not_found");
            return Err(CountryError::NotFound(id.to_string()));
        }

        let plan = Invalidation::new()
            .key(country_key(id))
            .family(KeyFamily::CountryList)
            .region(country.region());
        self.cache.invalidate_committed(plan).await;

        metrics::record_service_call("delete", "success");
        Ok(())
    }
}
