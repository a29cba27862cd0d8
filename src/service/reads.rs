// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache-first read operations.

use tracing::debug;

use super::types::{effective_page_size, page_from_lookahead, parse_cursor, Page};
use super::CountryService;
use crate::cache::keys::{country_key, list_key, region_key};
use crate::cache::KeyFamily;
use crate::country::{Country, CountryId};
use crate::error::CountryError;
use crate::metrics;

impl CountryService {
    /// Fetch one country by id.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub async fn get_by_id(&self, id: CountryId) -> Result<Country, CountryError> {
        let key = country_key(id);
        if let Some(country) = self.cache.get::<Country>(KeyFamily::Country, &key).await {
            return Ok(country);
        }

        let country = match self.store.find_by_id(id).await? {
            Some(country) => country,
            None => {
                metrics::record_service_call("get_by_id", "not_found");
                return Err(CountryError::NotFound(id.to_string()));
            }
        };
        self.cache.put(KeyFamily::Country, &key, &country).await;
        Ok(country)
    }

    /// One page of countries in id order.
    ///
    /// `limit` falls back to the configured default when absent or
    /// non-positive and is clamped to the configured maximum. A cursor that
    /// does not parse, or that has nothing after it, yields the first page.
    #[tracing::instrument(skip(self))]
    pub async fn list(
        &self,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Page<Country>, CountryError> {
        let size = effective_page_size(limit, self.default_page_size, self.max_page_size);
        let parsed = parse_cursor(cursor);
        if cursor.is_some() && parsed.is_none() {
            debug!("Unparseable cursor, serving first page");
        }

        if let Some(after) = parsed {
            let key = list_key(Some(after), size);
            if let Some(page) = self.cache.get::<Page<Country>>(KeyFamily::CountryList, &key).await {
                return Ok(page);
            }
            if self.store.exists_after(after).await? {
                return self.load_page(&key, Some(after), size).await;
            }
            debug!(cursor = %after, "Cursor past the last row, serving first page");
        }

        let key = list_key(None, size);
        if let Some(page) = self.cache.get::<Page<Country>>(KeyFamily::CountryList, &key).await {
            return Ok(page);
        }
        self.load_page(&key, None, size).await
    }

    async fn load_page(
        &self,
        key: &str,
        after: Option<CountryId>,
        size: usize,
    ) -> Result<Page<Country>, CountryError> {
        let rows = self.store.find_page_after(after, size + 1).await?;
        let page = page_from_lookahead(rows, size, |c| c.id);
        self.cache.put(KeyFamily::CountryList, key, &page).await;
        Ok(page)
    }

    /// Every country whose region equals `region` exactly.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_region(&self, region: &str) -> Result<Vec<Country>, CountryError> {
        let key = region_key(region);
        if let Some(countries) = self.cache.get::<Vec<Country>>(KeyFamily::CountryRegion, &key).await {
            return Ok(countries);
        }

        let countries = self.store.find_by_region(region).await?;
        self.cache.put(KeyFamily::CountryRegion, &key, &countries).await;
        Ok(countries)
    }
}
