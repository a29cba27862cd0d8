// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query service: cache-first reads, cache-coherent writes.
//!
//! # Reads
//!
//! Build the key, return on hit without touching the store, otherwise read
//! the store and populate the key with its family TTL.
//!
//! # Writes
//!
//! The store commits first; cache keys are invalidated afterwards. Per-id
//! keys are deleted precisely, list pages always by pattern (any insert or
//! delete shifts page boundaries), region keys point-wise for every region
//! the write touched.
//!
//! # Example
//!
//! ```rust,no_run
//! use country_sync::{CountryFields, CountryService, CountrySyncConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CountrySyncConfig::default();
//! let service = CountryService::connect(&config).await?;
//!
//! let synced = service.sync().await?;
//! let first = service.list(None, Some(50)).await?;
//! if let Some(cursor) = first.next_cursor {
//!     let _second = service.list(Some(&cursor.to_string()), Some(50)).await?;
//! }
//! let created = service.create(CountryFields::named("Atlantis").with_region("Ocean")).await?;
//! service.delete(created.id).await?;
//! # let _ = synced;
//! # Ok(())
//! # }
//! ```

mod reads;
pub mod types;
mod writes;

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::memory::InMemoryCache;
use crate::cache::redis::RedisCache;
use crate::cache::{CacheStore, CountryCache};
use crate::config::CountrySyncConfig;
use crate::error::CountryError;
use crate::source::rest::RestCountriesSource;
use crate::storage::memory::InMemoryCountryStore;
use crate::storage::sql::SqlCountryStore;
use crate::storage::traits::CountryStore;
use crate::sync::SyncEngine;

pub use types::Page;

pub struct CountryService {
    store: Arc<dyn CountryStore>,
    cache: CountryCache,
    engine: SyncEngine,
    default_page_size: usize,
    max_page_size: usize,
}

impl CountryService {
    pub fn new(
        store: Arc<dyn CountryStore>,
        cache: CountryCache,
        engine: SyncEngine,
        config: &CountrySyncConfig,
    ) -> Self {
        Self {
            store,
            cache,
            engine,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    /// Wire the store, cache and REST source from configuration.
    ///
    /// Without `sql_url` rows live in memory; without `redis_url` the cache
    /// is in-process.
    pub async fn connect(config: &CountrySyncConfig) -> Result<Self, CountryError> {
        let store: Arc<dyn CountryStore> = match &config.sql_url {
            Some(url) => Arc::new(SqlCountryStore::new(url, config.sql_max_connections).await?),
            None => {
                warn!("No sql_url configured, using in-memory store");
                Arc::new(InMemoryCountryStore::new())
            }
        };

        let cache_store: Arc<dyn CacheStore> = match &config.redis_url {
            Some(url) => match RedisCache::new(url, config.redis_key_prefix.as_deref()).await {
                Ok(redis) => Arc::new(redis),
                Err(e) => {
                    warn!(error = %e, "Redis unreachable, falling back to in-process cache");
                    Arc::new(InMemoryCache::new())
                }
            },
            None => Arc::new(InMemoryCache::new()),
        };
        let cache = CountryCache::new(cache_store, config.cache_ttls());

        let source = RestCountriesSource::new(config.source_url.clone(), config.fetch_timeout())?;
        let engine = SyncEngine::new(Arc::clone(&store), cache.clone(), Arc::new(source), config);

        info!(
            sql = config.sql_url.is_some(),
            redis = config.redis_url.is_some(),
            "Country service connected"
        );
        Ok(Self::new(store, cache, engine, config))
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Replace the stored dataset from the external source.
    pub async fn sync(&self) -> Result<usize, CountryError> {
        self.engine.sync().await
    }
}
