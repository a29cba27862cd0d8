//! Shared fixtures for integration tests.
//!
//! - [`SpyCache`] records every cache call on top of an in-process cache,
//!   and can be made slow on pattern deletes or taken down entirely
//! - [`InstrumentedStore`] counts store reads and can be told to fail writes

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use country_sync::{
    CacheError, CacheStore, Country, CountryCache, CountryFields, CountryId, CountryService,
    CountryStore, CountrySyncConfig, InMemoryCache, InMemoryCountryStore, RawCountry,
    StaticSource, StorageError, SyncEngine,
};

// =============================================================================
// Cache spy
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheCall {
    Set(String),
    Get(String),
    Delete(String),
    DeleteByPattern(String),
}

impl CacheCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, CacheCall::Get(_))
    }
}

#[derive(Default)]
pub struct SpyCache {
    inner: InMemoryCache,
    calls: Mutex<Vec<CacheCall>>,
    pattern_delay: Mutex<Duration>,
    down: AtomicBool,
}

impl SpyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<CacheCall> {
        self.calls.lock().clone()
    }

    pub fn mutations(&self) -> Vec<CacheCall> {
        self.calls().into_iter().filter(CacheCall::is_mutation).collect()
    }

    pub fn deleted_keys(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                CacheCall::Delete(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_patterns(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                CacheCall::DeleteByPattern(pattern) => Some(pattern),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }

    /// Every `delete_by_pattern` sleeps this long before touching the cache.
    pub fn delay_pattern_deletes(&self, delay: Duration) {
        *self.pattern_delay.lock() = delay;
    }

    /// While down, every call is recorded and then fails.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn record(&self, call: CacheCall) -> Result<(), CacheError> {
        self.calls.lock().push(call);
        if self.down.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for SpyCache {
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), CacheError> {
        self.record(CacheCall::Set(key.to_string()))?;
        self.inner.set(key, value, ttl_secs).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.record(CacheCall::Get(key.to_string()))?;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.record(CacheCall::Delete(key.to_string()))?;
        self.inner.delete(key).await
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        self.record(CacheCall::DeleteByPattern(pattern.to_string()))?;
        let delay = *self.pattern_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner.delete_by_pattern(pattern).await
    }
}

// =============================================================================
// Store wrapper
// =============================================================================

#[derive(Default)]
pub struct InstrumentedStore {
    pub inner: InMemoryCountryStore,
    reads: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InstrumentedStore {
    pub fn new(inner: InMemoryCountryStore) -> Self {
        Self { inner, ..Default::default() }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StorageError::Backend("simulated write failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CountryStore for InstrumentedStore {
    async fn save(&self, fields: CountryFields, now: DateTime<Utc>) -> Result<Country, StorageError> {
        self.check_write()?;
        self.inner.save(fields, now).await
    }

    async fn update(&self, country: &Country) -> Result<(), StorageError> {
        self.check_write()?;
        self.inner.update(country).await
    }

    async fn find_by_id(&self, id: CountryId) -> Result<Option<Country>, StorageError> {
        self.read();
        self.inner.find_by_id(id).await
    }

    async fn find_by_region(&self, region: &str) -> Result<Vec<Country>, StorageError> {
        self.read();
        self.inner.find_by_region(region).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Country>, StorageError> {
        self.read();
        self.inner.find_by_name(name).await
    }

    async fn find_page_after(
        &self,
        cursor: Option<CountryId>,
        limit: usize,
    ) -> Result<Vec<Country>, StorageError> {
        self.read();
        self.inner.find_page_after(cursor, limit).await
    }

    async fn delete_by_id(&self, id: CountryId) -> Result<bool, StorageError> {
        self.check_write()?;
        self.inner.delete_by_id(id).await
    }

    async fn delete_all(&self) -> Result<u64, StorageError> {
        self.check_write()?;
        self.inner.delete_all().await
    }

    async fn save_batch(&self, countries: &[Country]) -> Result<usize, StorageError> {
        self.check_write()?;
        self.inner.save_batch(countries).await
    }

    async fn exists_after(&self, cursor: CountryId) -> Result<bool, StorageError> {
        self.read();
        self.inner.exists_after(cursor).await
    }

    async fn replace_all(
        &self,
        batch: Vec<CountryFields>,
        now: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        self.check_write()?;
        self.inner.replace_all(batch, now).await
    }

    async fn count(&self) -> Result<u64, StorageError> {
        self.read();
        self.inner.count().await
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub struct Harness {
    pub store: Arc<InstrumentedStore>,
    pub cache: Arc<SpyCache>,
    pub service: CountryService,
}

pub fn harness(rows: Vec<Country>, source: StaticSource) -> Harness {
    harness_with_config(rows, source, CountrySyncConfig::default())
}

pub fn harness_with_config(
    rows: Vec<Country>,
    source: StaticSource,
    config: CountrySyncConfig,
) -> Harness {
    let store = Arc::new(InstrumentedStore::new(InMemoryCountryStore::with_rows(rows)));
    let cache = Arc::new(SpyCache::new());
    let country_cache = CountryCache::new(cache.clone(), config.cache_ttls());
    let engine = SyncEngine::new(store.clone(), country_cache.clone(), Arc::new(source), &config);
    let service = CountryService::new(store.clone(), country_cache, engine, &config);
    Harness { store, cache, service }
}

pub fn fields(name: &str, region: &str) -> CountryFields {
    CountryFields::named(name).with_region(region).with_population(5_000_000)
}

/// `n` persisted countries with strictly increasing ids.
pub fn countries(n: usize) -> Vec<Country> {
    let now = country_sync::country::now_millis();
    (0..n)
        .map(|i| Country::new_at(fields(&format!("Country {i:03}"), "Region"), now))
        .collect()
}

pub fn raw(name: &str, population: Option<i64>, region: &str) -> RawCountry {
    RawCountry::named(name).with_population(population).with_region(region)
}
