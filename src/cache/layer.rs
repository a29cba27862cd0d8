// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed cache access over a raw [`CacheStore`].
//!
//! Values are stored as a JSON envelope carrying an explicit type tag:
//!
//! ```json
//! {"type": "Country", "payload": {"id": "...", "name": "France", ...}}
//! ```
//!
//! A read whose tag does not match the requested type, or whose payload no
//! longer decodes, is treated as a miss. Backend failures never reach the
//! caller: reads degrade to misses, writes and invalidations to no-ops.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::keys::{region_key, KeyFamily};
use super::{CacheError, CacheStore};
use crate::config::CacheTtls;
use crate::country::Country;
use crate::metrics;
use crate::service::Page;

/// A value that can live in the cache under a stable type tag.
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync {
    const TYPE_TAG: &'static str;
}

impl Cacheable for Country {
    const TYPE_TAG: &'static str = "Country";
}

impl Cacheable for Page<Country> {
    const TYPE_TAG: &'static str = "CountryPage";
}

impl Cacheable for Vec<Country> {
    const TYPE_TAG: &'static str = "CountryList";
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    #[serde(rename = "type")]
    kind: &'a str,
    payload: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    payload: serde_json::Value,
}

pub(crate) fn encode<T: Cacheable>(value: &T) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec(&EnvelopeRef { kind: T::TYPE_TAG, payload: value })
        .map_err(|e| CacheError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: Cacheable>(bytes: &[u8]) -> Result<T, CacheError> {
    let envelope: Envelope =
        serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))?;
    if envelope.kind != T::TYPE_TAG {
        return Err(CacheError::Serialization(format!(
            "expected type '{}', found '{}'",
            T::TYPE_TAG,
            envelope.kind
        )));
    }
    serde_json::from_value(envelope.payload).map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Typed, failure-tolerant cache used by the service and the sync engine.
#[derive(Clone)]
pub struct CountryCache {
    store: Arc<dyn CacheStore>,
    ttls: CacheTtls,
}

impl CountryCache {
    pub fn new(store: Arc<dyn CacheStore>, ttls: CacheTtls) -> Self {
        Self { store, ttls }
    }

    /// Look up `key`. Any failure is reported as a miss.
    pub async fn get<T: Cacheable>(&self, family: KeyFamily, key: &str) -> Option<T> {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                metrics::record_cache_lookup(family.label(), false);
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                metrics::record_cache_error("get");
                metrics::record_cache_lookup(family.label(), false);
                return None;
            }
        };

        match decode::<T>(&bytes) {
            Ok(value) => {
                metrics::record_cache_lookup(family.label(), true);
                Some(value)
            }
            Err(e) => {
                debug!(key, error = %e, "Undecodable cache entry, treating as miss");
                metrics::record_cache_lookup(family.label(), false);
                None
            }
        }
    }

    /// Store `value` under `key` with the family's TTL.
    pub async fn put<T: Cacheable>(&self, family: KeyFamily, key: &str, value: &T) {
        let bytes = match encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache entry");
                metrics::record_cache_error("encode");
                return;
            }
        };
        if let Err(e) = self.store.set(key, bytes, family.ttl_secs(&self.ttls)).await {
            warn!(key, error = %e, "Cache write failed");
            metrics::record_cache_error("put");
        }
    }

    /// Remove a single key. Returns whether it existed.
    pub async fn invalidate(&self, key: &str) -> bool {
        match self.store.delete(key).await {
            Ok(existed) => existed,
            Err(e) => {
                warn!(key, error = %e, "Cache delete failed");
                metrics::record_cache_error("invalidate");
                false
            }
        }
    }

    /// Remove every key of `family`. Returns the count removed.
    pub async fn invalidate_family(&self, family: KeyFamily) -> u64 {
        match self.store.delete_by_pattern(&family.pattern()).await {
            Ok(removed) => {
                metrics::record_invalidation(family.label(), removed);
                removed
            }
            Err(e) => {
                warn!(family = family.label(), error = %e, "Cache pattern delete failed");
                metrics::record_cache_error("invalidate_family");
                0
            }
        }
    }

    /// Remove every key of every family.
    pub async fn invalidate_all(&self) -> u64 {
        self.apply(&Invalidation::all()).await
    }

    /// Run `plan` in order. Returns the count removed.
    pub async fn apply(&self, plan: &Invalidation) -> u64 {
        let mut removed = 0;
        for target in &plan.targets {
            removed += match target {
                Target::Key(key) => u64::from(self.invalidate(key).await),
                Target::Family(family) => self.invalidate_family(*family).await,
            };
        }
        removed
    }

    /// Run `plan` on its own task once the store has committed.
    ///
    /// Dropping the returned future does not cancel the invalidation, so a
    /// caller that gives up after the commit cannot leave stale entries behind.
    pub async fn invalidate_committed(&self, plan: Invalidation) -> u64 {
        let cache = self.clone();
        let task = tokio::spawn(async move { cache.apply(&plan).await });
        match task.await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Invalidation task failed");
                metrics::record_cache_error("invalidate_committed");
                0
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Key(String),
    Family(KeyFamily),
}

/// Ordered set of keys and families to drop after a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidation {
    targets: Vec<Target>,
}

impl Invalidation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every family: the whole dataset changed.
    #[must_use]
    pub fn all() -> Self {
        KeyFamily::ALL.into_iter().fold(Self::new(), Self::family)
    }

    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.targets.push(Target::Key(key.into()));
        self
    }

    #[must_use]
    pub fn family(mut self, family: KeyFamily) -> Self {
        self.targets.push(Target::Family(family));
        self
    }

    /// The region listing key, if the country has a region.
    #[must_use]
    pub fn region(self, region: Option<&str>) -> Self {
        match region {
            Some(region) => self.key(region_key(region)),
            None => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::{country_key, region_key};
    use crate::cache::memory::InMemoryCache;
    use crate::country::{now_millis, CountryFields};
    use async_trait::async_trait;

    struct DownCache;

    #[async_trait]
    impl CacheStore for DownCache {
        async fn set(&self, _: &str, _: Vec<u8>, _: u64) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn get(&self, _: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn delete(&self, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn delete_by_pattern(&self, _: &str) -> Result<u64, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    fn ttls() -> CacheTtls {
        CacheTtls { country_secs: 60, list_secs: 60, region_secs: 60 }
    }

    fn france() -> Country {
        Country::new_at(CountryFields::named("France").with_region("Europe"), now_millis())
    }

    #[test]
    fn test_envelope_carries_type_tag() {
        let bytes = encode(&france()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "Country");
        assert_eq!(value["payload"]["name"], "France");
    }

    #[tokio::test]
    async fn test_round_trip_through_store() {
        let store = Arc::new(InMemoryCache::new());
        let cache = CountryCache::new(store.clone(), ttls());
        let country = france();
        let key = country_key(country.id);

        cache.put(KeyFamily::Country, &key, &country).await;
        let cached: Option<Country> = cache.get(KeyFamily::Country, &key).await;
        assert_eq!(cached, Some(country));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss() {
        let store = Arc::new(InMemoryCache::new());
        let cache = CountryCache::new(store.clone(), ttls());
        let key = region_key("Europe");

        cache.put(KeyFamily::CountryRegion, &key, &vec![france()]).await;
        let wrong: Option<Country> = cache.get(KeyFamily::CountryRegion, &key).await;
        assert!(wrong.is_none());

        let right: Option<Vec<Country>> = cache.get(KeyFamily::CountryRegion, &key).await;
        assert_eq!(right.map(|v| v.len()), Some(1));
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_a_miss() {
        let store = Arc::new(InMemoryCache::new());
        store.set("country:x", b"not json".to_vec(), 0).await.unwrap();
        let cache = CountryCache::new(store, ttls());

        let cached: Option<Country> = cache.get(KeyFamily::Country, "country:x").await;
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_backend_outage_is_swallowed() {
        let cache = CountryCache::new(Arc::new(DownCache), ttls());

        let cached: Option<Country> = cache.get(KeyFamily::Country, "country:x").await;
        assert!(cached.is_none());
        cache.put(KeyFamily::Country, "country:x", &france()).await;
        assert!(!cache.invalidate("country:x").await);
        assert_eq!(cache.invalidate_all().await, 0);
    }

    #[tokio::test]
    async fn test_invalidate_all_clears_every_family() {
        let store = Arc::new(InMemoryCache::new());
        let cache = CountryCache::new(store.clone(), ttls());
        let country = france();

        cache.put(KeyFamily::Country, &country_key(country.id), &country).await;
        cache.put(KeyFamily::CountryRegion, &region_key("Europe"), &vec![country.clone()]).await;
        store.set("unrelated", b"keep".to_vec(), 0).await.unwrap();

        assert_eq!(cache.invalidate_all().await, 2);
        assert_eq!(store.keys(), vec!["unrelated"]);
    }

    #[test]
    fn test_plan_keeps_order_and_skips_missing_region() {
        let plan = Invalidation::new()
            .key("country:1")
            .family(KeyFamily::CountryList)
            .region(None)
            .region(Some("Asia"));
        let expected = Invalidation::new()
            .key("country:1")
            .family(KeyFamily::CountryList)
            .key("countries:region:Asia");
        assert_eq!(plan, expected);
    }

    #[tokio::test]
    async fn test_committed_plan_removes_targets() {
        let store = Arc::new(InMemoryCache::new());
        let cache = CountryCache::new(store.clone(), ttls());
        let country = france();

        cache.put(KeyFamily::Country, &country_key(country.id), &country).await;
        cache.put(KeyFamily::CountryRegion, &region_key("Europe"), &vec![country.clone()]).await;
        cache.put(KeyFamily::CountryRegion, &region_key("Asia"), &Vec::<Country>::new()).await;

        let plan = Invalidation::new().key(country_key(country.id)).region(country.region());
        assert_eq!(cache.invalidate_committed(plan).await, 2);
        assert_eq!(store.keys(), vec![region_key("Asia")]);
    }
}
