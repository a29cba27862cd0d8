// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis cache backend.
//!
//! Plain STRING values with `SET .. EX` for TTLs. Pattern invalidation walks
//! the keyspace with `SCAN MATCH` (never `KEYS`) and deletes each page.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, Client};
use tracing::debug;

use super::{CacheError, CacheStore};
use crate::resilience::retry::{retry, RetryConfig};

const SCAN_COUNT: usize = 500;

pub struct RedisCache {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "myapp:" → "myapp:country:<id>")
    prefix: String,
}

impl RedisCache {
    /// Connect to Redis. Keys are stored as `<prefix><key>`.
    ///
    /// ```rust,no_run
    /// # use country_sync::RedisCache;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let cache = RedisCache::new("redis://localhost", Some("countries-svc:")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(connection_string: &str, prefix: Option<&str>) -> Result<Self, CacheError> {
        let client = Client::open(connection_string)
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| CacheError::Unavailable(e.to_string()))?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
        })
    }

    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }
}

fn unavailable(e: redis::RedisError) -> CacheError {
    CacheError::Unavailable(e.to_string())
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let mut command = cmd("SET");
        command.arg(self.prefixed_key(key)).arg(value);
        if ttl_secs > 0 {
            command.arg("EX").arg(ttl_secs);
        }
        let _: () = command.query_async(&mut conn).await.map_err(unavailable)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = cmd("GET")
            .arg(self.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection.clone();
        let removed: u64 = cmd("DEL")
            .arg(self.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(removed > 0)
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self.connection.clone();
        let pattern = self.prefixed_key(pattern);
        let mut cursor: u64 = 0;
        let mut removed = 0u64;

        loop {
            let (next, keys): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;

            if !keys.is_empty() {
                let deleted: u64 = cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(unavailable)?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern = %pattern, removed, "Deleted keys by pattern");
        Ok(removed)
    }
}
