// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache layer.
//!
//! ```text
//! CountryService / SyncEngine
//!          │  typed values, key families
//!          ▼
//! ┌──────────────────────────────┐
//! │ CountryCache                 │  envelope {type, payload}, TTL per family,
//! │                              │  errors logged and swallowed
//! └──────────────────────────────┘
//!          │  raw bytes
//!          ▼
//! ┌──────────────────────────────┐
//! │ CacheStore (Redis / memory)  │  SET EX, GET, DEL, SCAN MATCH + DEL
//! └──────────────────────────────┘
//! ```
//!
//! The cache is an optimization: a backend outage makes every read a miss
//! and every write or invalidation a no-op.

pub mod glob;
pub mod keys;
pub mod layer;
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use thiserror::Error;

pub use keys::{build_key, KeyFamily};
pub use layer::{Cacheable, CountryCache, Invalidation};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
    #[error("Cache payload error: {0}")]
    Serialization(String),
    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),
}

/// Raw key/value cache with per-entry TTL and glob-pattern bulk delete.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Store `value` under `key`. A TTL of 0 stores without expiry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Delete every key matching a Redis-style glob. Returns the count removed.
    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, CacheError>;
}
