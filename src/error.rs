// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Errors surfaced by the public sync and query operations.
//!
//! Backend errors ([`StorageError`], [`SourceError`]) convert into
//! [`CountryError`] at the service boundary. Cache errors never reach this
//! type: the cache layer recovers them locally.

use thiserror::Error;

use crate::source::SourceError;
use crate::storage::traits::StorageError;

#[derive(Error, Debug)]
pub enum CountryError {
    /// The external source failed or timed out before yielding any record.
    #[error("External source unavailable: {0}")]
    SourceUnavailable(String),

    /// A store write failed and its transaction was rolled back.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// The requested country does not exist.
    #[error("Country not found: {0}")]
    NotFound(String),

    /// Input rejected before reaching the store.
    #[error("Invalid country: {0}")]
    Invalid(String),
}

impl CountryError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<StorageError> for CountryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => Self::NotFound(id),
            other => Self::PersistenceFailure(other.to_string()),
        }
    }
}

impl From<SourceError> for CountryError {
    fn from(err: SourceError) -> Self {
        Self::SourceUnavailable(err.to_string())
    }
}
