// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! External country data sources.
//!
//! A source yields a lazy stream of [`RawCountry`] records in the upstream
//! wire format. The stream may fail part way through; the sync engine decides
//! what a mid-stream failure means.

pub mod memory;
pub mod rest;

use std::collections::BTreeMap;

use futures::stream::BoxStream;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::country::CountryFields;

pub use memory::StaticSource;
pub use rest::RestCountriesSource;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Upstream returned HTTP {0}")]
    Status(u16),
    #[error("Malformed record: {0}")]
    Decode(String),
}

pub type RawCountryStream = BoxStream<'static, Result<RawCountry, SourceError>>;

/// Producer of the full external dataset.
pub trait CountrySource: Send + Sync {
    /// Start a fresh pass over the upstream dataset.
    fn fetch_all(&self) -> RawCountryStream;
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawName {
    #[serde(default)]
    pub common: String,
    #[serde(default)]
    pub official: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawCurrency {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

/// One upstream record. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawCountry {
    #[serde(default)]
    pub name: RawName,
    #[serde(default)]
    pub capital: Vec<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub subregion: Option<String>,
    #[serde(default)]
    pub population: Option<i64>,
    #[serde(default)]
    pub area: Option<f64>,
    /// Keyed by ISO 4217 code.
    #[serde(default)]
    pub currencies: BTreeMap<String, RawCurrency>,
}

impl RawCountry {
    pub fn named(common: impl Into<String>) -> Self {
        Self {
            name: RawName { common: common.into(), official: None },
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_population(mut self, population: Option<i64>) -> Self {
        self.population = population;
        self
    }

    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Map to the persisted shape. Only the first capital and the first
    /// currency (by code) are kept.
    pub fn into_fields(self) -> CountryFields {
        let currency = self.currencies.into_iter().next();
        CountryFields {
            name: self.name.common,
            official_name: self.name.official,
            capital: self.capital.into_iter().next(),
            region: self.region.filter(|r| !r.is_empty()),
            subregion: self.subregion.filter(|s| !s.is_empty()),
            population: self.population,
            area: self.area.and_then(|a| Decimal::try_from(a).ok()),
            currency_code: currency.as_ref().map(|(code, _)| code.clone()),
            currency_name: currency.and_then(|(_, c)| c.name),
        }
    }
}
