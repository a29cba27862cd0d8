// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache key families and key construction.
//!
//! | Family                      | Key                                   | Invalidated by          |
//! |-----------------------------|---------------------------------------|-------------------------|
//! | [`KeyFamily::Country`]      | `country:<id>`                        | update, delete, sync    |
//! | [`KeyFamily::CountryList`]  | `countries:list:<cursor\|null>:<size>` | every write, sync       |
//! | [`KeyFamily::CountryRegion`]| `countries:region:<region>`           | writes in region, sync  |

use crate::config::CacheTtls;
use crate::country::CountryId;

/// Join key segments with `:`.
#[must_use]
pub fn build_key(segments: &[&str]) -> String {
    segments.join(":")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    Country,
    CountryList,
    CountryRegion,
}

impl KeyFamily {
    pub const ALL: [KeyFamily; 3] = [Self::Country, Self::CountryList, Self::CountryRegion];

    /// Namespace segment(s) of the family.
    #[must_use]
    pub fn namespace(self) -> &'static str {
        match self {
            Self::Country => "country",
            Self::CountryList => "countries:list",
            Self::CountryRegion => "countries:region",
        }
    }

    /// Glob matching every key of the family.
    #[must_use]
    pub fn pattern(self) -> String {
        build_key(&[self.namespace(), "*"])
    }

    #[must_use]
    pub fn ttl_secs(self, ttls: &CacheTtls) -> u64 {
        match self {
            Self::Country => ttls.country_secs,
            Self::CountryList => ttls.list_secs,
            Self::CountryRegion => ttls.region_secs,
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Country => "country",
            Self::CountryList => "list",
            Self::CountryRegion => "region",
        }
    }
}

#[must_use]
pub fn country_key(id: CountryId) -> String {
    build_key(&[KeyFamily::Country.namespace(), &id.to_string()])
}

/// `cursor` is the effective cursor; `None` renders as `null`.
#[must_use]
pub fn list_key(cursor: Option<CountryId>, page_size: usize) -> String {
    let cursor = cursor.map_or_else(|| "null".to_string(), |c| c.to_string());
    build_key(&[KeyFamily::CountryList.namespace(), &cursor, &page_size.to_string()])
}

#[must_use]
pub fn region_key(region: &str) -> String {
    build_key(&[KeyFamily::CountryRegion.namespace(), region])
}
