// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Country data model.
//!
//! A persisted [`Country`] is an identifier plus timestamps wrapped around
//! [`CountryFields`], the mutable part that create/update calls and the sync
//! transform produce.
//!
//! # Example
//!
//! ```
//! use country_sync::{Country, CountryFields};
//!
//! let fields = CountryFields::named("Japan").with_region("Asia").with_population(125_000_000);
//! assert!(fields.validate().is_ok());
//!
//! let country = Country::new_at(fields, country_sync::country::now_millis());
//! assert_eq!(country.created_at, country.updated_at);
//! assert_eq!(country.region(), Some("Asia"));
//! ```

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CountryError;

/// Store-assigned identifier. UUID v7, so ordering follows insertion time.
pub type CountryId = Uuid;

/// Mint a fresh, time-ordered identifier.
#[must_use]
pub fn new_country_id() -> CountryId {
    Uuid::now_v7()
}

/// Current time truncated to the precision the SQL store keeps.
#[must_use]
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Mutable attributes of a country.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryFields {
    pub name: String,
    #[serde(default)]
    pub official_name: Option<String>,
    #[serde(default)]
    pub capital: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub subregion: Option<String>,
    #[serde(default)]
    pub population: Option<i64>,
    #[serde(default)]
    pub area: Option<Decimal>,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub currency_name: Option<String>,
}

impl CountryFields {
    /// Fields with only a name set.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    #[must_use]
    pub fn with_population(mut self, population: i64) -> Self {
        self.population = Some(population);
        self
    }

    /// Reject input the store must never see.
    pub fn validate(&self) -> Result<(), CountryError> {
        if self.name.trim().is_empty() {
            return Err(CountryError::Invalid("name is required".into()));
        }
        if let Some(population) = self.population {
            if population < 0 {
                return Err(CountryError::Invalid(format!(
                    "population must be non-negative, got {}",
                    population
                )));
            }
        }
        Ok(())
    }
}

/// A persisted country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Country {
    pub id: CountryId,
    #[serde(flatten)]
    pub fields: CountryFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Country {
    /// A new record with a fresh identifier and `created_at == updated_at == now`.
    #[must_use]
    pub fn new_at(fields: CountryFields, now: DateTime<Utc>) -> Self {
        Self {
            id: new_country_id(),
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the mutable fields, keeping identity and `created_at`.
    pub fn overwrite(&mut self, fields: CountryFields, now: DateTime<Utc>) {
        self.fields = fields;
        self.updated_at = now.max(self.created_at);
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.fields.name
    }

    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.fields.region.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_validate_rejects_blank_name() {
        let err = CountryFields::named("   ").validate().unwrap_err();
        assert!(matches!(err, CountryError::Invalid(_)));
    }

    #[test]
    fn test_validate_rejects_negative_population() {
        let err = CountryFields::named("Nowhere").with_population(-1).validate().unwrap_err();
        assert!(err.to_string().contains("non-negative"));
    }

    #[test]
    fn test_overwrite_preserves_identity() {
        let created = now_millis();
        let mut country = Country::new_at(CountryFields::named("Chile"), created);
        let id = country.id;

        let later = created + Duration::seconds(5);
        country.overwrite(CountryFields::named("Chile").with_region("Americas"), later);

        assert_eq!(country.id, id);
        assert_eq!(country.created_at, created);
        assert_eq!(country.updated_at, later);
        assert_eq!(country.region(), Some("Americas"));
    }

    #[test]
    fn test_overwrite_never_moves_updated_before_created() {
        let created = now_millis();
        let mut country = Country::new_at(CountryFields::named("Peru"), created);
        country.overwrite(CountryFields::named("Peru"), created - Duration::seconds(10));
        assert!(country.updated_at >= country.created_at);
    }

    #[test]
    fn test_ids_are_time_ordered() {
        let ids: Vec<CountryId> = (0..100).map(|_| new_country_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_serializes_flat_camel_case() {
        let mut fields = CountryFields::named("Brazil");
        fields.currency_code = Some("BRL".into());
        let country = Country::new_at(fields, now_millis());

        let json = serde_json::to_value(&country).unwrap();
        assert_eq!(json["name"], "Brazil");
        assert_eq!(json["currencyCode"], "BRL");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("fields").is_none());
    }
}
