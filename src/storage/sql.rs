// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL country store (SQLite or MySQL through the sqlx `Any` driver).
//!
//! Schema:
//! ```sql
//! CREATE TABLE countries (
//!   id            CHAR(36) PRIMARY KEY,   -- UUID v7, text order == time order
//!   country_name  VARCHAR(255) NOT NULL UNIQUE,
//!   official_name VARCHAR(255),
//!   capital_city  VARCHAR(255),
//!   region        VARCHAR(128),
//!   subregion     VARCHAR(128),
//!   population    BIGINT,
//!   area          VARCHAR(64),            -- decimal as text
//!   currency_code VARCHAR(16),
//!   currency_name VARCHAR(128),
//!   created_at    BIGINT NOT NULL,        -- epoch millis
//!   updated_at    BIGINT NOT NULL
//! )
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! The `Any` driver has no UUID, decimal or timestamp mapping, so ids and
//! areas are stored as text and timestamps as epoch millis. Hyphenated
//! lowercase UUIDs sort the same as their bytes, which keeps `ORDER BY id`
//! consistent with cursor comparison.

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyConnection, AnyPool, Row};
use tracing::{debug, warn};

use super::traits::{carry_over_identity, CountryStore, StorageError};
use crate::country::{Country, CountryFields, CountryId};
use crate::metrics::LatencyTimer;
use crate::resilience::retry::{retry, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

const SELECT_COLUMNS: &str = "SELECT id, country_name, official_name, capital_city, region, subregion, \
     population, area, currency_code, currency_name, created_at, updated_at FROM countries";

const INSERT_COLUMNS: &str = "INSERT INTO countries (id, country_name, official_name, capital_city, region, \
     subregion, population, area, currency_code, currency_name, created_at, updated_at) VALUES ";

const ROW_PLACEHOLDERS: &str = "(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

// 12 binds per row; stays under SQLite's 999-variable limit on old builds
const INSERT_CHUNK_ROWS: usize = 50;

pub struct SqlCountryStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlCountryStore {
    /// Connect with startup-mode retry and create the schema if missing.
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, StorageError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        let store = Self { pool, is_sqlite };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let statements: &[&str] = if self.is_sqlite {
            &[
                r#"
                CREATE TABLE IF NOT EXISTS countries (
                    id TEXT PRIMARY KEY,
                    country_name TEXT NOT NULL UNIQUE,
                    official_name TEXT,
                    capital_city TEXT,
                    region TEXT,
                    subregion TEXT,
                    population INTEGER,
                    area TEXT,
                    currency_code TEXT,
                    currency_name TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_countries_region ON countries (region)",
            ]
        } else {
            &[r#"
                CREATE TABLE IF NOT EXISTS countries (
                    id CHAR(36) PRIMARY KEY,
                    country_name VARCHAR(255) NOT NULL,
                    official_name VARCHAR(255),
                    capital_city VARCHAR(255),
                    region VARCHAR(128),
                    subregion VARCHAR(128),
                    population BIGINT,
                    area VARCHAR(64),
                    currency_code VARCHAR(16),
                    currency_name VARCHAR(128),
                    created_at BIGINT NOT NULL,
                    updated_at BIGINT NOT NULL,
                    UNIQUE KEY uq_country_name (country_name),
                    INDEX idx_region (region)
                )
                "#]
        };

        for sql in statements {
            retry("sql_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(sql)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))
            })
            .await?;
        }
        Ok(())
    }
}

/// Classify a sqlx error so unique-key violations surface as constraints.
fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::Constraint(db.message().to_string())
        }
        _ => StorageError::Backend(err.to_string()),
    }
}

fn millis_to_datetime(column: &str, millis: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::Backend(format!("{} out of range: {}", column, millis)))
}

fn row_to_country(row: &AnyRow) -> Result<Country, StorageError> {
    let id: String = row.try_get("id").map_err(map_sqlx_error)?;
    let id = CountryId::parse_str(&id)
        .map_err(|e| StorageError::Backend(format!("Invalid id '{}': {}", id, e)))?;

    let area: Option<String> = row.try_get("area").map_err(map_sqlx_error)?;
    let area = match area {
        Some(text) => Some(
            text.parse::<Decimal>()
                .map_err(|e| StorageError::Backend(format!("Invalid area '{}': {}", text, e)))?,
        ),
        None => None,
    };

    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
    let updated_at: i64 = row.try_get("updated_at").map_err(map_sqlx_error)?;

    Ok(Country {
        id,
        fields: CountryFields {
            name: row.try_get("country_name").map_err(map_sqlx_error)?,
            official_name: row.try_get("official_name").map_err(map_sqlx_error)?,
            capital: row.try_get("capital_city").map_err(map_sqlx_error)?,
            region: row.try_get("region").map_err(map_sqlx_error)?,
            subregion: row.try_get("subregion").map_err(map_sqlx_error)?,
            population: row.try_get("population").map_err(map_sqlx_error)?,
            area,
            currency_code: row.try_get("currency_code").map_err(map_sqlx_error)?,
            currency_name: row.try_get("currency_name").map_err(map_sqlx_error)?,
        },
        created_at: millis_to_datetime("created_at", created_at)?,
        updated_at: millis_to_datetime("updated_at", updated_at)?,
    })
}

fn rows_to_countries(rows: &[AnyRow]) -> Result<Vec<Country>, StorageError> {
    rows.iter().map(row_to_country).collect()
}

/// Owned bind values for one row, in `INSERT_COLUMNS` order.
struct PreparedRow {
    id: String,
    name: String,
    official_name: Option<String>,
    capital: Option<String>,
    region: Option<String>,
    subregion: Option<String>,
    population: Option<i64>,
    area: Option<String>,
    currency_code: Option<String>,
    currency_name: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<&Country> for PreparedRow {
    fn from(c: &Country) -> Self {
        Self {
            id: c.id.to_string(),
            name: c.fields.name.clone(),
            official_name: c.fields.official_name.clone(),
            capital: c.fields.capital.clone(),
            region: c.fields.region.clone(),
            subregion: c.fields.subregion.clone(),
            population: c.fields.population,
            area: c.fields.area.map(|a| a.to_string()),
            currency_code: c.fields.currency_code.clone(),
            currency_name: c.fields.currency_name.clone(),
            created_at: c.created_at.timestamp_millis(),
            updated_at: c.updated_at.timestamp_millis(),
        }
    }
}

async fn select_by_name(conn: &mut AnyConnection, name: &str) -> Result<Option<Country>, StorageError> {
    let sql = format!("{} WHERE country_name = ?", SELECT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(name.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
    row.as_ref().map(row_to_country).transpose()
}

/// Overwrite mutable fields of the row with `country.id`. Returns rows affected.
async fn update_row(conn: &mut AnyConnection, country: &Country) -> Result<u64, StorageError> {
    let row = PreparedRow::from(country);
    let result = sqlx::query(
        "UPDATE countries SET country_name = ?, official_name = ?, capital_city = ?, region = ?, \
         subregion = ?, population = ?, area = ?, currency_code = ?, currency_name = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(row.name)
    .bind(row.official_name)
    .bind(row.capital)
    .bind(row.region)
    .bind(row.subregion)
    .bind(row.population)
    .bind(row.area)
    .bind(row.currency_code)
    .bind(row.currency_name)
    .bind(row.updated_at)
    .bind(row.id)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;
    Ok(result.rows_affected())
}

/// Multi-row INSERT in chunks. Caller owns the transaction.
async fn insert_rows(conn: &mut AnyConnection, countries: &[Country]) -> Result<usize, StorageError> {
    let mut written = 0usize;

    for chunk in countries.chunks(INSERT_CHUNK_ROWS) {
        let placeholders = vec![ROW_PLACEHOLDERS; chunk.len()].join(", ");
        let sql = format!("{}{}", INSERT_COLUMNS, placeholders);

        let mut query = sqlx::query(&sql);
        for row in chunk.iter().map(PreparedRow::from) {
            query = query
                .bind(row.id)
                .bind(row.name)
                .bind(row.official_name)
                .bind(row.capital)
                .bind(row.region)
                .bind(row.subregion)
                .bind(row.population)
                .bind(row.area)
                .bind(row.currency_code)
                .bind(row.currency_name)
                .bind(row.created_at)
                .bind(row.updated_at);
        }

        query.execute(&mut *conn).await.map_err(map_sqlx_error)?;
        written += chunk.len();
    }

    Ok(written)
}

#[async_trait]
impl CountryStore for SqlCountryStore {
    async fn save(&self, fields: CountryFields, now: DateTime<Utc>) -> Result<Country, StorageError> {
        let _timer = LatencyTimer::new("sql", "save");
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let saved = match select_by_name(&mut tx, &fields.name).await? {
            Some(mut existing) => {
                debug!(id = %existing.id, name = %fields.name, "Updating existing country by name");
                existing.overwrite(fields, now);
                update_row(&mut tx, &existing).await?;
                existing
            }
            None => {
                let country = Country::new_at(fields, now);
                debug!(id = %country.id, name = %country.fields.name, "Inserting new country");
                insert_rows(&mut tx, std::slice::from_ref(&country)).await?;
                country
            }
        };

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(saved)
    }

    async fn update(&self, country: &Country) -> Result<(), StorageError> {
        let _timer = LatencyTimer::new("sql", "update");
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        // MySQL reports 0 affected rows when nothing changed, so confirm existence
        if update_row(&mut tx, country).await? == 0 {
            let present = sqlx::query("SELECT 1 AS present FROM countries WHERE id = ?")
                .bind(country.id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            if present.is_none() {
                return Err(StorageError::NotFound(country.id.to_string()));
            }
        }
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn find_by_id(&self, id: CountryId) -> Result<Option<Country>, StorageError> {
        let _timer = LatencyTimer::new("sql", "find_by_id");
        let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
        let id = id.to_string();

        retry("sql_find_by_id", &RetryConfig::query(), || async {
            let row = sqlx::query(&sql)
                .bind(id.clone())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            row.as_ref().map(row_to_country).transpose()
        })
        .await
    }

    async fn find_by_region(&self, region: &str) -> Result<Vec<Country>, StorageError> {
        let _timer = LatencyTimer::new("sql", "find_by_region");
        let sql = format!("{} WHERE region = ? ORDER BY id ASC", SELECT_COLUMNS);

        retry("sql_find_by_region", &RetryConfig::query(), || async {
            let rows = sqlx::query(&sql)
                .bind(region.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            rows_to_countries(&rows)
        })
        .await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Country>, StorageError> {
        let _timer = LatencyTimer::new("sql", "find_by_name");
        retry("sql_find_by_name", &RetryConfig::query(), || async {
            let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
            select_by_name(&mut conn, name).await
        })
        .await
    }

    async fn find_page_after(
        &self,
        cursor: Option<CountryId>,
        limit: usize,
    ) -> Result<Vec<Country>, StorageError> {
        let _timer = LatencyTimer::new("sql", "find_page_after");
        let limit = limit as i64;

        retry("sql_find_page_after", &RetryConfig::query(), || async {
            let rows = match cursor {
                Some(cursor) => {
                    let sql = format!("{} WHERE id > ? ORDER BY id ASC LIMIT ?", SELECT_COLUMNS);
                    sqlx::query(&sql)
                        .bind(cursor.to_string())
                        .bind(limit)
                        .fetch_all(&self.pool)
                        .await
                }
                None => {
                    let sql = format!("{} ORDER BY id ASC LIMIT ?", SELECT_COLUMNS);
                    sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await
                }
            }
            .map_err(map_sqlx_error)?;
            rows_to_countries(&rows)
        })
        .await
    }

    async fn delete_by_id(&self, id: CountryId) -> Result<bool, StorageError> {
        let _timer = LatencyTimer::new("sql", "delete_by_id");
        let result = sqlx::query("DELETE FROM countries WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self) -> Result<u64, StorageError> {
        let _timer = LatencyTimer::new("sql", "delete_all");
        let result = sqlx::query("DELETE FROM countries")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn save_batch(&self, countries: &[Country]) -> Result<usize, StorageError> {
        if countries.is_empty() {
            return Ok(0);
        }
        let _timer = LatencyTimer::new("sql", "save_batch");
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let written = insert_rows(&mut tx, countries).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(written)
    }

    async fn exists_after(&self, cursor: CountryId) -> Result<bool, StorageError> {
        let _timer = LatencyTimer::new("sql", "exists_after");
        let cursor = cursor.to_string();
        retry("sql_exists_after", &RetryConfig::query(), || async {
            let row = sqlx::query("SELECT 1 AS present FROM countries WHERE id > ? LIMIT 1")
                .bind(cursor.clone())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            Ok(row.is_some())
        })
        .await
    }

    async fn replace_all(
        &self,
        batch: Vec<CountryFields>,
        now: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let _timer = LatencyTimer::new("sql", "replace_all");
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let existing_rows = sqlx::query("SELECT id, country_name, created_at FROM countries")
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let mut existing = Vec::with_capacity(existing_rows.len());
        for row in &existing_rows {
            let id: String = row.try_get("id").map_err(map_sqlx_error)?;
            let id = CountryId::parse_str(&id)
                .map_err(|e| StorageError::Backend(format!("Invalid id '{}': {}", id, e)))?;
            let name: String = row.try_get("country_name").map_err(map_sqlx_error)?;
            let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
            existing.push((name, id, millis_to_datetime("created_at", created_at)?));
        }

        let replacement = carry_over_identity(existing, batch, now);

        let deleted = sqlx::query("DELETE FROM countries")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        let written = match insert_rows(&mut tx, &replacement).await {
            Ok(written) => written,
            Err(e) => {
                warn!(error = %e, "Bulk insert failed, rolling back replace");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }
        };

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(deleted, written, "Replaced country dataset");
        Ok(written)
    }

    async fn count(&self) -> Result<u64, StorageError> {
        let _timer = LatencyTimer::new("sql", "count");
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM countries")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let count: i64 = row.try_get("cnt").map_err(map_sqlx_error)?;
        Ok(count as u64)
    }
}
