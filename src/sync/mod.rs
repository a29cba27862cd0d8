// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Synchronization engine.
//!
//! One run pulls the full upstream dataset and replaces the stored one:
//!
//! ```text
//! ┌────────────┐  mpsc   ┌──────────────┐  batch  ┌────────────────────────┐
//! │  producer  │ ──────▶ │ fetch worker │ ──────▶ │ persist pool           │
//! │ (source)   │         │ filter, map  │         │ replace_all (one tx)   │
//! └────────────┘         └──────────────┘         │ then invalidate cache  │
//!                                                 └────────────────────────┘
//! ```
//!
//! Rows whose name is already stored keep their id and `created_at` across
//! runs; everything else in the table is replaced. The cache is invalidated
//! only after the transaction commits.

pub mod pipeline;
pub mod workers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::cache::{CountryCache, Invalidation};
use crate::config::CountrySyncConfig;
use crate::country::now_millis;
use crate::error::CountryError;
use crate::metrics;
use crate::source::CountrySource;
use crate::storage::traits::CountryStore;

use pipeline::start_fetch;
use workers::{join, PersistPool, SyncWorkers};

/// Summary of one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    /// Records received from the source.
    pub fetched: usize,
    /// Records dropped by the population filter.
    pub filtered_out: usize,
    /// Rows written by the replace (0 when the batch was empty).
    pub persisted: usize,
    pub elapsed: Duration,
}

pub struct SyncEngine {
    store: Arc<dyn CountryStore>,
    cache: CountryCache,
    source: Arc<dyn CountrySource>,
    pool: PersistPool,
    min_population: i64,
    fetch_timeout: Duration,
    channel_capacity: usize,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn CountryStore>,
        cache: CountryCache,
        source: Arc<dyn CountrySource>,
        config: &CountrySyncConfig,
    ) -> Self {
        Self {
            store,
            cache,
            source,
            pool: PersistPool::new(config.persist_pool_max_tasks, config.persist_pool_max_queued),
            min_population: config.min_population,
            fetch_timeout: config.fetch_timeout(),
            channel_capacity: config.fetch_channel_capacity,
        }
    }

    /// Run a sync and return the number of persisted records.
    pub async fn sync(&self) -> Result<usize, CountryError> {
        self.sync_with_report().await.map(|report| report.persisted)
    }

    #[tracing::instrument(skip(self), fields(min_population = self.min_population))]
    pub async fn sync_with_report(&self) -> Result<SyncReport, CountryError> {
        let start = Instant::now();
        let result = self.run(start).await;

        let outcome = match &result {
            Ok(report) if report.persisted == 0 => "empty",
            Ok(_) => "success",
            Err(CountryError::SourceUnavailable(_)) => "source_unavailable",
            Err(_) => "persistence_failure",
        };
        metrics::record_sync_run(outcome, start.elapsed());

        match &result {
            Ok(report) => info!(
                fetched = report.fetched,
                filtered_out = report.filtered_out,
                persisted = report.persisted,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Sync complete"
            ),
            Err(e) => warn!(error = %e, "Sync failed"),
        }
        result
    }

    async fn run(&self, start: Instant) -> Result<SyncReport, CountryError> {
        // Dropped on every exit path, aborting whatever is still running
        let mut workers = SyncWorkers::new(self.pool.clone());

        let fetch = start_fetch(
            &mut workers,
            Arc::clone(&self.source),
            self.channel_capacity,
            self.min_population,
        );

        let batch = match tokio::time::timeout(self.fetch_timeout, join(fetch)).await {
            Err(_) => {
                return Err(CountryError::SourceUnavailable(format!(
                    "fetch timed out after {:?}",
                    self.fetch_timeout
                )))
            }
            Ok(Err(e)) => return Err(CountryError::SourceUnavailable(e.to_string())),
            Ok(Ok(fetched)) => fetched?,
        };

        metrics::record_filtered(batch.filtered_out);
        let mut report = SyncReport {
            fetched: batch.fetched,
            filtered_out: batch.filtered_out,
            ..Default::default()
        };

        if batch.fields.is_empty() {
            info!(fetched = batch.fetched, "No records passed the filter, keeping stored dataset");
            report.elapsed = start.elapsed();
            return Ok(report);
        }

        let now = now_millis();
        let store = Arc::clone(&self.store);
        let cache = self.cache.clone();
        let fields = batch.fields;

        let persist = workers
            .submit_persist(async move {
                let written = store.replace_all(fields, now).await?;
                // Outlives this task if the run is cancelled after the commit
                cache.invalidate_committed(Invalidation::all()).await;
                Ok::<usize, CountryError>(written)
            })
            .map_err(|e| CountryError::PersistenceFailure(e.to_string()))?;

        report.persisted = join(persist)
            .await
            .map_err(|e| CountryError::PersistenceFailure(e.to_string()))??;
        metrics::record_persisted(report.persisted);

        report.elapsed = start.elapsed();
        Ok(report)
    }
}
