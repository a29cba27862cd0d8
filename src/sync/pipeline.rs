// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fetch stage of the sync pipeline.
//!
//! ```text
//! producer task ──mpsc (bounded)──▶ fetch worker ──▶ FetchedBatch
//!  drains source                     filter + transform, collects
//! ```
//!
//! The producer stops at the first error it forwards. The worker decides
//! whether that error is fatal (nothing received yet) or just truncates the
//! batch.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::workers::SyncWorkers;
use crate::country::CountryFields;
use crate::source::{CountrySource, RawCountry, SourceError};

/// Output of the fetch stage, handed to persistence as one value.
#[derive(Debug, Default)]
pub struct FetchedBatch {
    pub fields: Vec<CountryFields>,
    /// Records received from the source, before filtering.
    pub fetched: usize,
    pub filtered_out: usize,
    /// Error that cut the stream short after at least one record.
    pub truncated_by: Option<SourceError>,
}

/// Keep records with a known population strictly above `min_population`.
#[must_use]
pub fn passes_population_filter(raw: &RawCountry, min_population: i64) -> bool {
    raw.population.is_some_and(|p| p > min_population)
}

/// Start the producer and the fetch worker in `workers`.
///
/// The returned handle resolves to the filtered, transformed batch, or to the
/// source error if the source failed before yielding anything.
pub fn start_fetch(
    workers: &mut SyncWorkers,
    source: Arc<dyn CountrySource>,
    channel_capacity: usize,
    min_population: i64,
) -> tokio::task::JoinHandle<Result<FetchedBatch, SourceError>> {
    let (tx, rx) = mpsc::channel(channel_capacity.max(1));

    workers.spawn_fetch(async move {
        let mut stream = source.fetch_all();
        while let Some(item) = stream.next().await {
            let stop = item.is_err();
            if tx.send(item).await.is_err() {
                // Worker gone, nobody left to consume
                break;
            }
            if stop {
                break;
            }
        }
    });

    workers.spawn_fetch(collect_batch(rx, min_population))
}

async fn collect_batch(
    mut rx: mpsc::Receiver<Result<RawCountry, SourceError>>,
    min_population: i64,
) -> Result<FetchedBatch, SourceError> {
    let mut batch = FetchedBatch::default();

    while let Some(item) = rx.recv().await {
        let raw = match item {
            Ok(raw) => raw,
            Err(e) if batch.fetched == 0 => return Err(e),
            Err(e) => {
                warn!(
                    error = %e,
                    received = batch.fetched,
                    "Source failed mid-stream, continuing with partial batch"
                );
                batch.truncated_by = Some(e);
                break;
            }
        };
        batch.fetched += 1;

        if !passes_population_filter(&raw, min_population) {
            debug!(
                name = %raw.name.common,
                population = ?raw.population,
                min_population,
                "Dropping country below population threshold"
            );
            batch.filtered_out += 1;
            continue;
        }
        batch.fields.push(raw.into_fields());
    }

    Ok(batch)
}
