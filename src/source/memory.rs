// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fixed in-process source for tests and offline seeding.

use std::time::Duration;

use futures::stream::{self, StreamExt};

use super::{CountrySource, RawCountry, RawCountryStream, SourceError};

#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<RawCountry>,
    /// Yield this error after `n` records instead of finishing.
    fail_after: Option<(usize, SourceError)>,
    /// Sleep before each item (including the injected error).
    delay: Option<Duration>,
}

impl StaticSource {
    pub fn new(records: Vec<RawCountry>) -> Self {
        Self { records, ..Default::default() }
    }

    /// A source that fails immediately.
    pub fn failing(error: SourceError) -> Self {
        Self::new(Vec::new()).fail_after(0, error)
    }

    #[must_use]
    pub fn fail_after(mut self, records: usize, error: SourceError) -> Self {
        self.fail_after = Some((records, error));
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl CountrySource for StaticSource {
    fn fetch_all(&self) -> RawCountryStream {
        let items: Vec<Result<RawCountry, SourceError>> = match &self.fail_after {
            Some((n, error)) => self
                .records
                .iter()
                .take(*n)
                .cloned()
                .map(Ok)
                .chain(std::iter::once(Err(error.clone())))
                .collect(),
            None => self.records.iter().cloned().map(Ok).collect(),
        };

        match self.delay {
            Some(delay) => stream::iter(items)
                .then(move |item| async move {
                    tokio::time::sleep(delay).await;
                    item
                })
                .boxed(),
            None => stream::iter(items).boxed(),
        }
    }
}
