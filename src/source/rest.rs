// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP source for the REST Countries API.
//!
//! The upstream returns the whole dataset as one JSON array. The body is read
//! once, then each element is decoded lazily as the stream is polled, so a
//! malformed element surfaces as a mid-stream error after the good ones.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::debug;

use super::{CountrySource, RawCountry, RawCountryStream, SourceError};

pub struct RestCountriesSource {
    client: Client,
    url: String,
}

impl RestCountriesSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Request(e.to_string()))?;
        Ok(Self { client, url: url.into() })
    }
}

async fn fetch_array(client: Client, url: String) -> Result<Vec<serde_json::Value>, SourceError> {
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| SourceError::Request(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(SourceError::Status(status.as_u16()));
    }

    let values: Vec<serde_json::Value> = resp
        .json()
        .await
        .map_err(|e| SourceError::Decode(e.to_string()))?;

    debug!(url = %url, records = values.len(), "Fetched upstream dataset");
    Ok(values)
}

fn decode_record(value: serde_json::Value) -> Result<RawCountry, SourceError> {
    serde_json::from_value(value).map_err(|e| SourceError::Decode(e.to_string()))
}

impl CountrySource for RestCountriesSource {
    fn fetch_all(&self) -> RawCountryStream {
        let client = self.client.clone();
        let url = self.url.clone();

        stream::once(fetch_array(client, url))
            .flat_map(|result| match result {
                Ok(values) => stream::iter(values.into_iter().map(decode_record)).boxed(),
                Err(e) => stream::iter(std::iter::once(Err(e))).boxed(),
            })
            .boxed()
    }
}
