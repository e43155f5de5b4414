pub mod models;

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, error, info, warn};

use crate::{config::Config, transform::RawReading};

use self::models::PlantResponse;

/// Cheaply cloneable handle to the plant sensor API.
#[derive(Debug, Clone)]
pub struct PlantApiClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    base_url: String,
}

impl PlantApiClient {
    pub fn new(config: &Config) -> Self {
        Self::with_base_url(&config.plant_api_base_url)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: Client::new(),
                base_url: base_url.trim_end_matches('/').to_owned(),
            }),
        }
    }

    /// Fetch the current record for one plant.
    ///
    /// Transport failures are errors. Anything the API sends back that does
    /// not decode into a complete reading (fault records, HTML error pages,
    /// truncated JSON) yields `Ok(None)`.
    pub async fn get_plant(&self, plant_id: i32) -> Result<Option<RawReading>> {
        let url = format!("{}/plants/{}", self.inner.base_url, plant_id);
        debug!(plant_id, url = %url, "Fetching plant record");

        let resp = self
            .inner
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("plant API request failed for plant {plant_id}"))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("failed to read plant API response body for plant {plant_id}"))?;

        debug!(plant_id, status = %status, bytes = bytes.len(), "Plant record received");
        Ok(parse_plant_body(plant_id, &bytes))
    }

    /// Fetch one record per plant. Per-plant failures are logged and skipped,
    /// so the batch may be shorter than `plant_ids`, or empty.
    pub async fn extract_readings(&self, plant_ids: &[i32]) -> Vec<RawReading> {
        let mut batch = Vec::with_capacity(plant_ids.len());

        for &plant_id in plant_ids {
            match self.get_plant(plant_id).await {
                Ok(Some(reading)) => batch.push(reading),
                Ok(None) => {}
                Err(e) => error!(plant_id, error = %e, "Failed to fetch plant record"),
            }
        }

        info!(requested = plant_ids.len(), extracted = batch.len(), "Extracted plant readings");
        batch
    }
}

/// Decode a raw `/plants/{id}` body into a reading, or `None` if it is not
/// valid JSON or lacks the fields a reading needs.
pub(crate) fn parse_plant_body(plant_id: i32, bytes: &[u8]) -> Option<RawReading> {
    let resp = match serde_json::from_slice::<PlantResponse>(bytes) {
        Ok(resp) => resp,
        Err(e) => {
            warn!(plant_id, error = %e, "Plant API response is not valid JSON; skipping");
            return None;
        }
    };

    match RawReading::try_from(resp) {
        Ok(reading) => Some(reading),
        Err(e) => {
            warn!(plant_id, error = %e, "Plant API returned no usable reading; skipping");
            None
        }
    }
}
