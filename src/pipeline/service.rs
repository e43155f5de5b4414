use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use crate::{db, plant_api::PlantApiClient, transform::clean_reading_data};

/// One extract -> transform -> load cycle over the configured plants.
pub struct PipelineService {
    pool: PgPool,
    client: PlantApiClient,
    plant_ids: Vec<i32>,
}

impl PipelineService {
    pub fn new(pool: PgPool, client: PlantApiClient, plant_ids: Vec<i32>) -> Self {
        Self {
            pool,
            client,
            plant_ids,
        }
    }

    /// Fetches one record per plant, cleans the batch and loads the
    /// survivors. Returns the number of readings written.
    ///
    /// A malformed `last_watered` anywhere in the batch fails the whole
    /// cycle; nothing is loaded for it.
    pub async fn run_once(&self) -> Result<usize> {
        let raw = self.client.extract_readings(&self.plant_ids).await;
        let extracted = raw.len();

        let cleaned = clean_reading_data(raw).context("failed to clean extracted batch")?;
        let loaded = db::load_readings(&self.pool, &cleaned).await?;

        info!(
            extracted,
            dropped = extracted - cleaned.len(),
            loaded,
            "Pipeline cycle complete"
        );
        Ok(loaded)
    }
}
