use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::transform::CleanedReading;

/// A reading as held in the live store, joined back to its plant and
/// botanist. Columns follow the cleaned-batch order, bracketed by the
/// storage-only `reading_id` and `loaded_at`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StoredReading {
    pub reading_id: Uuid,
    pub plant_id: i32,
    pub plant_name: String,
    /// Percent
    pub soil_moisture: Option<f64>,
    /// Degrees Celsius
    pub temperature: Option<f64>,
    pub last_watered: DateTime<Utc>,
    pub recording_taken: String,
    pub botanist_name: Option<String>,
    pub botanist_mobile: Option<String>,
    pub botanist_email: Option<String>,
    pub error: Option<String>,
    /// When the pipeline inserted the row; drives the live/archive split.
    pub loaded_at: DateTime<Utc>,
}

impl From<StoredReading> for CleanedReading {
    fn from(r: StoredReading) -> Self {
        Self {
            plant_id: r.plant_id,
            plant_name: r.plant_name,
            soil_moisture: r.soil_moisture,
            temperature: r.temperature,
            last_watered: r.last_watered,
            recording_taken: r.recording_taken,
            botanist_name: r.botanist_name,
            botanist_mobile: r.botanist_mobile,
            botanist_email: r.botanist_email,
            error: r.error,
        }
    }
}
