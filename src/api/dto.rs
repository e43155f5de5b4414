use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{db::models::StoredReading, transform::CleanedReading};

/// A reading from the live store (last 24 hours by default).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CurrentReadingDto {
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
    pub loaded_at: DateTime<Utc>,
}

impl From<StoredReading> for CurrentReadingDto {
    fn from(r: StoredReading) -> Self {
        Self {
            reading_id: r.reading_id,
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
            loaded_at: r.loaded_at,
        }
    }
}

/// One bar of a per-plant chart: `x` is `recording_taken`, `y` the value
/// (null when the sensor sent none).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BarPoint {
    pub x: String,
    pub y: Option<f64>,
}

/// Moisture and temperature bar series, in row order.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ChartSeries {
    pub soil_moisture: Vec<BarPoint>,
    pub temperature: Vec<BarPoint>,
}

impl ChartSeries {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = (&'a str, Option<f64>, Option<f64>)>) -> Self {
        let mut series = Self::default();
        for (x, soil_moisture, temperature) in rows {
            series.soil_moisture.push(BarPoint {
                x: x.to_owned(),
                y: soil_moisture,
            });
            series.temperature.push(BarPoint {
                x: x.to_owned(),
                y: temperature,
            });
        }
        series
    }
}

/// Response for `GET /readings/current/{plant_id}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CurrentPlantReadingsDto {
    pub plant_id: i32,
    pub readings: Vec<CurrentReadingDto>,
    pub charts: ChartSeries,
}

/// Response for `GET /archive/keys`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ArchiveKeysDto {
    pub year: i32,
    /// Empty when nothing has been archived for `year` yet.
    pub keys: Vec<String>,
}

/// Response for `GET /archive/readings`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ArchivedReadingsDto {
    pub key: String,
    /// Every plant present in the object, for building a plant picker.
    pub plant_ids: Vec<i32>,
    /// The plant filter applied, if any.
    pub plant_id: Option<i32>,
    pub readings: Vec<CleanedReading>,
    pub charts: ChartSeries,
}

impl ArchivedReadingsDto {
    pub fn new(key: String, rows: Vec<CleanedReading>, plant_id: Option<i32>) -> Self {
        let plant_ids: BTreeSet<i32> = rows.iter().map(|r| r.plant_id).collect();
        let readings: Vec<CleanedReading> = rows
            .into_iter()
            .filter(|r| plant_id.map_or(true, |id| r.plant_id == id))
            .collect();
        let charts = ChartSeries::from_rows(
            readings
                .iter()
                .map(|r| (r.recording_taken.as_str(), r.soil_moisture, r.temperature)),
        );

        Self {
            key,
            plant_ids: plant_ids.into_iter().collect(),
            plant_id,
            readings,
            charts,
        }
    }
}
