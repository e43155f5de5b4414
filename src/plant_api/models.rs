use anyhow::{Context, Result};
use serde::Deserialize;

use crate::transform::{Botanist, RawReading};

// ---------------------------------------------------------------------------
// GET /plants/{plant_id}
//
// Healthy record:
//   { "plant_id": 0, "name": "...", "soil_moisture": 95.2, "temperature": 13.1,
//     "last_watered": "Mon, 18 Dec 2023 14:03:04 GMT",
//     "recording_taken": "2023-12-18 15:25:19",
//     "botanist": { "email": "...", "name": "...", "phone": "..." },
//     "images": {...}, "origin_location": [...], "scientific_name": [...] }
//
// Faulty sensor / unknown plant:
//   { "plant_id": 8, "error": "plant sensor fault" }
//
// Only the transient fields are projected into a `RawReading`; static plant
// metadata (images, origin, scientific name) is ignored.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PlantResponse {
    pub plant_id: Option<i32>,
    pub name: Option<String>,
    pub soil_moisture: Option<f64>,
    pub temperature: Option<f64>,
    pub last_watered: Option<String>,
    pub recording_taken: Option<String>,
    pub botanist: Option<Botanist>,
    pub error: Option<String>,
}

impl TryFrom<PlantResponse> for RawReading {
    type Error = anyhow::Error;

    fn try_from(r: PlantResponse) -> Result<Self> {
        let plant_id = r.plant_id.context("plant record: missing 'plant_id'")?;
        let describe = || match &r.error {
            Some(e) => format!("plant {plant_id}: {e}"),
            None => format!("plant {plant_id}"),
        };

        let plant_name = r
            .name
            .clone()
            .with_context(|| format!("{}: missing 'name'", describe()))?;
        let last_watered = r
            .last_watered
            .clone()
            .with_context(|| format!("{}: missing 'last_watered'", describe()))?;
        let recording_taken = r
            .recording_taken
            .clone()
            .with_context(|| format!("{}: missing 'recording_taken'", describe()))?;

        Ok(Self {
            plant_id,
            plant_name,
            soil_moisture: r.soil_moisture,
            temperature: r.temperature,
            last_watered,
            recording_taken,
            botanist: r.botanist,
            error: r.error,
        })
    }
}
