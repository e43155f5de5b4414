use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use utoipa::ToSchema;

pub const MIN_TEMPERATURE: f64 = 0.0;
pub const MAX_TEMPERATURE: f64 = 40.0;
pub const MIN_SOIL_MOISTURE: f64 = 0.0;
pub const MAX_SOIL_MOISTURE: f64 = 100.0;

/// Textual format of `last_watered` as sent by the plant API,
/// e.g. `"Mon, 18 Dec 2023 14:03:04 GMT"`.
pub const LAST_WATERED_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Column order of a cleaned batch. Loaders and archive files rely on it.
pub const COLUMNS: [&str; 10] = [
    "plant_id",
    "plant_name",
    "soil_moisture",
    "temperature",
    "last_watered",
    "recording_taken",
    "botanist_name",
    "botanist_mobile",
    "botanist_email",
    "error",
];

// ---------------------------------------------------------------------------
// Input rows
// ---------------------------------------------------------------------------

/// Staff contact attached to a plant. Any sub-field may be missing upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Botanist {
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

impl Botanist {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.name.is_none() && self.phone.is_none()
    }
}

/// One extracted observation, exactly as the extractor emits it.
///
/// Unknown fields are ignored on deserialisation, so wider upstream records
/// can be fed in directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub plant_id: i32,
    pub plant_name: String,
    /// Percent.
    pub soil_moisture: Option<f64>,
    /// Degrees Celsius.
    pub temperature: Option<f64>,
    /// See [`LAST_WATERED_FORMAT`].
    pub last_watered: String,
    pub recording_taken: String,
    pub botanist: Option<Botanist>,
    pub error: Option<String>,
}

impl RawReading {
    /// A row survives iff both readings are null or inside their inclusive bounds.
    pub fn is_within_bounds(&self) -> bool {
        in_range(self.temperature, MIN_TEMPERATURE, MAX_TEMPERATURE)
            && in_range(self.soil_moisture, MIN_SOIL_MOISTURE, MAX_SOIL_MOISTURE)
    }
}

// ---------------------------------------------------------------------------
// Output rows
// ---------------------------------------------------------------------------

/// A validated, flattened reading. Field order is the column contract in
/// [`COLUMNS`]; serialisers (CSV, JSON) emit fields in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CleanedReading {
    pub plant_id: i32,
    pub plant_name: String,
    /// Percent, rounded to 2 decimal places.
    pub soil_moisture: Option<f64>,
    /// Degrees Celsius, rounded to 2 decimal places.
    pub temperature: Option<f64>,
    pub last_watered: DateTime<Utc>,
    pub recording_taken: String,
    pub botanist_name: Option<String>,
    pub botanist_mobile: Option<String>,
    pub botanist_email: Option<String>,
    pub error: Option<String>,
}

impl CleanedReading {
    fn from_raw(raw: RawReading, last_watered: DateTime<Utc>) -> Self {
        let botanist = raw.botanist.unwrap_or_default();
        Self {
            plant_id: raw.plant_id,
            plant_name: raw.plant_name,
            soil_moisture: not_nan(raw.soil_moisture).map(round2),
            temperature: not_nan(raw.temperature).map(round2),
            last_watered,
            recording_taken: raw.recording_taken,
            botanist_name: botanist.name,
            botanist_mobile: botanist.phone,
            botanist_email: botanist.email,
            error: raw.error,
        }
    }

    /// The flattened botanist, or `None` when every sub-field is null.
    pub fn botanist(&self) -> Option<Botanist> {
        let b = Botanist {
            email: self.botanist_email.clone(),
            name: self.botanist_name.clone(),
            phone: self.botanist_mobile.clone(),
        };
        (!b.is_empty()).then_some(b)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(
        "row {row} (plant {plant_id}): last_watered {value:?} does not match \
         '%a, %d %b %Y %H:%M:%S GMT'"
    )]
    MalformedTimestamp {
        row: usize,
        plant_id: i32,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// Cleans one extracted batch, ready for loading.
///
/// Every `last_watered` is parsed first: a single malformed value fails the
/// whole batch, including rows the range check would have dropped. Rows with
/// an out-of-range temperature or soil moisture are then dropped silently.
/// Survivors keep their input order and come out rounded and flattened.
pub fn clean_reading_data(batch: Vec<RawReading>) -> Result<Vec<CleanedReading>, TransformError> {
    let rows_in = batch.len();

    let parsed = batch
        .into_iter()
        .enumerate()
        .map(|(row, raw)| match parse_last_watered(&raw.last_watered) {
            Ok(last_watered) => Ok((raw, last_watered)),
            Err(source) => Err(TransformError::MalformedTimestamp {
                row,
                plant_id: raw.plant_id,
                value: raw.last_watered,
                source,
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let cleaned: Vec<CleanedReading> = parsed
        .into_iter()
        .filter(|(raw, _)| raw.is_within_bounds())
        .map(|(raw, last_watered)| CleanedReading::from_raw(raw, last_watered))
        .collect();

    info!(rows_in, rows_out = cleaned.len(), "Transformed extracted data");
    Ok(cleaned)
}

/// Parse a `last_watered` value; the trailing `GMT` means UTC.
pub fn parse_last_watered(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, LAST_WATERED_FORMAT).map(|dt| dt.and_utc())
}

/// Round to 2 decimal places, halves to even (`0.125 -> 0.12`).
#[inline]
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}

/// NaN is a missing reading, not an out-of-range one.
#[inline]
fn not_nan(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

#[inline]
fn in_range(value: Option<f64>, min: f64, max: f64) -> bool {
    not_nan(value).map_or(true, |v| (min..=max).contains(&v))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
