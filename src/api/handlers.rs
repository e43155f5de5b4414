use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Datelike, Utc};
use serde::Deserialize;
use utoipa::OpenApi;

use super::{
    dto::{
        ArchiveKeysDto, ArchivedReadingsDto, BarPoint, ChartSeries, CurrentPlantReadingsDto,
        CurrentReadingDto,
    },
    errors::AppError,
    AppState,
};
use crate::{
    archive::{is_valid_key, year_prefix},
    db,
    transform::CleanedReading,
};

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct YearParams {
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveReadingsParams {
    pub key: String,
    pub plant_id: Option<i32>,
}

// ---------------------------------------------------------------------------
// Current data
// ---------------------------------------------------------------------------

/// Every reading in the live window, newest first.
#[utoipa::path(
    get,
    path = "/readings/current",
    responses(
        (status = 200, description = "Readings from the current window", body = Vec<CurrentReadingDto>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "current"
)]
pub async fn get_current_readings(
    State(state): State<AppState>,
) -> Result<Json<Vec<CurrentReadingDto>>, AppError> {
    let rows = db::current_readings(&state.pool, state.since()).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Plant IDs with at least one reading in the live window.
#[utoipa::path(
    get,
    path = "/readings/current/plants",
    responses(
        (status = 200, description = "Distinct plant IDs, ascending", body = Vec<i32>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "current"
)]
pub async fn get_current_plant_ids(
    State(state): State<AppState>,
) -> Result<Json<Vec<i32>>, AppError> {
    Ok(Json(db::current_plant_ids(&state.pool, state.since()).await?))
}

/// One plant's readings in the live window, with moisture and temperature
/// bar series keyed by `recording_taken`.
#[utoipa::path(
    get,
    path = "/readings/current/{plant_id}",
    params(
        ("plant_id" = i32, Path, description = "Plant ID"),
    ),
    responses(
        (status = 200, description = "Plant readings and chart series", body = CurrentPlantReadingsDto),
        (status = 500, description = "Internal server error"),
    ),
    tag = "current"
)]
pub async fn get_current_plant_readings(
    State(state): State<AppState>,
    Path(plant_id): Path<i32>,
) -> Result<Json<CurrentPlantReadingsDto>, AppError> {
    let rows = db::current_plant_readings(&state.pool, plant_id, state.since()).await?;
    let charts = ChartSeries::from_rows(
        rows.iter()
            .map(|r| (r.recording_taken.as_str(), r.soil_moisture, r.temperature)),
    );

    Ok(Json(CurrentPlantReadingsDto {
        plant_id,
        readings: rows.into_iter().map(Into::into).collect(),
        charts,
    }))
}

// ---------------------------------------------------------------------------
// Historical data
// ---------------------------------------------------------------------------

/// Archive objects for a year (default: the current year).
#[utoipa::path(
    get,
    path = "/archive/keys",
    params(
        ("year" = Option<i32>, Query, description = "Archive year, e.g. 2023"),
    ),
    responses(
        (status = 200, description = "Archive keys for the year; empty if none", body = ArchiveKeysDto),
        (status = 500, description = "Internal server error"),
    ),
    tag = "archive"
)]
pub async fn get_archive_keys(
    State(state): State<AppState>,
    Query(params): Query<YearParams>,
) -> Result<Json<ArchiveKeysDto>, AppError> {
    let year = params.year.unwrap_or_else(|| Utc::now().year());
    let keys = state.archive.list_keys(&year_prefix(year)).await?;
    Ok(Json(ArchiveKeysDto { year, keys }))
}

/// Rows of one archive object, optionally narrowed to a single plant.
#[utoipa::path(
    get,
    path = "/archive/readings",
    params(
        ("key" = String, Query, description = "Archive key, e.g. 2023/2023-12-18.csv"),
        ("plant_id" = Option<i32>, Query, description = "Only this plant's readings"),
    ),
    responses(
        (status = 200, description = "Archived readings and chart series", body = ArchivedReadingsDto),
        (status = 400, description = "Key is not a relative archive path"),
        (status = 404, description = "No archive object under that key"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "archive"
)]
pub async fn get_archive_readings(
    State(state): State<AppState>,
    Query(params): Query<ArchiveReadingsParams>,
) -> Result<Json<ArchivedReadingsDto>, AppError> {
    if !is_valid_key(&params.key) {
        return Err(AppError::BadRequest(format!("invalid archive key {:?}", params.key)));
    }

    let rows = state
        .archive
        .load(&params.key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no archive object {:?}", params.key)))?;

    Ok(Json(ArchivedReadingsDto::new(params.key, rows, params.plant_id)))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        get_current_readings,
        get_current_plant_ids,
        get_current_plant_readings,
        get_archive_keys,
        get_archive_readings,
        health
    ),
    components(schemas(
        CurrentReadingDto,
        CurrentPlantReadingsDto,
        ArchiveKeysDto,
        ArchivedReadingsDto,
        ChartSeries,
        BarPoint,
        CleanedReading
    )),
    tags(
        (name = "current", description = "Readings from the live store"),
        (name = "archive", description = "Historical readings from the archive"),
        (name = "system",  description = "System endpoints"),
    ),
    info(
        title = "Plant Monitor API",
        version = "0.1.0",
        description = "Dashboard data for plant sensor readings"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
