pub mod dto;
pub mod errors;
pub mod handlers;

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::archive::SharedArchiveStore;

use handlers::ApiDoc;

/// Shared handler state: the live store, the archive, and the width of the
/// "current" window.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub archive: SharedArchiveStore,
    pub window: chrono::Duration,
}

impl AppState {
    /// Start of the current window.
    pub fn since(&self) -> DateTime<Utc> {
        Utc::now() - self.window
    }
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/readings/current", get(handlers::get_current_readings))
        .route(
            "/readings/current/plants",
            get(handlers::get_current_plant_ids),
        )
        .route(
            "/readings/current/{plant_id}",
            get(handlers::get_current_plant_readings),
        )
        .route("/archive/keys", get(handlers::get_archive_keys))
        .route("/archive/readings", get(handlers::get_archive_readings))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
