use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::coordinate::Coordinate;
use crate::state::AppState;
use crate::tracking::reporter::{LocationReporter, ReportOutcome, ReporterStatus};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(status))
        .route("/me/availability", post(toggle_availability))
        .route("/me/sharing", post(update_sharing))
        .route("/me/report", post(report_now))
        .route("/me/location", post(relocate))
}

#[derive(Deserialize)]
pub struct SharingRequest {
    pub enabled: bool,
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub is_available: Option<bool>,
}

#[derive(Deserialize)]
pub struct RelocateRequest {
    pub latitude: f64,
    pub longitude: f64,
}

fn reporter(state: &AppState) -> Result<&Arc<LocationReporter>, AppError> {
    state
        .reporter
        .as_ref()
        .ok_or_else(|| AppError::Forbidden("location sharing requires the delivery role".to_string()))
}

async fn status(State(state): State<Arc<AppState>>) -> Result<Json<ReporterStatus>, AppError> {
    Ok(Json(reporter(&state)?.status()?))
}

/// Without a body the flag is flipped; an explicit value is set as given.
async fn toggle_availability(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<AvailabilityRequest>>,
) -> Result<Json<ReportOutcome>, AppError> {
    let reporter = reporter(&state)?;
    let requested = payload.and_then(|Json(body)| body.is_available);

    let outcome = match requested {
        Some(flag) => reporter.set_available(flag).await?,
        None => reporter.toggle_availability().await?,
    };

    Ok(Json(outcome))
}

async fn update_sharing(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SharingRequest>,
) -> Result<Json<ReporterStatus>, AppError> {
    let reporter = reporter(&state)?;
    reporter.set_location_sharing(payload.enabled);
    Ok(Json(reporter.status()?))
}

async fn report_now(State(state): State<Arc<AppState>>) -> Result<Json<ReportOutcome>, AppError> {
    Ok(Json(reporter(&state)?.try_report().await?))
}

async fn relocate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RelocateRequest>,
) -> Result<Json<ReportOutcome>, AppError> {
    let coordinate = Coordinate::new(payload.latitude, payload.longitude)?;
    Ok(Json(reporter(&state)?.relocate(coordinate).await?))
}
