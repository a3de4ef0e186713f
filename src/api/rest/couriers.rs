use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::courier::Courier;
use crate::models::marker::MarkerKind;
use crate::state::AppState;
use crate::tracking::aggregator::{LocationAggregator, PollSummary};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", get(list_couriers))
        .route("/couriers/poll", post(poll_couriers))
        .route("/selection", put(update_selection).get(get_selection))
}

#[derive(Deserialize)]
pub struct SelectionRequest {
    pub courier_id: Option<i64>,
}

#[derive(Serialize)]
pub struct SelectionResponse {
    pub courier_id: Option<i64>,
    pub focused: bool,
}

fn aggregator(state: &AppState) -> Result<&Arc<LocationAggregator>, AppError> {
    state
        .aggregator
        .as_ref()
        .ok_or_else(|| AppError::Forbidden("courier tracking requires the admin role".to_string()))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Courier>>, AppError> {
    let couriers = aggregator(&state)?.couriers();
    Ok(Json(couriers.as_ref().clone()))
}

async fn poll_couriers(State(state): State<Arc<AppState>>) -> Result<Json<PollSummary>, AppError> {
    let summary = aggregator(&state)?.try_poll().await?;
    Ok(Json(summary))
}

async fn update_selection(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SelectionRequest>,
) -> Result<Json<SelectionResponse>, AppError> {
    let focused = aggregator(&state)?.select(payload.courier_id);

    Ok(Json(SelectionResponse {
        courier_id: payload.courier_id,
        focused,
    }))
}

async fn get_selection(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SelectionResponse>, AppError> {
    let aggregator = aggregator(&state)?;
    let courier_id = aggregator.selected();
    let focused = courier_id
        .and_then(|id| state.map.marker(MarkerKind::Courier, id))
        .is_some_and(|marker| marker.popup_open);

    Ok(Json(SelectionResponse {
        courier_id,
        focused,
    }))
}
