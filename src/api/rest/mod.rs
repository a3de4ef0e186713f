pub mod couriers;
pub mod me;
pub mod packages;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::map::Viewport;
use crate::models::marker::Marker;
use crate::models::session::Role;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(couriers::router())
        .merge(packages::router())
        .merge(me::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/markers", get(markers))
        .route("/viewport", get(viewport))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    role: Role,
    user_id: i64,
    markers: usize,
    packages: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        role: state.session.role(),
        user_id: state.session.user.id,
        markers: state.map.len(),
        packages: state.packages.packages().len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

async fn markers(State(state): State<Arc<AppState>>) -> Json<Vec<Marker>> {
    Json(state.map.markers())
}

async fn viewport(State(state): State<Arc<AppState>>) -> Json<Option<Viewport>> {
    Json(state.map.viewport())
}
