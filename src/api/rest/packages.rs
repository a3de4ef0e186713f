use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::map::color::package_color;
use crate::models::marker::MarkerColor;
use crate::models::package::{NewPackage, Package, PackageStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/packages", get(list_packages).post(create_package))
        .route("/packages/:id/status", put(update_package_status))
        .route("/packages/:id", delete(delete_package))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: PackageStatus,
}

/// A package table row with its display status and color.
#[derive(Serialize)]
pub struct PackageRow {
    #[serde(flatten)]
    pub package: Package,
    pub status_label: String,
    pub color: MarkerColor,
    pub color_hex: &'static str,
}

impl From<&Package> for PackageRow {
    fn from(package: &Package) -> Self {
        let color = package_color(&package.status);
        Self {
            package: package.clone(),
            status_label: package.status.display_label().to_string(),
            color,
            color_hex: color.hex(),
        }
    }
}

async fn list_packages(State(state): State<Arc<AppState>>) -> Result<Json<Vec<PackageRow>>, AppError> {
    let packages = state.packages.refresh().await?;
    Ok(Json(packages.iter().map(PackageRow::from).collect()))
}

async fn create_package(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewPackage>,
) -> Result<StatusCode, AppError> {
    state.packages.create(payload).await?;
    Ok(StatusCode::CREATED)
}

async fn update_package_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<StatusCode, AppError> {
    state.packages.set_status(id, payload.status).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_package(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.packages.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
