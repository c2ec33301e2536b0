//! Deployment unit status and log endpoints.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use super::ListResponse;
use crate::api::error::ApiError;
use crate::db::{DeploymentUnit, UnitLogEntry};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/units", get(list_units))
        .route("/units/{name}/status", get(get_unit_status))
        .route("/logs/{correlation_id}", get(get_logs))
}

/// GET /v1/units
async fn list_units(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<DeploymentUnit>>, ApiError> {
    Ok(Json(state.store().list_units()?.into()))
}

/// GET /v1/units/{name}/status
async fn get_unit_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeploymentUnit>, ApiError> {
    Ok(Json(state.store().get_unit(&name)?))
}

/// GET /v1/logs/{correlation_id}
async fn get_logs(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
) -> Result<Json<ListResponse<UnitLogEntry>>, ApiError> {
    Ok(Json(state.store().get_logs(&correlation_id)?.into()))
}
