//! Deployment settings and scale endpoints.
//!
//! Changing the scale re-materializes the topology; changing the domain or
//! environment prefix refreshes the derived DNS and flow records.

use axum::{
    extract::State,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::db::{Settings, SettingsUpdate};
use crate::state::AppState;
use crate::topology::MaterializeReport;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_configuration).put(update_configuration))
        .route("/scale", put(set_scale))
}

#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    /// Target concurrent-user count.
    pub scale: u32,
}

/// GET /v1/configuration
async fn get_configuration(State(state): State<AppState>) -> Result<Json<Settings>, ApiError> {
    Ok(Json(state.store().get_settings()?))
}

/// PUT /v1/configuration
async fn update_configuration(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<Settings>, ApiError> {
    let settings = state.store().update_settings(&update)?;
    if update.base_domain.is_some() || update.env_prefix.is_some() {
        state.topology().refresh_derived()?;
    }
    Ok(Json(settings))
}

/// PUT /v1/configuration/scale
async fn set_scale(
    State(state): State<AppState>,
    Json(req): Json<ScaleRequest>,
) -> Result<Json<MaterializeReport>, ApiError> {
    let topology = state.topology().clone();
    let report = tokio::task::spawn_blocking(move || topology.apply_scale(req.scale))
        .await
        .map_err(|e| ApiError::internal("task_failed", e.to_string()))??;
    Ok(Json(report))
}
