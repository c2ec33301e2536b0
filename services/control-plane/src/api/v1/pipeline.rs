//! Pipeline API endpoints.
//!
//! Starting a pipeline prepares the unit list and returns immediately; the
//! run continues in the background and is observed by polling.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::db::DeploymentUnit;
use crate::deploy::JobSnapshot;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_pipeline))
        .route("/start", post(start_pipeline))
}

#[derive(Debug, Serialize)]
pub struct PipelineResponse {
    /// Most recent job, if one was started since the service came up.
    pub job: Option<JobSnapshot>,
    pub units: Vec<DeploymentUnit>,
}

/// POST /v1/pipeline/start
async fn start_pipeline(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let handle = state.jobs().trigger()?;
    let units = state.store().list_units()?;
    Ok((
        StatusCode::ACCEPTED,
        Json(PipelineResponse {
            job: Some(handle.snapshot()),
            units,
        }),
    ))
}

/// GET /v1/pipeline
async fn get_pipeline(State(state): State<AppState>) -> Result<Json<PipelineResponse>, ApiError> {
    Ok(Json(PipelineResponse {
        job: state.jobs().current().map(|job| job.snapshot()),
        units: state.store().list_units()?,
    }))
}
