//! Sizing, DNS and flow listings.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use super::ListResponse;
use crate::api::error::ApiError;
use crate::db::{DnsRecord, FlowRule};
use crate::state::AppState;
use crate::topology::TierSizing;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sizing/{scale}", get(get_sizing))
        .route("/dns", get(list_dns))
        .route("/flows", get(list_flows))
        .route("/flows/{id}", put(update_flow))
}

#[derive(Debug, Deserialize)]
pub struct FlowUpdate {
    pub is_open: bool,
}

/// GET /v1/sizing/{scale}
async fn get_sizing(
    State(state): State<AppState>,
    Path(scale): Path<u32>,
) -> Result<Json<ListResponse<TierSizing>>, ApiError> {
    Ok(Json(state.topology().sizing(scale)?.into()))
}

/// GET /v1/dns
async fn list_dns(State(state): State<AppState>) -> Result<Json<ListResponse<DnsRecord>>, ApiError> {
    Ok(Json(state.store().list_dns()?.into()))
}

/// GET /v1/flows
async fn list_flows(State(state): State<AppState>) -> Result<Json<ListResponse<FlowRule>>, ApiError> {
    Ok(Json(state.store().list_flows()?.into()))
}

/// PUT /v1/flows/{id}
async fn update_flow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<FlowUpdate>,
) -> Result<Json<FlowRule>, ApiError> {
    Ok(Json(state.store().set_flow_open(id, update.is_open)?))
}
