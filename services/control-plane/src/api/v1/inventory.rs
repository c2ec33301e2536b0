//! Virtual machine and zone endpoints.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::ListResponse;
use crate::api::error::ApiError;
use crate::db::{VirtualMachine, VmUpdate, Zone, ZoneUpdate};
use crate::state::AppState;
use crate::topology::VmType;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/virtual-machines", get(list_vms))
        .route("/virtual-machines/{id}", get(get_vm).put(update_vm))
        .route("/zones", get(list_zones))
        .route("/zones/{id}", get(get_zone).put(update_zone))
}

#[derive(Debug, Deserialize)]
pub struct VmQuery {
    pub tier: Option<String>,
}

/// GET /v1/virtual-machines[?tier=]
async fn list_vms(
    State(state): State<AppState>,
    Query(query): Query<VmQuery>,
) -> Result<Json<ListResponse<VirtualMachine>>, ApiError> {
    let tier = query
        .tier
        .as_deref()
        .map(str::parse::<VmType>)
        .transpose()
        .map_err(|e| ApiError::bad_request("invalid_tier", e))?;
    Ok(Json(state.store().list_vms(tier)?.into()))
}

/// GET /v1/virtual-machines/{id}
async fn get_vm(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<VirtualMachine>, ApiError> {
    Ok(Json(state.store().get_vm(id)?))
}

/// PUT /v1/virtual-machines/{id}
async fn update_vm(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<VmUpdate>,
) -> Result<Json<VirtualMachine>, ApiError> {
    Ok(Json(state.topology().update_vm(id, &update)?))
}

/// GET /v1/zones
async fn list_zones(State(state): State<AppState>) -> Result<Json<ListResponse<Zone>>, ApiError> {
    Ok(Json(state.store().list_zones()?.into()))
}

/// GET /v1/zones/{id}
async fn get_zone(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Zone>, ApiError> {
    Ok(Json(state.store().get_zone(id)?))
}

/// PUT /v1/zones/{id}
async fn update_zone(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<ZoneUpdate>,
) -> Result<Json<Zone>, ApiError> {
    Ok(Json(state.store().update_zone(id, &update)?))
}
