//! API v1 routes.

mod configuration;
mod inventory;
mod network;
mod pipeline;
mod units;

use axum::Router;
use serde::Serialize;

use crate::state::AppState;

/// Create API v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/pipeline", pipeline::routes())
        .merge(units::routes())
        .merge(inventory::routes())
        .nest("/configuration", configuration::routes())
        .merge(network::routes())
}

/// Response for list endpoints.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            total: items.len(),
            items,
        }
    }
}
