use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::db::StoreError;
use crate::deploy::TriggerError;
use crate::topology::TopologyError;

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
    pub retryable: bool,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("https://stratum.dev/problems/{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            code,
            retryable: false,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn with_status(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, code, message)
    }

    pub fn unprocessable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::UNPROCESSABLE_ENTITY, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }

    pub fn retryable(mut self) -> Self {
        self.problem.retryable = true;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::not_found("not_found", format!("{what} not found")),
            StoreError::Conflict(msg) => Self::conflict("conflict", msg),
            StoreError::Invalid(msg) => Self::unprocessable("invalid", msg),
            other => {
                error!(error = %other, "Store failure");
                Self::internal("store_error", other.to_string())
            }
        }
    }
}

impl From<TopologyError> for ApiError {
    fn from(err: TopologyError) -> Self {
        match err {
            TopologyError::UnknownScaleTier { .. } => {
                Self::bad_request("unknown_scale_tier", err.to_string())
            }
            TopologyError::PoolExhausted { .. } => Self::conflict("pool_exhausted", err.to_string()),
            TopologyError::ZoneMissing { .. } | TopologyError::PoolNotConfigured { .. } => {
                Self::unprocessable("zone_not_ready", err.to_string())
            }
            TopologyError::InvalidSizing { .. } => {
                Self::unprocessable("invalid_sizing", err.to_string())
            }
            TopologyError::Store(e) => e.into(),
        }
    }
}

impl From<TriggerError> for ApiError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::AlreadyRunning(_) => {
                Self::conflict("pipeline_running", err.to_string()).retryable()
            }
            TriggerError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_status() {
        let err: ApiError = StoreError::NotFound("unit 'x'".to_string()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.problem.detail, "unit 'x' not found");

        let err: ApiError = StoreError::Poisoned.into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_topology_errors_map_to_status() {
        let err: ApiError = TopologyError::UnknownScaleTier {
            scale: 7,
            known: vec![100],
        }
        .into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.problem.code, "unknown_scale_tier");

        let err: ApiError = TopologyError::PoolExhausted {
            zone: "apps".to_string(),
            pool: "10.0.1.10-10.0.1.12".to_string(),
        }
        .into();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn test_problem_content_type() {
        let response = ApiError::bad_request("bad", "nope").into_response();
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
    }
}
