//! HTTP client for API communication.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::CliError;

/// API client for communicating with the control plane.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(api_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build a URL for an endpoint.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CliError> {
        let response = self.client.get(self.url(path)).send().await?;

        self.handle_response(response).await
    }

    /// Make a POST request without a body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, CliError> {
        let response = self.client.post(self.url(path)).send().await?;

        self.handle_response(response).await
    }

    /// Make a PUT request.
    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CliError> {
        let response = self.client.put(self.url(path)).json(body).send().await?;

        self.handle_response(response).await
    }

    /// Handle a successful or error response.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, CliError> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to parse response: {}", e)))
        } else {
            self.handle_error(response).await
        }
    }

    /// Handle an error response.
    async fn handle_error<T>(&self, response: reqwest::Response) -> Result<T, CliError> {
        let status = response.status().as_u16();

        // Errors are application/problem+json
        let problem: ProblemResponse = response.json().await.unwrap_or_else(|_| ProblemResponse {
            code: "unknown".to_string(),
            detail: "Unknown error".to_string(),
        });

        Err(CliError::api(status, problem.code, problem.detail))
    }
}

/// Problem details returned by the control plane.
#[derive(Debug, Deserialize)]
struct ProblemResponse {
    code: String,
    detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_url_building() {
        let client = ApiClient::new("http://localhost:8080/").unwrap();
        assert_eq!(client.url("/v1/units"), "http://localhost:8080/v1/units");
    }

    #[tokio::test]
    async fn test_problem_details_become_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/pipeline/start"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "type": "https://stratum.dev/problems/pipeline_running",
                "title": "Conflict",
                "status": 409,
                "detail": "pipeline job is already running",
                "code": "pipeline_running",
                "retryable": true
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let err = client
            .post_empty::<Value>("/v1/pipeline/start")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::Api { status: 409, ref code, .. } if code == "pipeline_running"
        ));
    }

    #[tokio::test]
    async fn test_get_decodes_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/units"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [], "total": 0})))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let body: Value = client.get("/v1/units").await.unwrap();
        assert_eq!(body["total"], 0);
    }
}
