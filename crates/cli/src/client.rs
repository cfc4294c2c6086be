//! API client for communicating with the engine's HTTP surface

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Error body returned by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Failure reported by the engine itself rather than the transport
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message} ({code}, HTTP {status})")]
    Rejected {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("API error ({status}): {body}")]
    Unexpected { status: StatusCode, body: String },
}

/// API client for the engine
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// GET that accepts any status and decodes the body; the health endpoints
    /// answer 503 with a meaningful payload
    pub async fn get_with_status<T: DeserializeOwned>(&self, path: &str) -> Result<(StatusCode, T)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response.json().await.context("Failed to parse response")?;
        Ok((status, body))
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a POST request without a body
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(parsed) => ApiError::Rejected {
                    status,
                    code: parsed.code,
                    message: parsed.error,
                },
                Err(_) => ApiError::Unexpected { status, body },
            };
            return Err(err.into());
        }

        response.json().await.context("Failed to parse response")
    }
}

/// Response to an accepted ingestion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<engine_lib::FailurePrediction>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_lib::ModelPerformance;

    #[tokio::test]
    async fn test_get_decodes_success_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/performance")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"accuracy":0.9,"precision":0.8,"recall":0.7,"f1":0.75,
                    "last_training":1700000000,"data_points":291,
                    "positive_examples":40,"estimate":true}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let perf: ModelPerformance = client.get("api/v1/performance").await.unwrap();

        mock.assert_async().await;
        assert_eq!(perf.data_points, 291);
        assert!(perf.estimate);
    }

    #[tokio::test]
    async fn test_error_body_becomes_rejected_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/retrain")
            .with_status(409)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error":"a training pass is already in progress","code":"training_in_progress"}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .post_empty::<serde_json::Value>("api/v1/retrain")
            .await
            .unwrap_err();

        let api_err = err.downcast_ref::<ApiError>().unwrap();
        assert!(matches!(
            api_err,
            ApiError::Rejected { status, code, .. }
                if *status == StatusCode::CONFLICT && code == "training_in_progress"
        ));
    }

    #[tokio::test]
    async fn test_non_json_error_is_unexpected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/status")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<serde_json::Value>("api/v1/status")
            .await
            .unwrap_err();

        let api_err = err.downcast_ref::<ApiError>().unwrap();
        assert!(matches!(api_err, ApiError::Unexpected { body, .. } if body == "bad gateway"));
    }

    #[tokio::test]
    async fn test_get_with_status_keeps_unavailable_payload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/readyz")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ready":false,"reason":"Engine not yet initialized"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let (status, body): (StatusCode, engine_lib::ReadinessResponse) =
            client.get_with_status("readyz").await.unwrap();

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.ready);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
