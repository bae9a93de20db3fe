use std::time::Duration;

use reqwest::{Client, Response};

use super::error::ProviderError;
use super::types::{RunRequest, RunResponse, StatusResponse};
use crate::config::ProviderConfig;

/// Seam over the inference provider so the submitter and poller can be
/// driven by an in-memory double.
#[allow(async_fn_in_trait)]
pub trait TryOnProvider {
    /// `POST /run`.
    async fn run(&self, req: &RunRequest) -> Result<RunResponse, ProviderError>;

    /// `GET /status/{id}`.
    async fn status(&self, job_id: &str) -> Result<StatusResponse, ProviderError>;
}

pub struct ProviderClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl ProviderClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Self::with_base_url(
            config.api_key.clone(),
            config.base_url.clone(),
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(
        api_key: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            api_key,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn ensure_success(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_ms = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs * 1000);
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(ProviderError::from_status(
            status.as_u16(),
            message,
            retry_after_ms,
        ))
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ProviderError::ParseError(e.to_string()))
    }
}

impl TryOnProvider for ProviderClient {
    async fn run(&self, req: &RunRequest) -> Result<RunResponse, ProviderError> {
        let response = self
            .client
            .post(format!("{}/run", self.base_url))
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await?;

        Self::parse(response).await
    }

    async fn status(&self, job_id: &str) -> Result<StatusResponse, ProviderError> {
        let response = self
            .client
            .get(format!("{}/status/{job_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Self::parse(response).await
    }
}
