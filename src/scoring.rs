//! Client for the secondary image-quality scoring service.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ScoringConfig;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("scoring service returned status {status}: {message}")]
    Service { status: u16, message: String },

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("scoring is disabled")]
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub image: String,
}

/// Score 0-100 with a short justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub score: f64,
    #[serde(default)]
    pub reasoning: String,
}

#[allow(async_fn_in_trait)]
pub trait QualityScorer {
    async fn score(&self, image_url: &str) -> Result<QualityScore, ScoringError>;
}

pub struct ScoringClient {
    client: Client,
    url: String,
    api_key: String,
}

impl ScoringClient {
    pub fn new(config: &ScoringConfig) -> Result<Self, ScoringError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

impl QualityScorer for ScoringClient {
    async fn score(&self, image_url: &str) -> Result<QualityScore, ScoringError> {
        let mut request = self.client.post(&self.url).json(&ScoreRequest {
            image: image_url.to_string(),
        });
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ScoringError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let mut body = response.json::<QualityScore>().await?;
        body.score = body.score.clamp(0.0, 100.0);
        Ok(body)
    }
}

/// `None` when the scoring service is not configured.
impl<S: QualityScorer> QualityScorer for Option<S> {
    async fn score(&self, image_url: &str) -> Result<QualityScore, ScoringError> {
        match self {
            Some(scorer) => scorer.score(image_url).await,
            None => Err(ScoringError::Disabled),
        }
    }
}
