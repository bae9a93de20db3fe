use thiserror::Error;

use crate::preprocess::ImageRole;
use crate::preprocess::background::BackgroundError;
use crate::provider::ProviderError;
use crate::scoring::ScoringError;

#[derive(Debug, Error)]
pub enum VestirError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing {0} image")]
    MissingImage(ImageRole),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Background removal error: {0}")]
    Background(#[from] BackgroundError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
