//! Optional background isolation for garment images.
//!
//! The removal itself is an external capability behind
//! [`BackgroundRemover`]. Its result is only accepted when
//! [`transparency_score`] clears the configured minimum; otherwise the
//! pipeline keeps the image it already had.

use std::io::Cursor;
use std::time::Duration;

use image::{DynamicImage, GenericImageView, ImageFormat};
use reqwest::Client;
use thiserror::Error;

use crate::config::BackgroundConfig;

const TRANSPARENT_ALPHA: u8 = 16;
const OPAQUE_ALPHA: u8 = 240;

#[derive(Debug, Error)]
pub enum BackgroundError {
    #[error("background service returned status {status}: {message}")]
    Service { status: u16, message: String },

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("could not decode background removal result: {0}")]
    Decode(#[from] image::ImageError),
}

/// External background-removal capability. Takes PNG bytes, returns PNG
/// bytes with an alpha channel.
#[allow(async_fn_in_trait)]
pub trait BackgroundRemover {
    async fn remove(&self, png: Vec<u8>) -> Result<Vec<u8>, BackgroundError>;
}

/// What the background stage did.
#[derive(Debug)]
pub enum BackgroundOutcome {
    Applied { image: DynamicImage, score: u8 },
    SkippedLowQuality { score: u8 },
    SkippedError(String),
}

/// Run the removal and decide whether to keep it.
pub async fn isolate_background<R: BackgroundRemover>(
    remover: &R,
    image: &DynamicImage,
    min_score: u8,
) -> BackgroundOutcome {
    let mut png = Vec::new();
    if let Err(e) = image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png) {
        return BackgroundOutcome::SkippedError(format!("encode: {e}"));
    }

    let removed = match remover.remove(png).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Background removal failed");
            return BackgroundOutcome::SkippedError(e.to_string());
        }
    };

    let decoded = match image::load_from_memory(&removed) {
        Ok(img) => img,
        Err(e) => return BackgroundOutcome::SkippedError(BackgroundError::from(e).to_string()),
    };

    let score = transparency_score(&decoded);
    if score >= min_score {
        tracing::debug!(score, "Background removal accepted");
        BackgroundOutcome::Applied {
            image: decoded,
            score,
        }
    } else {
        tracing::info!(score, min_score, "Background removal discarded");
        BackgroundOutcome::SkippedLowQuality { score }
    }
}

/// Estimate how cleanly the background was removed, 0-100.
///
/// 60 points for a transparent border ring, 40 for crisp alpha (few
/// half-transparent pixels). Images with nothing removed or nothing left
/// score 0.
pub fn transparency_score(image: &DynamicImage) -> u8 {
    if !image.color().has_alpha() {
        return 0;
    }
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return 0;
    }

    let rgba = image.to_rgba8();
    let ring = (width.min(height) / 50).max(1);
    let total = u64::from(width) * u64::from(height);

    let (mut transparent, mut opaque, mut partial) = (0u64, 0u64, 0u64);
    let (mut border, mut border_clear) = (0u64, 0u64);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel[3];
        if alpha < TRANSPARENT_ALPHA {
            transparent += 1;
        } else if alpha > OPAQUE_ALPHA {
            opaque += 1;
        } else {
            partial += 1;
        }

        let on_border = x < ring || y < ring || x >= width - ring || y >= height - ring;
        if on_border {
            border += 1;
            if alpha < TRANSPARENT_ALPHA {
                border_clear += 1;
            }
        }
    }

    let transparent_ratio = transparent as f64 / total as f64;
    let opaque_ratio = opaque as f64 / total as f64;
    if transparent_ratio < 0.05 || opaque_ratio < 0.02 {
        return 0;
    }

    let border_clean = border_clear as f64 / border.max(1) as f64;
    let partial_penalty = (partial as f64 / total as f64 * 5.0).min(1.0);
    let score = 60.0 * border_clean + 40.0 * (1.0 - partial_penalty);
    score.round().clamp(0.0, 100.0) as u8
}

/// HTTP implementation: `POST` PNG bytes, receive PNG bytes.
pub struct BackgroundClient {
    client: Client,
    url: String,
    api_key: String,
}

impl BackgroundClient {
    pub fn new(config: &BackgroundConfig) -> Result<Self, BackgroundError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

impl BackgroundRemover for BackgroundClient {
    async fn remove(&self, png: Vec<u8>) -> Result<Vec<u8>, BackgroundError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("content-type", "image/png")
            .body(png);
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
            return Err(BackgroundError::Service {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// `None` when background isolation is disabled.
impl<R: BackgroundRemover> BackgroundRemover for Option<R> {
    async fn remove(&self, png: Vec<u8>) -> Result<Vec<u8>, BackgroundError> {
        match self {
            Some(remover) => remover.remove(png).await,
            None => Err(BackgroundError::Service {
                status: 0,
                message: "background removal disabled".into(),
            }),
        }
    }
}
