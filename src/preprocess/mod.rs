//! Best-effort image preparation before submission.
//!
//! [`ImagePreprocessor::process`] runs six stages in order. Each stage that
//! fails falls back to the previous stage's output and is recorded in
//! [`PreprocessedImage::modifications`]; only empty or undecodable input is
//! a hard error.
//!
//! 1. orientation/metadata normalization
//! 2. background isolation (garments only, when enabled)
//! 3. dimension clamping
//! 4. byte-budget compression
//! 5. format normalization
//! 6. final validation

pub mod background;
pub mod encode;
pub mod input;

use std::io::Cursor;

use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageReader};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::config::{BackgroundConfig, ImageConfig};
use background::{BackgroundOutcome, BackgroundRemover, isolate_background};
use encode::{EncodedFormat, compress_to_budget, encode_jpeg, encode_png, flatten};
pub use input::{ImageInput, parse_input, to_data_url};

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("image is empty")]
    Empty,

    #[error("image could not be decoded: {0}")]
    Unparseable(String),
}

/// Which side of the try-on an image is. Decides limits and stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageRole {
    Avatar,
    Garment,
}

impl std::fmt::Display for ImageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageRole::Avatar => write!(f, "avatar"),
            ImageRole::Garment => write!(f, "garment"),
        }
    }
}

/// Pipeline stage names, for stage events and skipped stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Orientation,
    Background,
    Resize,
    Compression,
    Format,
    Validation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Orientation => "orientation",
            Stage::Background => "background",
            Stage::Resize => "resize",
            Stage::Compression => "compression",
            Stage::Format => "format",
            Stage::Validation => "validation",
        };
        f.write_str(name)
    }
}

/// One entry in the modification log.
#[derive(Debug, Clone, PartialEq)]
pub enum Modification {
    OrientationNormalized,
    BackgroundRemoved { score: u8 },
    BackgroundSkippedLowQuality { score: u8 },
    BackgroundSkippedError(String),
    Resized { width: u32, height: u32 },
    Compressed { format: EncodedFormat, quality: Option<u8>, bytes: usize },
    FormatNormalized { to: EncodedFormat },
    StageFailed { stage: Stage, reason: String },
    OverBudget { bytes: usize, budget: usize },
    PassthroughUrl,
}

impl Modification {
    /// Marks entries explaining why the output may not meet its limits.
    pub fn is_degradation(&self) -> bool {
        matches!(
            self,
            Modification::StageFailed { .. } | Modification::OverBudget { .. }
        )
    }

    /// Entries whose pixel changes live in the encoded output.
    fn reworks_pixels(&self) -> bool {
        matches!(
            self,
            Modification::OrientationNormalized
                | Modification::BackgroundRemoved { .. }
                | Modification::Resized { .. }
        )
    }
}

impl std::fmt::Display for Modification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modification::OrientationNormalized => write!(f, "orientation-normalized"),
            Modification::BackgroundRemoved { score } => write!(f, "background-removed({score})"),
            Modification::BackgroundSkippedLowQuality { score } => {
                write!(f, "background-skipped-low-quality({score})")
            }
            Modification::BackgroundSkippedError(reason) => {
                write!(f, "background-skipped-error({reason})")
            }
            Modification::Resized { width, height } => write!(f, "resized({width}x{height})"),
            Modification::Compressed {
                format,
                quality: Some(q),
                bytes,
            } => write!(f, "compressed({format}@{q},{bytes}b)"),
            Modification::Compressed { format, bytes, .. } => {
                write!(f, "compressed({format},{bytes}b)")
            }
            Modification::FormatNormalized { to } => write!(f, "format-normalized({to})"),
            Modification::StageFailed { stage, reason } => {
                write!(f, "degraded:{stage}-failed({reason})")
            }
            Modification::OverBudget { bytes, budget } => {
                write!(f, "degraded:over-budget({bytes}>{budget})")
            }
            Modification::PassthroughUrl => write!(f, "passthrough-url"),
        }
    }
}

impl Serialize for Modification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

/// Provider-ready image. Consumed once by the submitter.
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    pub data: Vec<u8>,
    pub format: EncodedFormat,
    pub modifications: Vec<Modification>,
    pub original_size: ImageSize,
    pub final_size: ImageSize,
}

impl PreprocessedImage {
    pub fn is_degraded(&self) -> bool {
        self.modifications.iter().any(Modification::is_degradation)
    }

    pub fn to_data_url(&self, jpeg_token: &str) -> String {
        to_data_url(&self.data, self.format.mime_token(jpeg_token))
    }
}

/// Either a processed inline image or a remote URL left for the provider.
#[derive(Debug, Clone)]
pub enum PreparedImage {
    Inline(PreprocessedImage),
    Remote(String),
}

impl PreparedImage {
    /// The value placed in the provider request.
    pub fn to_provider_string(&self, jpeg_token: &str) -> String {
        match self {
            PreparedImage::Inline(img) => img.to_data_url(jpeg_token),
            PreparedImage::Remote(url) => url.clone(),
        }
    }

    pub fn modifications(&self) -> Vec<Modification> {
        match self {
            PreparedImage::Inline(img) => img.modifications.clone(),
            PreparedImage::Remote(_) => vec![Modification::PassthroughUrl],
        }
    }
}

/// Limits for one role, resolved from [`ImageConfig`].
#[derive(Debug, Clone, Copy)]
struct Limits {
    max_width: u32,
    max_height: u32,
    max_bytes: usize,
}

pub struct ImagePreprocessor<R> {
    images: ImageConfig,
    background: BackgroundConfig,
    remover: R,
}

impl<R: BackgroundRemover> ImagePreprocessor<R> {
    pub fn new(images: ImageConfig, background: BackgroundConfig, remover: R) -> Self {
        Self {
            images,
            background,
            remover,
        }
    }

    fn limits(&self, role: ImageRole) -> Limits {
        match role {
            ImageRole::Avatar => Limits {
                max_width: self.images.avatar_max_width,
                max_height: self.images.avatar_max_height,
                max_bytes: self.images.avatar_max_bytes,
            },
            ImageRole::Garment => Limits {
                max_width: self.images.garment_max_edge,
                max_height: self.images.garment_max_edge,
                max_bytes: self.images.garment_max_bytes,
            },
        }
    }

    /// Parse a caller-supplied image and process it if it is inline.
    pub async fn prepare(&self, raw: &str, role: ImageRole) -> Result<PreparedImage, PreprocessError> {
        match parse_input(raw)? {
            ImageInput::Remote(url) => {
                tracing::debug!(%role, "Remote image passed through");
                Ok(PreparedImage::Remote(url))
            }
            ImageInput::Inline(bytes) => Ok(PreparedImage::Inline(self.process(&bytes, role).await?)),
        }
    }

    pub async fn process(&self, raw: &[u8], role: ImageRole) -> Result<PreprocessedImage, PreprocessError> {
        if raw.is_empty() {
            return Err(PreprocessError::Empty);
        }
        let limits = self.limits(role);
        let mut modifications = Vec::new();

        // 1. Orientation. A decode failure here is the only hard failure.
        let decoded = decode_upright(raw)?;
        let mut working = decoded.image;
        let (width, height) = working.dimensions();
        let original_size = ImageSize {
            width,
            height,
            bytes: raw.len(),
        };
        record(
            &mut modifications,
            role,
            Stage::Orientation,
            decoded.oriented.then_some(Modification::OrientationNormalized),
        );

        // 2. Background isolation.
        let removal = if role == ImageRole::Garment && self.background.enabled {
            Some(
                match isolate_background(&self.remover, &working, self.background.min_score).await {
                    BackgroundOutcome::Applied { image, score } => {
                        working = image;
                        Modification::BackgroundRemoved { score }
                    }
                    BackgroundOutcome::SkippedLowQuality { score } => {
                        Modification::BackgroundSkippedLowQuality { score }
                    }
                    BackgroundOutcome::SkippedError(reason) => Modification::BackgroundSkippedError(reason),
                },
            )
        } else {
            None
        };
        record(&mut modifications, role, Stage::Background, removal);

        // 3. Dimension clamping.
        let (w, h) = working.dimensions();
        let resize = if w > limits.max_width || h > limits.max_height {
            let resized = working.resize(limits.max_width, limits.max_height, FilterType::Lanczos3);
            let (rw, rh) = resized.dimensions();
            if rw == 0 || rh == 0 {
                Some(Modification::StageFailed {
                    stage: Stage::Resize,
                    reason: "degenerate target size".into(),
                })
            } else {
                working = resized;
                Some(Modification::Resized {
                    width: rw,
                    height: rh,
                })
            }
        } else {
            None
        };
        record(&mut modifications, role, Stage::Resize, resize);

        // 4. Compression. When the ladder yields nothing the processed pixels
        // go out as lossless PNG; the caller's bytes are the last resort.
        let ladder = &self.images.quality_ladder;
        let mut shipped_raw = false;
        let (mut data, sniffed) = match compress_to_budget(&working, ladder, limits.max_bytes) {
            Some((encoded, _)) => {
                record(
                    &mut modifications,
                    role,
                    Stage::Compression,
                    Some(Modification::Compressed {
                        format: encoded.format,
                        quality: encoded.quality,
                        bytes: encoded.data.len(),
                    }),
                );
                (encoded.data, Some(encoded.format))
            }
            None => {
                record(
                    &mut modifications,
                    role,
                    Stage::Compression,
                    Some(Modification::StageFailed {
                        stage: Stage::Compression,
                        reason: "quality ladder produced no encoding".into(),
                    }),
                );
                match encode_png(&working) {
                    Ok(png) => {
                        record(
                            &mut modifications,
                            role,
                            Stage::Compression,
                            Some(Modification::Compressed {
                                format: EncodedFormat::Png,
                                quality: None,
                                bytes: png.data.len(),
                            }),
                        );
                        (png.data, Some(EncodedFormat::Png))
                    }
                    Err(e) => {
                        tracing::warn!(%role, error = %e, "Lossless fallback failed, keeping caller bytes");
                        shipped_raw = true;
                        (raw.to_vec(), sniff(raw))
                    }
                }
            }
        };

        // 5. Format normalization.
        let format = match sniffed {
            Some(f) => {
                record(&mut modifications, role, Stage::Format, None);
                f
            }
            None => {
                let quality = ladder.first().copied().unwrap_or(90);
                match encode_jpeg(&flatten(&working), quality) {
                    Ok(encoded) => {
                        data = encoded.data;
                        shipped_raw = false;
                        record(
                            &mut modifications,
                            role,
                            Stage::Format,
                            Some(Modification::FormatNormalized {
                                to: EncodedFormat::Jpeg,
                            }),
                        );
                        EncodedFormat::Jpeg
                    }
                    Err(e) => {
                        return Err(PreprocessError::Unparseable(format!(
                            "cannot produce a provider format: {e}"
                        )));
                    }
                }
            }
        };

        // Caller bytes carry none of the pixel stages.
        let (fw, fh) = if shipped_raw {
            modifications.retain(|m| !m.reworks_pixels());
            decoded.raw_dimensions
        } else {
            working.dimensions()
        };

        // 6. Validation.
        if data.is_empty() {
            return Err(PreprocessError::Empty);
        }
        if image::guess_format(&data).is_err() {
            return Err(PreprocessError::Unparseable("output header unrecognized".into()));
        }
        let over_budget = (data.len() > limits.max_bytes).then(|| Modification::OverBudget {
            bytes: data.len(),
            budget: limits.max_bytes,
        });
        record(&mut modifications, role, Stage::Validation, over_budget);

        let final_size = ImageSize {
            width: fw,
            height: fh,
            bytes: data.len(),
        };
        tracing::debug!(
            %role,
            original_bytes = original_size.bytes,
            final_bytes = final_size.bytes,
            stages = modifications.len(),
            "Image preprocessed",
        );

        Ok(PreprocessedImage {
            data,
            format,
            modifications,
            original_size,
            final_size,
        })
    }
}

/// Log one stage outcome and append its modification, if any.
fn record(log: &mut Vec<Modification>, role: ImageRole, stage: Stage, modification: Option<Modification>) {
    match &modification {
        Some(m) if m.is_degradation() => {
            tracing::warn!(%role, %stage, outcome = %m, "Preprocessing stage degraded");
        }
        Some(m) => tracing::debug!(%role, %stage, outcome = %m, "Preprocessing stage applied"),
        None => tracing::debug!(%role, %stage, "Preprocessing stage left image unchanged"),
    }
    log.extend(modification);
}

fn sniff(bytes: &[u8]) -> Option<EncodedFormat> {
    image::guess_format(bytes)
        .ok()
        .and_then(EncodedFormat::from_image_format)
}

struct Decoded {
    image: DynamicImage,
    /// Whether EXIF orientation moved pixels.
    oriented: bool,
    /// Dimensions as stored, before orientation.
    raw_dimensions: (u32, u32),
}

/// Decode and apply EXIF orientation.
fn decode_upright(raw: &[u8]) -> Result<Decoded, PreprocessError> {
    let reader = ImageReader::new(Cursor::new(raw))
        .with_guessed_format()
        .map_err(|e| PreprocessError::Unparseable(e.to_string()))?;
    let mut decoder = reader
        .into_decoder()
        .map_err(|e| PreprocessError::Unparseable(e.to_string()))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image =
        DynamicImage::from_decoder(decoder).map_err(|e| PreprocessError::Unparseable(e.to_string()))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(PreprocessError::Empty);
    }
    let raw_dimensions = image.dimensions();
    let oriented = orientation != Orientation::NoTransforms;
    if oriented {
        image.apply_orientation(orientation);
    }
    Ok(Decoded {
        image,
        oriented,
        raw_dimensions,
    })
}
