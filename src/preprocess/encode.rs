use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{DynamicImage, ImageError, ImageFormat, Rgb, RgbImage};
use serde::Serialize;

/// Encodings the provider accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodedFormat {
    Jpeg,
    Png,
}

impl EncodedFormat {
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(EncodedFormat::Jpeg),
            ImageFormat::Png => Some(EncodedFormat::Png),
            _ => None,
        }
    }

    /// MIME subtype. `jpeg_token` is provider configuration.
    pub fn mime_token<'a>(&self, jpeg_token: &'a str) -> &'a str {
        match self {
            EncodedFormat::Jpeg => jpeg_token,
            EncodedFormat::Png => "png",
        }
    }
}

impl std::fmt::Display for EncodedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodedFormat::Jpeg => write!(f, "jpeg"),
            EncodedFormat::Png => write!(f, "png"),
        }
    }
}

/// One encoded attempt.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub data: Vec<u8>,
    pub format: EncodedFormat,
    pub quality: Option<u8>,
}

/// Composite transparent pixels onto white. JPEG has no alpha channel.
pub fn flatten(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let alpha = u16::from(px[3]);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    out
}

pub fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Encoded, ImageError> {
    let mut data = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut data, quality.clamp(1, 100));
    DynamicImage::ImageRgb8(rgb.clone()).write_with_encoder(encoder)?;
    Ok(Encoded {
        data,
        format: EncodedFormat::Jpeg,
        quality: Some(quality),
    })
}

pub fn encode_png(image: &DynamicImage) -> Result<Encoded, ImageError> {
    let mut data = Vec::new();
    let encoder = PngEncoder::new_with_quality(
        Cursor::new(&mut data),
        CompressionType::Best,
        PngFilter::Adaptive,
    );
    image.write_with_encoder(encoder)?;
    Ok(Encoded {
        data,
        format: EncodedFormat::Png,
        quality: None,
    })
}

/// Walk the encodings until one fits `budget`.
///
/// Images with alpha try lossless PNG first, then the JPEG ladder over a
/// white-flattened copy. Returns the first fit, else the smallest attempt,
/// else `None` if every encoding failed.
pub fn compress_to_budget(image: &DynamicImage, ladder: &[u8], budget: usize) -> Option<(Encoded, bool)> {
    let mut smallest: Option<Encoded> = None;
    let mut consider = |candidate: Encoded| -> Option<Encoded> {
        if candidate.data.len() <= budget {
            return Some(candidate);
        }
        if smallest
            .as_ref()
            .is_none_or(|s| candidate.data.len() < s.data.len())
        {
            smallest = Some(candidate);
        }
        None
    };

    if image.color().has_alpha() {
        match encode_png(image) {
            Ok(png) => {
                if let Some(fit) = consider(png) {
                    return Some((fit, true));
                }
            }
            Err(e) => tracing::debug!(error = %e, "PNG encode failed"),
        }
    }

    let rgb = flatten(image);
    for &quality in ladder {
        match encode_jpeg(&rgb, quality) {
            Ok(jpeg) => {
                if let Some(fit) = consider(jpeg) {
                    return Some((fit, true));
                }
            }
            Err(e) => tracing::debug!(quality, error = %e, "JPEG encode failed"),
        }
    }

    smallest.map(|s| (s, false))
}
