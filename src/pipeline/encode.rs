//! Image encoding: section raster → bytes small enough for the service.
//!
//! Sections go out as lossless PNG whenever possible: text crispness matters
//! far more than payload size for recognition accuracy. Only when a PNG
//! exceeds the transport limit (5 MB by default) is it recompressed, first by
//! lowering JPEG quality and only then by shrinking the raster, because
//! downscaling destroys fine strokes sooner than JPEG artefacts do.

use crate::error::ScribeError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::io::Cursor;
use tracing::debug;

/// JPEG quality of the first recompression attempt.
const START_QUALITY: u8 = 90;

/// Quality decrement between attempts.
const QUALITY_STEP: u8 = 10;

/// Scale factor applied per dimension-reduction step.
const SHRINK_FACTOR: f64 = 0.75;

/// Below this side length we stop shrinking and send what we have.
const MIN_SIDE: u32 = 32;

/// An encoded section ready for a recognition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

impl SectionImage {
    /// Standard base64 of the encoded bytes, as expected in JSON bodies.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Size limits applied before transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeLimits {
    /// Largest payload sent as-is, in bytes.
    pub max_bytes: usize,
    /// Longest side allowed once recompression kicks in.
    pub max_dimension: u32,
    /// Lowest JPEG quality tried before shrinking the raster.
    pub min_quality: u8,
}

impl Default for EncodeLimits {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
            max_dimension: 4000,
            min_quality: 30,
        }
    }
}

/// Encode a section raster, recompressing if the PNG is over the limit.
pub fn encode_section(img: &DynamicImage, limits: &EncodeLimits) -> Result<SectionImage, ScribeError> {
    let png = encode_png(img)?;
    if png.len() <= limits.max_bytes {
        debug!("Encoded section → {} bytes PNG", png.len());
        let (width, height) = img.dimensions();
        return Ok(SectionImage {
            bytes: png,
            mime_type: "image/png",
            width,
            height,
        });
    }

    debug!(
        "Section PNG is {:.2} MB, over the {:.2} MB limit; recompressing",
        png.len() as f64 / 1_048_576.0,
        limits.max_bytes as f64 / 1_048_576.0
    );
    drop(png);
    compress(img, limits)
}

fn compress(img: &DynamicImage, limits: &EncodeLimits) -> Result<SectionImage, ScribeError> {
    let mut current = cap_dimensions(img, limits.max_dimension);
    let min_quality = limits.min_quality.clamp(1, START_QUALITY);

    // Quality first, at full size.
    let mut quality = START_QUALITY;
    loop {
        let bytes = encode_jpeg(&current, quality)?;
        if bytes.len() <= limits.max_bytes {
            return Ok(jpeg_image(bytes, &current, quality));
        }
        if quality <= min_quality {
            break;
        }
        quality = quality.saturating_sub(QUALITY_STEP).max(min_quality);
    }

    // Then dimensions, at the floor quality.
    loop {
        let (w, h) = current.dimensions();
        let nw = ((w as f64) * SHRINK_FACTOR) as u32;
        let nh = ((h as f64) * SHRINK_FACTOR) as u32;
        if nw < MIN_SIDE || nh < MIN_SIDE {
            let bytes = encode_jpeg(&current, min_quality)?;
            debug!(
                "Section still {} bytes at {}x{}; sending smallest attempt",
                bytes.len(),
                w,
                h
            );
            return Ok(jpeg_image(bytes, &current, min_quality));
        }
        current = current.resize_exact(nw, nh, FilterType::Triangle);
        let bytes = encode_jpeg(&current, min_quality)?;
        if bytes.len() <= limits.max_bytes {
            return Ok(jpeg_image(bytes, &current, min_quality));
        }
    }
}

fn cap_dimensions(img: &DynamicImage, max_dimension: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w.max(h) <= max_dimension {
        return img.clone();
    }
    img.resize(max_dimension, max_dimension, FilterType::Triangle)
}

fn jpeg_image(bytes: Vec<u8>, img: &DynamicImage, quality: u8) -> SectionImage {
    let (width, height) = img.dimensions();
    debug!(
        "Recompressed section → {} bytes JPEG q{} at {}x{}",
        bytes.len(),
        quality,
        width,
        height
    );
    SectionImage {
        bytes,
        mime_type: "image/jpeg",
        width,
        height,
    }
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ScribeError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| ScribeError::ImageEncoding(e.to_string()))?;
    Ok(buf)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ScribeError> {
    let mut buf = Vec::new();
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .map_err(|e| ScribeError::ImageEncoding(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    /// Deterministic pseudo-random noise: incompressible enough to blow a
    /// small byte budget.
    fn noise(width: u32, height: u32) -> DynamicImage {
        let mut state: u32 = 0x1234_5678;
        let img = RgbImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let b = state.to_be_bytes();
            Rgb([b[0], b[1], b[2]])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn small_section_stays_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let encoded = encode_section(&img, &EncodeLimits::default()).expect("encode");
        assert_eq!(encoded.mime_type, "image/png");
        assert_eq!((encoded.width, encoded.height), (10, 10));
        assert_eq!(&encoded.bytes[1..4], b"PNG");
        let decoded = STANDARD.decode(encoded.to_base64()).expect("valid base64");
        assert_eq!(decoded, encoded.bytes);
    }

    #[test]
    fn oversized_section_is_recompressed_under_limit() {
        let img = noise(200, 200);
        let limits = EncodeLimits {
            max_bytes: 20_000,
            max_dimension: 4000,
            min_quality: 30,
        };
        let encoded = encode_section(&img, &limits).expect("encode");
        assert_eq!(encoded.mime_type, "image/jpeg");
        assert!(encoded.bytes.len() <= limits.max_bytes, "{} bytes", encoded.bytes.len());
        let decoded = image::load_from_memory(&encoded.bytes).expect("valid jpeg");
        assert_eq!(decoded.dimensions(), (encoded.width, encoded.height));
    }

    #[test]
    fn recompression_caps_longest_side() {
        let img = noise(300, 100);
        let limits = EncodeLimits {
            max_bytes: 1_000,
            max_dimension: 150,
            min_quality: 30,
        };
        let encoded = encode_section(&img, &limits).expect("encode");
        assert_eq!(encoded.mime_type, "image/jpeg");
        assert!(encoded.width <= 150);
        assert!(encoded.height <= 50);
    }
}
