//! Pure Rust codec backend built on the `image` and `webp` crates.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP) | `image::ImageReader` with content sniffing |
//! | Identify | `image::image_dimensions` (header only) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder::new_with_quality` |
//! | Encode → PNG | `image::codecs::png::PngEncoder::new_with_quality` (adaptive filter) |
//! | Encode → WebP (lossy) | `webp::Encoder` (libwebp) |
//!
//! The `image` crate only ships a lossless WebP encoder, so lossy WebP goes
//! through libwebp. All writes are staged in a temp file next to the target
//! and renamed into place.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{Encoding, PngEffort, Quality, RecompressParams, WebpParams};
use crate::fsutil;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{DynamicImage, ImageError, ImageFormat, ImageReader};
use std::path::Path;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn image_format(encoding: Encoding) -> ImageFormat {
    match encoding {
        Encoding::Jpeg(_) => ImageFormat::Jpeg,
        Encoding::Png(_) => ImageFormat::Png,
        Encoding::Webp(_) => ImageFormat::WebP,
    }
}

fn ensure_decoder(format: ImageFormat) -> Result<(), BackendError> {
    if format.reading_enabled() {
        Ok(())
    } else {
        Err(BackendError::Unavailable(format!("{format:?} decoder")))
    }
}

fn ensure_encoder(encoding: Encoding) -> Result<(), BackendError> {
    let format = image_format(encoding);
    // Lossy WebP is encoded by libwebp, not the image crate.
    if matches!(encoding, Encoding::Webp(_)) || format.writing_enabled() {
        Ok(())
    } else {
        Err(BackendError::Unavailable(format!("{format:?} encoder")))
    }
}

/// Load and decode an image from disk, trusting content over extension.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    let reader = ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?;
    if let Some(format) = reader.format() {
        ensure_decoder(format)?;
    }
    reader.decode().map_err(|e| match e {
        ImageError::IoError(io) => BackendError::Io(io),
        other => BackendError::ProcessingFailed(format!(
            "Failed to decode {}: {}",
            path.display(),
            other
        )),
    })
}

/// zlib-style 0-9 effort: 0 stores, 1-9 pick the deflate level.
fn png_compression(effort: PngEffort) -> CompressionType {
    match effort.value() {
        0 => CompressionType::Uncompressed,
        level => CompressionType::Level(level.min(9) as u8),
    }
}

fn encode_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    // JPEG has no alpha channel; grayscale stays single-channel.
    let flattened = match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => None,
        _ => Some(DynamicImage::ImageRgb8(img.to_rgb8())),
    };
    let source = flattened.as_ref().unwrap_or(img);

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
    source
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {}", e)))?;
    Ok(buf)
}

fn encode_png(img: &DynamicImage, effort: PngEffort) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buf, png_compression(effort), PngFilter::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("PNG encode failed: {}", e)))?;
    Ok(buf)
}

fn encode_webp(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let (width, height) = (img.width(), img.height());
    let q = quality.value() as f32;
    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), width, height).encode_simple(false, q)
    } else {
        let rgb = img.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), width, height).encode_simple(false, q)
    };
    encoded
        .map(|mem| mem.to_vec())
        .map_err(|e| BackendError::ProcessingFailed(format!("WebP encode failed: {e:?}")))
}

fn encode(img: &DynamicImage, encoding: Encoding) -> Result<Vec<u8>, BackendError> {
    match encoding {
        Encoding::Jpeg(q) => encode_jpeg(img, q),
        Encoding::Png(effort) => encode_png(img, effort),
        Encoding::Webp(q) => encode_webp(img, q),
    }
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| match e {
            ImageError::IoError(io) => BackendError::Io(io),
            other => {
                BackendError::ProcessingFailed(format!("Failed to read dimensions: {other}"))
            }
        })?;
        Ok(Dimensions { width, height })
    }

    fn recompress(&self, params: &RecompressParams) -> Result<(), BackendError> {
        ensure_encoder(params.encoding)?;
        let img = load_image(&params.path)?;
        let bytes = encode(&img, params.encoding)?;
        fsutil::write_atomic(&params.path, &bytes, &params.path)?;
        Ok(())
    }

    fn convert_to_webp(&self, params: &WebpParams) -> Result<(), BackendError> {
        let img = load_image(&params.source)?;
        let bytes = encode_webp(&img, params.quality)?;
        fsutil::write_atomic(&params.output, &bytes, &params.source)?;
        Ok(())
    }
}
