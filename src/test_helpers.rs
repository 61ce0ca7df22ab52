//! Shared test utilities for the optipress test suite.
//!
//! Writes small synthetic images to disk so codec and pipeline tests run
//! without checked-in fixtures. Pixel data is deterministic noise so the
//! encoders have something to compress and outputs are stable across runs.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let jpg = write_jpeg(tmp.path(), "photo.jpg", 64, 48, 95);
//! let png = write_png_rgba(tmp.path(), "logo.png", 32, 32);
//! ```

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use std::path::{Path, PathBuf};

// =========================================================================
// Pixel sources
// =========================================================================

/// Cheap deterministic hash so neighbouring pixels differ.
fn noise(x: u32, y: u32, salt: u32) -> u8 {
    let mut h = x
        .wrapping_mul(374_761_393)
        .wrapping_add(y.wrapping_mul(668_265_263))
        .wrapping_add(salt.wrapping_mul(2_246_822_519));
    h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
    (h >> 24) as u8
}

pub fn noisy_rgb(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            ((x * 4) % 256) as u8 ^ (noise(x, y, 1) >> 3),
            ((y * 4) % 256) as u8 ^ (noise(x, y, 2) >> 3),
            noise(x, y, 3),
        ])
    })
}

pub fn noisy_rgba(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([
            noise(x, y, 1),
            noise(x, y, 2),
            ((x + y) % 256) as u8,
            if x < width / 2 { 255 } else { 128 },
        ])
    })
}

// =========================================================================
// File writers
// =========================================================================

/// Write a JPEG at the given quality. Returns its path.
pub fn write_jpeg(dir: &Path, name: &str, width: u32, height: u32, quality: u8) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    let writer = std::io::BufWriter::new(file);
    DynamicImage::ImageRgb8(noisy_rgb(width, height))
        .write_with_encoder(JpegEncoder::new_with_quality(writer, quality))
        .unwrap();
    path
}

/// Write an opaque RGB PNG with default settings.
pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    noisy_rgb(width, height)
        .save_with_format(&path, ImageFormat::Png)
        .unwrap();
    path
}

/// Write a PNG with a partially transparent alpha channel.
pub fn write_png_rgba(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    noisy_rgba(width, height)
        .save_with_format(&path, ImageFormat::Png)
        .unwrap();
    path
}

/// Write a lossy WebP at the given quality.
pub fn write_webp(dir: &Path, name: &str, width: u32, height: u32, quality: f32) -> PathBuf {
    let path = dir.join(name);
    let rgb = noisy_rgb(width, height);
    let encoded = webp::Encoder::from_rgb(rgb.as_raw(), width, height)
        .encode_simple(false, quality)
        .unwrap();
    std::fs::write(&path, &*encoded).unwrap();
    path
}

/// Decode a file and return its pixel dimensions.
pub fn decoded_dimensions(path: &Path) -> (u32, u32) {
    let img = image::open(path).unwrap();
    (img.width(), img.height())
}

pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}
