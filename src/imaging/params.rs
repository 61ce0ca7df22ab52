//! Parameter types for codec operations.
//!
//! These structs describe *what* to encode, not *how*. They are the interface
//! between the [`processors`](crate::processors) (which decide the numeric
//! setting for a format) and the [`backend`](super::backend) (which does the
//! pixel work). The split lets tests swap in a recording mock without changing
//! processor logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100). Clamped on construction.
//! - [`PngEffort`]: zlib-style compression effort (0–9). Clamped on construction.
//! - [`Encoding`]: Target codec plus its setting.
//! - [`RecompressParams`]: In-place re-encode of one file.
//! - [`WebpParams`]: Write a WebP copy of a file to a new path.

use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

/// PNG compression effort, zlib style (0 = store fast, 9 = smallest).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngEffort(u32);

impl PngEffort {
    pub fn new(value: u32) -> Self {
        Self(value.min(9))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

/// Codec and setting for a re-encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Jpeg(Quality),
    Png(PngEffort),
    Webp(Quality),
}

impl Encoding {
    /// The raw numeric parameter handed to the codec.
    pub fn parameter(self) -> u32 {
        match self {
            Encoding::Jpeg(q) | Encoding::Webp(q) => q.value(),
            Encoding::Png(effort) => effort.value(),
        }
    }
}

/// Re-encode `path` in place.
#[derive(Debug, Clone, PartialEq)]
pub struct RecompressParams {
    pub path: PathBuf,
    pub encoding: Encoding,
}

/// Decode `source` and write it as lossy WebP to `output`.
#[derive(Debug, Clone, PartialEq)]
pub struct WebpParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub quality: Quality,
}
