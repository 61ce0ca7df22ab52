//! Per-format recompression processors.
//!
//! The registry is a fixed table resolved at compile time: one
//! [`FormatProcessor`] per supported MIME type. A processor knows which files
//! it handles, how to turn an [`OptimizationConfig`] into a numeric codec
//! setting, and delegates pixel work to an [`ImageBackend`].
//!
//! ## Level mapping
//!
//! | Level | JPEG quality | PNG effort | WebP quality |
//! |---|---|---|---|
//! | low | 80 | 7 | `webp_quality` |
//! | medium | 70 | 8 | `webp_quality` |
//! | high | 60 | 9 | `webp_quality` |
//! | other | `jpeg_quality` | `png_compression` | `webp_quality` |
//!
//! JPEG quality *drops* as the level rises, while PNG effort rises. Both mean
//! "compress harder".

use crate::config::{CompressionLevel, OptimizationConfig};
use crate::error::{PipelineError, Result};
use crate::imaging::{Encoding, ImageBackend, PngEffort, Quality, RecompressParams};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatProcessor {
    Jpeg,
    Png,
    Webp,
}

/// Every processor, in lookup order.
pub const REGISTRY: [FormatProcessor; 3] =
    [FormatProcessor::Jpeg, FormatProcessor::Png, FormatProcessor::Webp];

impl FormatProcessor {
    /// Processor handling `path`, by case-insensitive extension.
    pub fn for_path(path: &Path) -> Option<Self> {
        REGISTRY.into_iter().find(|p| p.supports(path))
    }

    pub fn for_mime(mime: &str) -> Option<Self> {
        REGISTRY
            .into_iter()
            .find(|p| p.mime_type().eq_ignore_ascii_case(mime))
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            FormatProcessor::Jpeg => "image/jpeg",
            FormatProcessor::Png => "image/png",
            FormatProcessor::Webp => "image/webp",
        }
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FormatProcessor::Jpeg => &["jpg", "jpeg", "jpe"],
            FormatProcessor::Png => &["png"],
            FormatProcessor::Webp => &["webp"],
        }
    }

    pub fn supports(self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.extensions()
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }

    /// Whether optimizing this format also writes a `.webp` sibling.
    pub fn produces_webp_sibling(self) -> bool {
        matches!(self, FormatProcessor::Jpeg | FormatProcessor::Png)
    }

    /// Codec setting for this format under `config`.
    pub fn encoding(self, config: &OptimizationConfig) -> Encoding {
        match self {
            FormatProcessor::Jpeg => Encoding::Jpeg(Quality::new(jpeg_quality(config))),
            FormatProcessor::Png => Encoding::Png(PngEffort::new(png_effort(config))),
            FormatProcessor::Webp => Encoding::Webp(Quality::new(config.webp_quality)),
        }
    }

    /// Recompress `path` in place.
    pub fn process<B: ImageBackend>(
        self,
        backend: &B,
        path: &Path,
        encoding: Encoding,
    ) -> Result<()> {
        debug!(
            path = %path.display(),
            mime = self.mime_type(),
            parameter = encoding.parameter(),
            "recompressing"
        );
        let params = RecompressParams {
            path: path.to_path_buf(),
            encoding,
        };
        backend
            .recompress(&params)
            .map_err(|e| PipelineError::from_backend(path, e))
    }
}

fn jpeg_quality(config: &OptimizationConfig) -> u32 {
    match config.compression_level {
        CompressionLevel::Low => 80,
        CompressionLevel::Medium => 70,
        CompressionLevel::High => 60,
        CompressionLevel::Custom => config.jpeg_quality,
    }
}

fn png_effort(config: &OptimizationConfig) -> u32 {
    match config.compression_level {
        CompressionLevel::Low => 7,
        CompressionLevel::Medium => 8,
        CompressionLevel::High => 9,
        CompressionLevel::Custom => config.png_compression,
    }
}
