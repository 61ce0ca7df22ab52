//! Codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations every backend must
//! support: identify, recompress in place, and convert to a WebP sibling.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use the recording
//! `MockBackend` below so orchestration logic runs without encoding pixels.

use super::params::{RecompressParams, WebpParams};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Codec unavailable: {0}")]
    Unavailable(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for codec backends.
///
/// Implementations must never leave a half-written file at the target path:
/// either the new content is fully in place or the old content is untouched.
pub trait ImageBackend: Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode and re-encode a file in place.
    fn recompress(&self, params: &RecompressParams) -> Result<(), BackendError>;

    /// Decode a file and write a lossy WebP copy to a new path.
    fn convert_to_webp(&self, params: &WebpParams) -> Result<(), BackendError>;
}
