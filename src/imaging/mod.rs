//! Codec layer: pure Rust, plus libwebp for lossy WebP.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Recompress JPEG** | `JpegEncoder::new_with_quality` |
//! | **Recompress PNG** | `PngEncoder::new_with_quality` |
//! | **Recompress / convert WebP** | `webp::Encoder::encode_simple` |
//!
//! The module is split into:
//! - **Parameters**: Data structures describing codec operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use params::{Encoding, PngEffort, Quality, RecompressParams, WebpParams};
pub use rust_backend::RustBackend;
