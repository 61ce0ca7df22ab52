//! Shared types passed between the pipeline and its callers.
//!
//! These types are serialized to JSON by the CLI and the history ledger, so
//! field names are part of the on-disk format.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Bytes kept verbatim in [`ImageId::path_component`]. `%` and `.` are
/// escaped, so the result is never `.`/`..` and decodes back uniquely.
const ID_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'_').remove(b'-');

/// Logical identifier of an image (e.g. a media-library attachment ID).
///
/// The raw identifier is kept as given. Use [`ImageId::path_component`] where
/// it has to appear in a filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Percent-encoded form safe for a single path segment.
    ///
    /// Distinct ids always give distinct components. The empty id becomes a
    /// lone `%`, which no non-empty id can encode to.
    pub fn path_component(&self) -> String {
        if self.0.is_empty() {
            return "%".to_string();
        }
        utf8_percent_encode(&self.0, ID_ESCAPE).to_string()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for ImageId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ImageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ImageId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// A source image on disk, as seen by [`Optimizer::inspect`](crate::optimize::Optimizer::inspect).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceImage {
    pub path: PathBuf,
    pub id: ImageId,
    pub byte_size: u64,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}
