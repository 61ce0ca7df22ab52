//! Error taxonomy shared by every pipeline operation.
//!
//! Every failure surfaces as a [`PipelineError`] with a machine-readable
//! [`ErrorKind`]. Batch callers branch on the kind: a bad input
//! (`NotFound`, `UnsupportedType`, `CodecFailure`) is skipped and the batch
//! continues, while a broken environment (`CodecUnavailable`, `Io`) stops it.
//!
//! ```text
//! NotFound          source file or backup missing
//! UnsupportedType   no format processor matches the path
//! CodecUnavailable  decoder/encoder not compiled in
//! CodecFailure      decode or encode error on a supported type
//! Io                permission / disk errors on backup or write
//! ```

use crate::imaging::BackendError;
use crate::types::ImageId;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    UnsupportedType,
    CodecUnavailable,
    CodecFailure,
    Io,
}

impl ErrorKind {
    /// `true` when the environment is broken and a batch should stop.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::CodecUnavailable | ErrorKind::Io)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::UnsupportedType => "unsupported_type",
            ErrorKind::CodecUnavailable => "codec_unavailable",
            ErrorKind::CodecFailure => "codec_failure",
            ErrorKind::Io => "io",
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source image not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("No backup found for {} (id {id})", path.display())]
    BackupNotFound { path: PathBuf, id: ImageId },
    #[error("Unsupported image type: {}", .0.display())]
    UnsupportedType(PathBuf),
    #[error("Codec unavailable: {0}")]
    CodecUnavailable(String),
    #[error("Codec failure on {}: {message}", path.display())]
    CodecFailure { path: PathBuf, message: String },
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::SourceNotFound(_) | PipelineError::BackupNotFound { .. } => {
                ErrorKind::NotFound
            }
            PipelineError::UnsupportedType(_) => ErrorKind::UnsupportedType,
            PipelineError::CodecUnavailable(_) => ErrorKind::CodecUnavailable,
            PipelineError::CodecFailure { .. } => ErrorKind::CodecFailure,
            PipelineError::Io { .. } => ErrorKind::Io,
        }
    }

    /// Wrap an IO error, promoting `NotFound` to [`PipelineError::SourceNotFound`].
    pub fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            PipelineError::SourceNotFound(path.to_path_buf())
        } else {
            PipelineError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// Attach the file a backend error occurred on.
    pub fn from_backend(path: &Path, err: BackendError) -> Self {
        match err {
            BackendError::Io(source) => Self::io(path, source),
            BackendError::Unavailable(msg) => PipelineError::CodecUnavailable(msg),
            BackendError::ProcessingFailed(message) => PipelineError::CodecFailure {
                path: path.to_path_buf(),
                message,
            },
        }
    }
}
