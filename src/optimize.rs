//! Optimization orchestrator.
//!
//! Ties the pieces together for one source image:
//!
//! ```text
//! optimize(path, id, config)
//!   1. stat the source                      → SourceNotFound
//!   2. pick a FormatProcessor by extension  → UnsupportedType
//!   3. back up the pristine file (once per (path, id))
//!   4. map config → codec setting
//!   5. recompress in place                  → CodecUnavailable / CodecFailure / Io
//!   6. measure savings
//!   7. optionally write {path}.webp         (failures only logged)
//! ```
//!
//! The processor is chosen *before* the backup so unsupported files never get
//! a stray copy in `.backups/`.
//!
//! ## Concurrency
//!
//! Every call on a given `(path, id)` runs under a per-key mutex owned by the
//! [`Optimizer`], so two callers can never interleave backup and mutation of
//! the same file. Keys are compared as given; pass consistent paths.
//! [`Optimizer::optimize_batch`] fans out over the current rayon pool.

use crate::backup::BackupManager;
use crate::config::OptimizationConfig;
use crate::error::{PipelineError, Result};
use crate::fsutil;
use crate::imaging::{ImageBackend, Quality, RustBackend, WebpParams};
use crate::processors::FormatProcessor;
use crate::types::{ImageId, SourceImage};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Outcome of a successful [`Optimizer::optimize`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub path: PathBuf,
    pub id: ImageId,
    pub mime_type: &'static str,
    /// Numeric setting handed to the codec (quality or PNG effort).
    pub parameter: u32,
    pub original_size: u64,
    pub optimized_size: u64,
    /// `original_size - optimized_size`; negative when recompression grew the file.
    pub savings: i64,
    /// Percentage saved, or `0.0` when nothing was saved.
    pub compression_ratio: f64,
    pub webp_available: bool,
    pub webp_path: Option<PathBuf>,
    pub backup_path: PathBuf,
}

/// Outcome of a successful [`Optimizer::revert`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevertResult {
    pub path: PathBuf,
    pub id: ImageId,
    pub restored_size: u64,
    /// Size before revert minus size after; negative when the original is larger.
    pub freed_space: i64,
    pub webp_removed: bool,
}

/// One unit of work for [`Optimizer::optimize_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub path: PathBuf,
    pub id: ImageId,
}

#[derive(Debug)]
pub enum JobStatus {
    Optimized(OptimizationResult),
    Failed(PipelineError),
    /// Not attempted because an earlier job hit a fatal error.
    Skipped,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub job: BatchJob,
    pub status: JobStatus,
}

/// Percentage of `original` saved. Never negative.
pub fn compression_ratio(original: u64, savings: i64) -> f64 {
    if savings <= 0 || original == 0 {
        0.0
    } else {
        savings as f64 / original as f64 * 100.0
    }
}

fn signed_delta(before: u64, after: u64) -> i64 {
    before as i64 - after as i64
}

type KeyLocks = Mutex<HashMap<(PathBuf, ImageId), Arc<Mutex<()>>>>;

/// Runs optimize / revert / inspect against a codec backend.
pub struct Optimizer<B: ImageBackend = RustBackend> {
    backend: B,
    backups: BackupManager,
    locks: KeyLocks,
}

impl Optimizer<RustBackend> {
    pub fn new() -> Self {
        Self::with_backend(RustBackend::new())
    }
}

impl Default for Optimizer<RustBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ImageBackend> Optimizer<B> {
    /// Use a specific backend (allows testing with mock).
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            backups: BackupManager::new(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Run `f` while holding the mutex for `(path, id)`.
    fn with_key_lock<T>(&self, path: &Path, id: &ImageId, f: impl FnOnce() -> T) -> T {
        let key = (path.to_path_buf(), id.clone());
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.clone()).or_default())
        };

        let result = {
            let _guard = entry.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        drop(entry);

        // Nobody else holds or waits on the key once only the map's clone is left.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(&key).is_some_and(|e| Arc::strong_count(e) == 1) {
            locks.remove(&key);
        }
        result
    }

    /// Recompress one image in place, backing it up first.
    pub fn optimize(
        &self,
        path: &Path,
        id: &ImageId,
        config: &OptimizationConfig,
    ) -> Result<OptimizationResult> {
        require_file(path)?;
        let processor = FormatProcessor::for_path(path)
            .ok_or_else(|| PipelineError::UnsupportedType(path.to_path_buf()))?;

        let result = self.with_key_lock(path, id, || {
            self.optimize_locked(path, id, processor, config)
        });
        match &result {
            Ok(r) => info!(
                path = %path.display(),
                id = %id,
                original = r.original_size,
                optimized = r.optimized_size,
                savings = r.savings,
                webp = r.webp_available,
                "optimized"
            ),
            Err(e) => warn!(
                path = %path.display(),
                id = %id,
                kind = e.kind().as_str(),
                "optimize failed: {e}"
            ),
        }
        result
    }

    fn optimize_locked(
        &self,
        path: &Path,
        id: &ImageId,
        processor: FormatProcessor,
        config: &OptimizationConfig,
    ) -> Result<OptimizationResult> {
        let original_size = fsutil::file_size(path).map_err(|e| PipelineError::io(path, e))?;
        let backup_path = self.backups.create_backup(path, id)?;

        let encoding = processor.encoding(config);
        processor.process(&self.backend, path, encoding)?;

        let optimized_size = fsutil::file_size(path).map_err(|e| PipelineError::io(path, e))?;
        let savings = signed_delta(original_size, optimized_size);

        let webp_path = if config.enable_webp && processor.produces_webp_sibling() {
            self.write_webp_sibling(path, config.webp_quality)
        } else {
            None
        };
        if webp_path.is_none() {
            self.drop_stale_sibling(path);
        }

        Ok(OptimizationResult {
            path: path.to_path_buf(),
            id: id.clone(),
            mime_type: processor.mime_type(),
            parameter: encoding.parameter(),
            original_size,
            optimized_size,
            savings,
            compression_ratio: compression_ratio(original_size, savings),
            webp_available: webp_path.is_some(),
            webp_path,
            backup_path,
        })
    }

    /// Best effort: a failed sibling never fails the optimization.
    fn write_webp_sibling(&self, path: &Path, quality: u32) -> Option<PathBuf> {
        let output = fsutil::webp_sibling(path);
        let params = WebpParams {
            source: path.to_path_buf(),
            output: output.clone(),
            quality: Quality::new(quality),
        };
        match self.backend.convert_to_webp(&params) {
            Ok(()) => Some(output),
            Err(e) => {
                warn!(path = %path.display(), "WebP sibling not written: {e}");
                None
            }
        }
    }

    /// A sibling from an earlier run no longer matches the recompressed file.
    fn drop_stale_sibling(&self, path: &Path) {
        let sibling = fsutil::webp_sibling(path);
        match fsutil::remove_if_exists(&sibling) {
            Ok(true) => debug!(sibling = %sibling.display(), "stale WebP sibling removed"),
            Ok(false) => {}
            Err(e) => warn!(sibling = %sibling.display(), "stale WebP sibling left in place: {e}"),
        }
    }

    /// Restore the backed-up original and drop the WebP sibling.
    pub fn revert(&self, path: &Path, id: &ImageId) -> Result<RevertResult> {
        let result = self.with_key_lock(path, id, || self.revert_locked(path, id));
        match &result {
            Ok(r) => info!(
                path = %path.display(),
                id = %id,
                restored = r.restored_size,
                freed = r.freed_space,
                "reverted"
            ),
            Err(e) => warn!(
                path = %path.display(),
                id = %id,
                kind = e.kind().as_str(),
                "revert failed: {e}"
            ),
        }
        result
    }

    fn revert_locked(&self, path: &Path, id: &ImageId) -> Result<RevertResult> {
        let previous_size = match fsutil::file_size(path) {
            Ok(size) => size,
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(PipelineError::io(path, e)),
        };
        let webp_removed = self.backups.restore(path, id)?;
        let restored_size = fsutil::file_size(path).map_err(|e| PipelineError::io(path, e))?;

        Ok(RevertResult {
            path: path.to_path_buf(),
            id: id.clone(),
            restored_size,
            freed_space: signed_delta(previous_size, restored_size),
            webp_removed,
        })
    }

    /// Describe a source image without touching it.
    pub fn inspect(&self, path: &Path, id: &ImageId) -> Result<SourceImage> {
        let byte_size = require_file(path)?;
        let processor = FormatProcessor::for_path(path)
            .ok_or_else(|| PipelineError::UnsupportedType(path.to_path_buf()))?;
        let dims = self
            .backend
            .identify(path)
            .map_err(|e| PipelineError::from_backend(path, e))?;

        Ok(SourceImage {
            path: path.to_path_buf(),
            id: id.clone(),
            byte_size,
            mime_type: processor.mime_type(),
            width: dims.width,
            height: dims.height,
        })
    }

    /// Optimize many images on the current rayon pool.
    ///
    /// Outcomes come back in job order. Non-fatal failures are reported and the
    /// batch continues; after a fatal one (see
    /// [`ErrorKind::is_fatal`](crate::error::ErrorKind::is_fatal)) jobs that
    /// have not started yet are reported as [`JobStatus::Skipped`].
    pub fn optimize_batch(
        &self,
        jobs: Vec<BatchJob>,
        config: &OptimizationConfig,
    ) -> Vec<BatchOutcome> {
        let abort = AtomicBool::new(false);
        jobs.into_par_iter()
            .map(|job| {
                if abort.load(Ordering::Acquire) {
                    return BatchOutcome {
                        job,
                        status: JobStatus::Skipped,
                    };
                }
                let status = match self.optimize(&job.path, &job.id, config) {
                    Ok(result) => JobStatus::Optimized(result),
                    Err(e) => {
                        if e.kind().is_fatal() {
                            abort.store(true, Ordering::Release);
                        }
                        JobStatus::Failed(e)
                    }
                };
                BatchOutcome { job, status }
            })
            .collect()
    }
}

/// Size of `path`, or `SourceNotFound` when it is missing or not a regular file.
fn require_file(path: &Path) -> Result<u64> {
    let meta = std::fs::metadata(path).map_err(|e| PipelineError::io(path, e))?;
    if !meta.is_file() {
        return Err(PipelineError::SourceNotFound(path.to_path_buf()));
    }
    Ok(meta.len())
}
