//! Optimization history for repeated CLI runs.
//!
//! Recompressing an already-optimized JPEG costs a full decode/encode and
//! usually buys nothing, or loses a little more quality. The CLI keeps a small
//! ledger of what it optimized so a second run over the same tree skips files
//! that have not changed since.
//!
//! The library pipeline never reads this file; it is purely a caller-side
//! convenience.
//!
//! ## Keys
//!
//! Entries are keyed by the path as passed on the command line and record:
//!
//! - **`content_hash`**: SHA-256 of the file *after* optimization. If the
//!   file is replaced or edited, the hash no longer matches and it is
//!   optimized again.
//! - **`params_hash`**: SHA-256 of the codec setting and WebP options. Changing
//!   `compression_level` or `webp_quality` re-optimizes everything.
//!
//! ## Storage
//!
//! A JSON file, `.optipress-history.json` in the config root unless
//! `--history` points elsewhere. A missing, corrupt, or outdated file loads as
//! an empty ledger. `--force` ignores it for one run.

use crate::fsutil;
use crate::imaging::Encoding;
use crate::optimize::OptimizationResult;
use crate::types::ImageId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;

/// Default ledger file name within the config root.
pub const HISTORY_FILENAME: &str = ".optipress-history.json";

/// Bump to invalidate every existing ledger when the key computation changes.
const HISTORY_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: ImageId,
    pub content_hash: String,
    pub params_hash: String,
    pub original_size: u64,
    pub optimized_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    pub version: u32,
    pub entries: BTreeMap<String, HistoryEntry>,
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl History {
    pub fn empty() -> Self {
        Self {
            version: HISTORY_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Load a ledger. Returns an empty one if the file doesn't exist or can't
    /// be parsed (version mismatch, corruption).
    pub fn load(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::empty();
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(h) if h.version == HISTORY_VERSION => h,
            _ => Self::empty(),
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fsutil::write_atomic(path, json.as_bytes(), path)
    }

    /// Whether `path` was optimized with `params_hash` and is unchanged since.
    pub fn is_current(&self, path: &Path, content_hash: &str, params_hash: &str) -> bool {
        self.entries
            .get(&key(path))
            .is_some_and(|e| e.content_hash == content_hash && e.params_hash == params_hash)
    }

    pub fn record(
        &mut self,
        result: &OptimizationResult,
        content_hash: String,
        params_hash: String,
    ) {
        self.entries.insert(
            key(&result.path),
            HistoryEntry {
                id: result.id.clone(),
                content_hash,
                params_hash,
                original_size: result.original_size,
                optimized_size: result.optimized_size,
            },
        );
    }

    /// Drop the entry for a reverted file.
    pub fn forget(&mut self, path: &Path) -> Option<HistoryEntry> {
        self.entries.remove(&key(path))
    }

    /// Net bytes saved across every recorded file.
    pub fn total_savings(&self) -> i64 {
        self.entries
            .values()
            .map(|e| e.original_size as i64 - e.optimized_size as i64)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// SHA-256 hash of the settings that determine an optimized file's bytes.
///
/// `webp_quality` is `None` when no sibling is written.
pub fn hash_params(encoding: Encoding, webp_quality: Option<u32>) -> String {
    let mut hasher = Sha256::new();
    let tag: &[u8] = match encoding {
        Encoding::Jpeg(_) => b"jpeg\0",
        Encoding::Png(_) => b"png\0",
        Encoding::Webp(_) => b"webp\0",
    };
    hasher.update(tag);
    hasher.update(encoding.parameter().to_le_bytes());
    match webp_quality {
        Some(q) => {
            hasher.update(b"\x01");
            hasher.update(q.to_le_bytes());
        }
        None => hasher.update(b"\x00"),
    }
    format!("{:x}", hasher.finalize())
}

/// Stable identifier for a path when the caller has none: the first 16 hex
/// digits of its SHA-256.
pub fn path_id(path: &Path) -> ImageId {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let hex = format!("{:x}", digest);
    ImageId::new(&hex[..16])
}

/// Summary of one CLI run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub optimized: u32,
    pub unchanged: u32,
    pub failed: u32,
    pub skipped: u32,
    pub bytes_saved: i64,
}

impl RunStats {
    pub fn total(&self) -> u32 {
        self.optimized + self.unchanged + self.failed + self.skipped
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} optimized, {} unchanged",
            self.optimized, self.unchanged
        )?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        write!(f, " ({} total, {} bytes saved)", self.total(), self.bytes_saved)
    }
}
