//! Filesystem helpers for crash-safe writes.
//!
//! Every mutation of a user's file goes through a temp file in the *same*
//! directory followed by a rename, so readers see either the old bytes or the
//! new bytes and never a truncated mix. Temp files are created with `0600`
//! permissions, so the final mode is copied from a reference file before the
//! rename.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Directory to stage a temp file for `path` in.
fn staging_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn stage(path: &Path, bytes: &[u8], mode_from: &Path) -> io::Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(staging_dir(path))?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    if let Ok(meta) = fs::metadata(mode_from) {
        fs::set_permissions(tmp.path(), meta.permissions())?;
    }
    Ok(tmp)
}

/// Atomically replace (or create) `path` with `bytes`.
///
/// Permissions are copied from `mode_from` when it exists.
pub fn write_atomic(path: &Path, bytes: &[u8], mode_from: &Path) -> io::Result<()> {
    let tmp = stage(path, bytes, mode_from)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Atomically create `dest` as a copy of `source`, unless `dest` exists.
///
/// Returns `Ok(true)` when this call wrote the file and `Ok(false)` when it was
/// already there (including when a concurrent writer won the race).
pub fn copy_no_clobber(source: &Path, dest: &Path) -> io::Result<bool> {
    if dest.exists() {
        return Ok(false);
    }
    let bytes = fs::read(source)?;
    let tmp = stage(dest, &bytes, source)?;
    match tmp.persist_noclobber(dest) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error),
    }
}

/// `image.jpg` → `image.jpg.webp`.
pub fn webp_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".webp");
    PathBuf::from(name)
}

/// Remove a file, treating "already gone" as success. Returns whether it existed.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// File size in bytes.
pub fn file_size(path: &Path) -> io::Result<u64> {
    fs::metadata(path).map(|m| m.len())
}
