//! Backup and revert of source images.
//!
//! Before the first mutation of a file, a byte-identical copy is placed in a
//! `.backups/` directory next to it:
//!
//! ```text
//! uploads/2024/
//! ├── photo.jpg                        # optimized in place
//! ├── photo.jpg.webp                   # optional sibling
//! └── .backups/
//!     └── 42/
//!         └── photo.jpg                # pristine original for id 42
//! ```
//!
//! The id directory is [`ImageId::path_component`], so every `(path, id)` pair
//! maps to its own file.
//!
//! A backup is keyed by `(path, id)` and written at most once. Later optimize
//! calls reuse it, so the backup always holds the content from before the
//! *first* optimization. Revert copies it back and leaves it in place, so a
//! second revert is a no-op on content.

use crate::error::{PipelineError, Result};
use crate::fsutil;
use crate::types::ImageId;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub use crate::fsutil::webp_sibling;

/// Name of the per-directory backup folder.
pub const BACKUP_DIR: &str = ".backups";

/// Filesystem-backed backup store.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackupManager;

impl BackupManager {
    pub fn new() -> Self {
        Self
    }

    /// Where the backup for `(path, id)` lives, whether or not it exists.
    ///
    /// `{dir}/.backups/{id}/{file_name}`.
    pub fn backup_path(&self, path: &Path, id: &ImageId) -> PathBuf {
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let name = path.file_name().unwrap_or_default();
        dir.join(BACKUP_DIR).join(id.path_component()).join(name)
    }

    pub fn has_backup(&self, path: &Path, id: &ImageId) -> bool {
        self.backup_path(path, id).is_file()
    }

    /// Copy `path` aside unless a backup for `(path, id)` already exists.
    ///
    /// Returns the backup path either way.
    pub fn create_backup(&self, path: &Path, id: &ImageId) -> Result<PathBuf> {
        if !path.is_file() {
            return Err(PipelineError::SourceNotFound(path.to_path_buf()));
        }
        let backup = self.backup_path(path, id);
        if let Some(dir) = backup.parent() {
            fs::create_dir_all(dir).map_err(|e| PipelineError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        let created = fsutil::copy_no_clobber(path, &backup).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::SourceNotFound(path.to_path_buf())
            } else {
                PipelineError::Io {
                    path: backup.clone(),
                    source: e,
                }
            }
        })?;
        if created {
            debug!(source = %path.display(), backup = %backup.display(), "backup created");
        }
        Ok(backup)
    }

    /// Put the backed-up content back at `path` and drop its WebP sibling.
    ///
    /// Returns whether a sibling was removed. The backup itself is kept. Once
    /// the content is swapped the call succeeds; a sibling that cannot be
    /// removed is logged and reported as not removed.
    pub fn restore(&self, path: &Path, id: &ImageId) -> Result<bool> {
        let backup = self.backup_path(path, id);
        let bytes = match fs::read(&backup) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::BackupNotFound {
                    path: path.to_path_buf(),
                    id: id.clone(),
                });
            }
            Err(e) => {
                return Err(PipelineError::Io {
                    path: backup,
                    source: e,
                });
            }
        };

        // Keep the live file's mode if it still exists, else the backup's.
        let mode_from = if path.exists() { path } else { backup.as_path() };
        fsutil::write_atomic(path, &bytes, mode_from).map_err(|e| PipelineError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let sibling = fsutil::webp_sibling(path);
        let removed = fsutil::remove_if_exists(&sibling).unwrap_or_else(|e| {
            warn!(sibling = %sibling.display(), "stale WebP sibling left in place: {e}");
            false
        });
        debug!(path = %path.display(), webp_removed = removed, "backup restored");
        Ok(removed)
    }

    /// Remove the backup for `(path, id)` so the next optimize captures a fresh one.
    ///
    /// Returns whether a backup existed.
    pub fn delete_backup(&self, path: &Path, id: &ImageId) -> Result<bool> {
        let backup = self.backup_path(path, id);
        fsutil::remove_if_exists(&backup).map_err(|e| PipelineError::Io {
            path: backup,
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn id() -> ImageId {
        ImageId::from(42u64)
    }

    // =========================================================================
    // backup_path
    // =========================================================================

    #[test]
    fn backup_path_layout() {
        let m = BackupManager::new();
        assert_eq!(
            m.backup_path(Path::new("/up/2024/photo.jpg"), &id()),
            PathBuf::from("/up/2024/.backups/42/photo.jpg")
        );
    }

    #[test]
    fn backup_path_escapes_id() {
        let m = BackupManager::new();
        assert_eq!(
            m.backup_path(Path::new("/up/a.png"), &ImageId::new("post/1")),
            PathBuf::from("/up/.backups/post%2F1/a.png")
        );
        assert_ne!(
            m.backup_path(Path::new("/up/a.png"), &ImageId::new("post/1")),
            m.backup_path(Path::new("/up/a.png"), &ImageId::new("post_1"))
        );
    }

    #[test]
    fn backup_path_has_no_cross_file_collisions() {
        let m = BackupManager::new();
        assert_ne!(
            m.backup_path(Path::new("/up/a.png"), &ImageId::new("1-2")),
            m.backup_path(Path::new("/up/a-1.png"), &ImageId::new("2"))
        );
    }

    #[test]
    fn backup_path_differs_per_id() {
        let m = BackupManager::new();
        let p = Path::new("/up/a.png");
        assert_ne!(
            m.backup_path(p, &ImageId::from(1u64)),
            m.backup_path(p, &ImageId::from(2u64))
        );
    }

    // =========================================================================
    // create_backup
    // =========================================================================

    #[test]
    fn create_backup_copies_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        fs::write(&path, b"original").unwrap();

        let m = BackupManager::new();
        let backup = m.create_backup(&path, &id()).unwrap();

        assert_eq!(fs::read(&backup).unwrap(), b"original");
        assert!(m.has_backup(&path, &id()));
    }

    #[test]
    fn create_backup_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        fs::write(&path, b"first").unwrap();

        let m = BackupManager::new();
        let first = m.create_backup(&path, &id()).unwrap();
        fs::write(&path, b"second").unwrap();
        let second = m.create_backup(&path, &id()).unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read(&second).unwrap(), b"first");
    }

    #[test]
    fn create_backup_missing_source() {
        let tmp = TempDir::new().unwrap();
        let err = BackupManager::new()
            .create_backup(&tmp.path().join("gone.jpg"), &id())
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound(_)));
    }

    #[test]
    fn create_backup_blocked_dir_is_io() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        fs::write(&path, b"x").unwrap();
        // A plain file where the backup directory should go.
        fs::write(tmp.path().join(BACKUP_DIR), b"not a dir").unwrap();

        let err = BackupManager::new().create_backup(&path, &id()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(fs::read(&path).unwrap(), b"x");
    }

    #[test]
    fn similar_names_and_ids_keep_separate_backups() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.png");
        let a1 = tmp.path().join("a-1.png");
        fs::write(&a, b"first image").unwrap();
        fs::write(&a1, b"second image").unwrap();

        let m = BackupManager::new();
        m.create_backup(&a, &ImageId::new("1-2")).unwrap();
        m.create_backup(&a1, &ImageId::new("2")).unwrap();
        fs::write(&a1, b"optimized").unwrap();

        m.restore(&a1, &ImageId::new("2")).unwrap();
        assert_eq!(fs::read(&a1).unwrap(), b"second image");
        assert_eq!(fs::read(&a).unwrap(), b"first image");
    }

    // =========================================================================
    // restore
    // =========================================================================

    #[test]
    fn restore_without_backup_is_backup_not_found() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        fs::write(&path, b"x").unwrap();

        let err = BackupManager::new().restore(&path, &id()).unwrap_err();
        assert!(matches!(err, PipelineError::BackupNotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn restore_replaces_content_and_removes_sibling() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.png");
        fs::write(&path, b"original").unwrap();

        let m = BackupManager::new();
        m.create_backup(&path, &id()).unwrap();
        fs::write(&path, b"optimized").unwrap();
        let sibling = fsutil::webp_sibling(&path);
        fs::write(&sibling, b"webp").unwrap();

        assert!(m.restore(&path, &id()).unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"original");
        assert!(!sibling.exists());
        // Backup is kept for re-revert.
        assert!(m.has_backup(&path, &id()));
    }

    #[test]
    fn restore_succeeds_when_sibling_cannot_be_removed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.png");
        fs::write(&path, b"original").unwrap();

        let m = BackupManager::new();
        m.create_backup(&path, &id()).unwrap();
        fs::write(&path, b"optimized").unwrap();
        // A non-empty directory in the sibling's place cannot be unlinked.
        let sibling = fsutil::webp_sibling(&path);
        fs::create_dir(&sibling).unwrap();
        fs::write(sibling.join("keep"), b"x").unwrap();

        assert!(!m.restore(&path, &id()).unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"original");
    }

    #[test]
    fn restore_twice_is_harmless() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.png");
        fs::write(&path, b"original").unwrap();

        let m = BackupManager::new();
        m.create_backup(&path, &id()).unwrap();
        m.restore(&path, &id()).unwrap();
        assert!(!m.restore(&path, &id()).unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"original");
    }

    #[test]
    fn restore_recreates_deleted_source() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        fs::write(&path, b"original").unwrap();

        let m = BackupManager::new();
        m.create_backup(&path, &id()).unwrap();
        fs::remove_file(&path).unwrap();

        m.restore(&path, &id()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"original");
    }

    // =========================================================================
    // delete_backup
    // =========================================================================

    #[test]
    fn delete_backup_allows_fresh_capture() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        fs::write(&path, b"v1").unwrap();

        let m = BackupManager::new();
        m.create_backup(&path, &id()).unwrap();
        assert!(m.delete_backup(&path, &id()).unwrap());
        assert!(!m.delete_backup(&path, &id()).unwrap());

        fs::write(&path, b"v2").unwrap();
        let backup = m.create_backup(&path, &id()).unwrap();
        assert_eq!(fs::read(backup).unwrap(), b"v2");
    }
}
