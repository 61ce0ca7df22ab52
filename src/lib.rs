//! # optipress
//!
//! An image optimization and responsive-delivery pipeline for web uploads.
//! JPEG, PNG and WebP files are recompressed in place, a pristine backup is
//! kept for revert, a lossy WebP sibling is optionally written next to
//! JPEG/PNG sources, and at render time the right pre-generated size variant
//! is picked for a target width.
//!
//! # Architecture
//!
//! ```text
//! caller ──► Optimizer ──► BackupManager   (copy aside, once per (path, id))
//!               │
//!               ├────────► FormatProcessor (level → quality / effort)
//!               │               │
//!               │               └──► ImageBackend (decode, encode, atomic write)
//!               │
//!               └────────► ImageBackend::convert_to_webp (best effort)
//!
//! renderer ──► RenderContext ──► select_variant / build_srcset / build_sizes_hint
//! ```
//!
//! The delivery side is independent of the optimization side: it never reads
//! pixels and only works on the variant list it is handed.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`optimize`] | Orchestrator: `optimize`, `revert`, `inspect`, `optimize_batch` |
//! | [`processors`] | Static JPEG / PNG / WebP registry and level-to-setting mapping |
//! | [`backup`] | `.backups/` copies keyed by `(path, id)`, restore, delete |
//! | [`imaging`] | Codec backend trait, pure-Rust implementation, parameter types |
//! | [`delivery`] | Variant selection, srcset, sizes hint, per-request LCP priority |
//! | [`config`] | Hierarchical `optipress.toml` loading, validation, merging |
//! | [`history`] | Caller-side ledger the CLI uses to skip unchanged files |
//! | [`error`] | Public error taxonomy with fatal / non-fatal kinds |
//! | [`types`] | `ImageId`, `SourceImage` |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Backup Before Mutation, Once
//!
//! The first optimize of a `(path, id)` copies the file to
//! `.backups/{id}/{file_name}`. Later calls never overwrite it, so
//! revert always returns the file to its state before the *first*
//! optimization, no matter how many times it was recompressed since.
//!
//! ## Atomic Writes
//!
//! Nothing writes to a user's file directly. New bytes go to a temp file in
//! the same directory and are renamed over the target, so a crash or a
//! concurrent reader never sees a half-written image. The original's
//! permissions are copied onto the replacement.
//!
//! ## Request-Scoped LCP Priority
//!
//! "The first image on the page loads eagerly" is state about one page render,
//! so it lives in a [`delivery::RenderContext`] the renderer creates per
//! request rather than in anything global.

pub mod backup;
pub mod config;
pub mod delivery;
pub mod error;
pub(crate) mod fsutil;
pub mod history;
pub mod imaging;
pub mod optimize;
pub mod output;
pub mod processors;
pub mod types;

pub use error::{ErrorKind, PipelineError};
pub use optimize::{Optimizer, OptimizationResult, RevertResult};

#[cfg(test)]
pub(crate) mod test_helpers;
