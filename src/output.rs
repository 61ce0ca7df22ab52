//! CLI output formatting for every command.
//!
//! # Entity Display Contract
//!
//! Every file follows a consistent two-level pattern:
//!
//! 1. **Header line**: positional index + file name
//! 2. **Context lines**: indented `Source:`, size deltas, `WebP:`, `Backup:`
//!
//! # Output Format
//!
//! ## Optimize
//!
//! ```text
//! 001 photo.jpg
//!     Source: uploads/2024/photo.jpg
//!     image/jpeg @ 70: 120.0 KB → 80.0 KB (saved 40.0 KB, 33.3%)
//!     WebP: uploads/2024/photo.jpg.webp
//!     Backup: uploads/2024/.backups/42/photo.jpg
//! 002 notes.txt
//!     Source: uploads/notes.txt
//!     Failed (unsupported_type): Unsupported image type: uploads/notes.txt
//!
//! 1 optimized, 0 unchanged, 1 failed (2 total, 40960 bytes saved)
//! ```
//!
//! ## Revert
//!
//! ```text
//! 001 photo.jpg
//!     Source: uploads/2024/photo.jpg
//!     Restored 120.0 KB (freed -40.0 KB), WebP sibling removed
//! ```
//!
//! ## Select
//!
//! ```text
//! Selected: medium 600x400 → medium.jpg
//!     srcset: thumb.jpg 300w, medium.jpg 600w, large.jpg 1200w
//!     sizes: (max-width: 450px) 100vw, 450px
//!     loading: eager, fetchpriority: high
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure and do no I/O.

use crate::delivery::ResponsiveSelection;
use crate::error::PipelineError;
use crate::history::RunStats;
use crate::optimize::{OptimizationResult, RevertResult};
use crate::types::SourceImage;
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Header + `Source:` line shared by every per-file block.
fn file_header(index: usize, path: &Path) -> Vec<String> {
    vec![
        format!("{} {}", format_index(index), file_name(path)),
        format!("{}Source: {}", indent(1), path.display()),
    ]
}

/// Human-readable byte count, binary units, one decimal.
///
/// ```text
/// 512      → 512 B
/// 1536     → 1.5 KB
/// -2097152 → -2.0 MB
/// ```
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    let sign = if bytes < 0 { "-" } else { "" };
    let magnitude = bytes.unsigned_abs();
    if magnitude < 1024 {
        return format!("{sign}{magnitude} B");
    }
    let mut value = magnitude as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{sign}{value:.1} {}", UNITS[unit])
}

// ============================================================================
// Optimize
// ============================================================================

pub fn format_optimize_result(index: usize, result: &OptimizationResult) -> Vec<String> {
    let mut lines = file_header(index, &result.path);
    let delta = if result.savings > 0 {
        format!(
            "saved {}, {:.1}%",
            format_bytes(result.savings),
            result.compression_ratio
        )
    } else {
        format!("grew {}", format_bytes(-result.savings))
    };
    lines.push(format!(
        "{}{} @ {}: {} → {} ({})",
        indent(1),
        result.mime_type,
        result.parameter,
        format_bytes(result.original_size as i64),
        format_bytes(result.optimized_size as i64),
        delta
    ));
    if let Some(webp) = &result.webp_path {
        lines.push(format!("{}WebP: {}", indent(1), webp.display()));
    }
    lines.push(format!("{}Backup: {}", indent(1), result.backup_path.display()));
    lines
}

pub fn format_failure(index: usize, path: &Path, err: &PipelineError) -> Vec<String> {
    let mut lines = file_header(index, path);
    lines.push(format!(
        "{}Failed ({}): {}",
        indent(1),
        err.kind().as_str(),
        err
    ));
    lines
}

/// A file the run did not touch, with the reason.
pub fn format_skipped(index: usize, path: &Path, reason: &str) -> Vec<String> {
    let mut lines = file_header(index, path);
    lines.push(format!("{}Skipped: {}", indent(1), reason));
    lines
}

/// Run totals followed by the history ledger's cumulative savings.
pub fn format_summary(stats: &RunStats, tracked: usize, total_saved: i64) -> Vec<String> {
    vec![
        String::new(),
        stats.to_string(),
        format!(
            "History: {tracked} file(s) tracked, {} saved in total",
            format_bytes(total_saved)
        ),
    ]
}

// ============================================================================
// Revert
// ============================================================================

pub fn format_revert(index: usize, result: &RevertResult) -> Vec<String> {
    let mut lines = file_header(index, &result.path);
    let webp = if result.webp_removed {
        ", WebP sibling removed"
    } else {
        ""
    };
    lines.push(format!(
        "{}Restored {} (freed {}){}",
        indent(1),
        format_bytes(result.restored_size as i64),
        format_bytes(result.freed_space),
        webp
    ));
    lines
}

// ============================================================================
// Inspect
// ============================================================================

pub fn format_inspect(image: &SourceImage) -> Vec<String> {
    vec![
        file_name(&image.path),
        format!("{}Source: {}", indent(1), image.path.display()),
        format!("{}Id: {}", indent(1), image.id),
        format!("{}Type: {}", indent(1), image.mime_type),
        format!("{}Dimensions: {}x{}", indent(1), image.width, image.height),
        format!(
            "{}Size: {} ({} bytes)",
            indent(1),
            format_bytes(image.byte_size as i64),
            image.byte_size
        ),
    ]
}

// ============================================================================
// Select
// ============================================================================

pub fn format_selection(selection: &ResponsiveSelection) -> Vec<String> {
    let v = &selection.selected;
    vec![
        format!("Selected: {} {}x{} → {}", v.name, v.width, v.height, v.file),
        format!("{}srcset: {}", indent(1), selection.srcset_attribute()),
        format!("{}sizes: {}", indent(1), selection.sizes),
        format!(
            "{}loading: {}, fetchpriority: {}",
            indent(1),
            selection.priority.loading(),
            selection.priority.fetch_priority()
        ),
    ]
}

// ============================================================================
// Print wrappers
// ============================================================================

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

pub fn print_optimize_result(index: usize, result: &OptimizationResult) {
    print_lines(&format_optimize_result(index, result));
}

pub fn print_failure(index: usize, path: &Path, err: &PipelineError) {
    print_lines(&format_failure(index, path, err));
}

pub fn print_skipped(index: usize, path: &Path, reason: &str) {
    print_lines(&format_skipped(index, path, reason));
}

pub fn print_summary(stats: &RunStats, tracked: usize, total_saved: i64) {
    print_lines(&format_summary(stats, tracked, total_saved));
}

pub fn print_revert(index: usize, result: &RevertResult) {
    print_lines(&format_revert(index, result));
}

pub fn print_inspect(image: &SourceImage) {
    print_lines(&format_inspect(image));
}

pub fn print_selection(selection: &ResponsiveSelection) {
    print_lines(&format_selection(selection));
}
