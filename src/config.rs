//! Pipeline configuration module.
//!
//! Handles loading, validating, and merging `optipress.toml` files.
//! Configuration is hierarchical: stock defaults are overridden by config files
//! at any level of the directory tree (root → subdirectory → deeper).
//!
//! ## Config File Location
//!
//! Place `optipress.toml` in the config root and/or any directory below it:
//!
//! ```text
//! uploads/
//! ├── optipress.toml           # Root config (overrides stock defaults)
//! ├── 2024/
//! │   └── ...
//! └── logos/
//!     ├── optipress.toml       # Overrides root for everything under logos/
//!     └── ...
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [optimization]
//! compression_level = "medium"  # low | medium | high (anything else: fallbacks)
//! enable_webp = true            # Write a .webp sibling next to JPEG/PNG files
//! webp_quality = 60             # WebP quality (1-100)
//! jpeg_quality = 82             # JPEG quality when the level is unrecognized
//! png_compression = 6           # PNG effort (0-9) when the level is unrecognized
//!
//! [delivery]
//! lcp_images = 1                # Leading images per page loaded eagerly
//!
//! [processing]
//! max_processes = 4             # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [optimization]
//! compression_level = "high"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// File name looked up at every level of the cascade.
pub const CONFIG_FILE: &str = "optipress.toml";

/// Upper bound for `delivery.lcp_images`.
pub const MAX_LCP_IMAGES: usize = 16;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Pipeline settings loaded from `optipress.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Recompression and WebP sibling settings.
    pub optimization: OptimizationConfig,
    /// Render-time delivery settings.
    pub delivery: DeliveryConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Settings {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let opt = &self.optimization;
        if !(1..=100).contains(&opt.webp_quality) {
            return Err(ConfigError::Validation(
                "optimization.webp_quality must be 1-100".into(),
            ));
        }
        if !(1..=100).contains(&opt.jpeg_quality) {
            return Err(ConfigError::Validation(
                "optimization.jpeg_quality must be 1-100".into(),
            ));
        }
        if opt.png_compression > 9 {
            return Err(ConfigError::Validation(
                "optimization.png_compression must be 0-9".into(),
            ));
        }
        if self.delivery.lcp_images > MAX_LCP_IMAGES {
            return Err(ConfigError::Validation(format!(
                "delivery.lcp_images must be at most {MAX_LCP_IMAGES}"
            )));
        }
        Ok(())
    }
}

/// Named compression level.
///
/// Matching is case-insensitive. Any string other than `low`, `medium` or
/// `high` becomes [`CompressionLevel::Custom`], which makes every processor use
/// its numeric fallback setting instead of a level mapping. TOML and the CLI
/// share the [`FromStr`] parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Low,
    #[default]
    Medium,
    High,
    Custom,
}

impl CompressionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "medium",
            CompressionLevel::High => "high",
            CompressionLevel::Custom => "custom",
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionLevel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "low" => CompressionLevel::Low,
            "medium" => CompressionLevel::Medium,
            "high" => CompressionLevel::High,
            _ => CompressionLevel::Custom,
        })
    }
}

impl<'de> Deserialize<'de> for CompressionLevel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let Ok(level) = raw.parse::<CompressionLevel>();
        Ok(level)
    }
}

/// Recompression settings handed to every `optimize` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizationConfig {
    pub compression_level: CompressionLevel,
    /// Write a `.webp` sibling next to JPEG/PNG sources.
    pub enable_webp: bool,
    pub webp_quality: u32,
    /// JPEG quality used when `compression_level` is unrecognized.
    pub jpeg_quality: u32,
    /// PNG effort used when `compression_level` is unrecognized.
    pub png_compression: u32,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            compression_level: CompressionLevel::Medium,
            enable_webp: true,
            webp_quality: 60,
            jpeg_quality: 82,
            png_compression: 6,
        }
    }
}

/// Render-time delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeliveryConfig {
    /// How many leading selections per render get high loading priority.
    pub lcp_images: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self { lcp_images: 1 }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel optimization workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(Settings::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `optipress.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the directory has no config file.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<Settings, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Settings = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `optipress.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<Settings, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Directories whose config applies to `dir`, outermost first.
///
/// `dir` outside `root` only sees the root config.
fn cascade_dirs(root: &Path, dir: &Path) -> Vec<PathBuf> {
    let mut dirs = vec![root.to_path_buf()];
    if let Ok(rel) = dir.strip_prefix(root) {
        let mut current = root.to_path_buf();
        for component in rel.components() {
            current.push(component);
            dirs.push(current.clone());
        }
    }
    dirs
}

/// Resolve the settings that apply to files in `dir`.
///
/// Every `optipress.toml` from `root` down to `dir` is layered on top of the
/// stock defaults, deeper files winning. Only the merged result is validated,
/// so an intermediate file may rely on a parent for the rest of its section.
///
/// Both paths are canonicalized when they exist, so `uploads/a` and
/// `./uploads/a` resolve the same way.
pub fn resolve_config_at(root: &Path, dir: &Path) -> Result<Settings, ConfigError> {
    let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    let mut merged = stock_defaults_value();
    for level in cascade_dirs(&root, &dir) {
        if let Some(overlay) = load_raw_config(&level)? {
            merged = merge_toml(merged, overlay);
        }
    }
    resolve_config(merged, None)
}

/// Returns a fully-commented stock `optipress.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# optipress Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Config files can be placed at any level of the directory tree:
#   uploads/optipress.toml        -> root (overrides stock defaults)
#   uploads/logos/optipress.toml  -> overrides root for uploads/logos/**
#
# Each level only needs the keys it wants to override.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Optimization
# ---------------------------------------------------------------------------
[optimization]
# Named level: "low", "medium" or "high".
#   JPEG quality: low = 80, medium = 70, high = 60
#   PNG effort:   low = 7,  medium = 8,  high = 9
# Any other value makes each format use its fallback setting below.
compression_level = "medium"

# Write a lossy .webp sibling next to every optimized JPEG/PNG.
enable_webp = true

# WebP quality (1 = worst, 100 = best). Used for WebP re-encodes and siblings.
webp_quality = 60

# JPEG quality used when compression_level is not a known level.
jpeg_quality = 82

# PNG compression effort (0 = fastest, 9 = smallest) used when
# compression_level is not a known level.
png_compression = 6

# ---------------------------------------------------------------------------
# Responsive delivery
# ---------------------------------------------------------------------------
[delivery]
# How many leading images per page are treated as Largest Contentful Paint
# candidates (loaded eagerly with high fetch priority and a preload hint).
lcp_images = 1

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel optimization workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_matches_documented_values() {
        let config = Settings::default();
        assert_eq!(config.optimization.compression_level, CompressionLevel::Medium);
        assert!(config.optimization.enable_webp);
        assert_eq!(config.optimization.webp_quality, 60);
        assert_eq!(config.optimization.jpeg_quality, 82);
        assert_eq!(config.optimization.png_compression, 6);
        assert_eq!(config.delivery.lcp_images, 1);
        assert_eq!(config.processing.max_processes, None);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[optimization]
compression_level = "high"
"#;
        let config: Settings = toml::from_str(toml).unwrap();
        assert_eq!(config.optimization.compression_level, CompressionLevel::High);
        // Unspecified values should be defaults
        assert_eq!(config.optimization.webp_quality, 60);
        assert_eq!(config.delivery.lcp_images, 1);
    }

    // =========================================================================
    // CompressionLevel tests
    // =========================================================================

    #[test]
    fn unknown_level_parses_as_custom() {
        let toml = r#"
[optimization]
compression_level = "ultra"
"#;
        let config: Settings = toml::from_str(toml).unwrap();
        assert_eq!(config.optimization.compression_level, CompressionLevel::Custom);
    }

    #[test]
    fn toml_level_is_case_insensitive_like_cli() {
        let toml = r#"
[optimization]
compression_level = "HIGH"
"#;
        let config: Settings = toml::from_str(toml).unwrap();
        assert_eq!(config.optimization.compression_level, CompressionLevel::High);
        assert_eq!(
            config.optimization.compression_level,
            "HIGH".parse::<CompressionLevel>().unwrap()
        );
    }

    #[test]
    fn level_from_str_is_case_insensitive() {
        assert_eq!("HIGH".parse::<CompressionLevel>().unwrap(), CompressionLevel::High);
        assert_eq!(" low ".parse::<CompressionLevel>().unwrap(), CompressionLevel::Low);
        assert_eq!("lossy".parse::<CompressionLevel>().unwrap(), CompressionLevel::Custom);
    }

    #[test]
    fn level_display_matches_toml_spelling() {
        assert_eq!(CompressionLevel::Medium.to_string(), "medium");
        assert_eq!(CompressionLevel::Custom.to_string(), "custom");
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config, Settings::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
[optimization]
enable_webp = false
webp_quality = 75
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert!(!config.optimization.enable_webp);
        assert_eq!(config.optimization.webp_quality, 75);
        assert_eq!(config.optimization.jpeg_quality, 82);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "this is not valid toml [[[").unwrap();

        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    // =========================================================================
    // Processing config tests
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig {
            max_processes: None,
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn effective_threads_zero_means_one() {
        let config = ProcessingConfig {
            max_processes: Some(0),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str(r#"quality = 90"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"quality = 70"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("quality").unwrap().as_integer(), Some(70));
    }

    #[test]
    fn merge_toml_preserves_base_keys() {
        let base: toml::Value = toml::from_str(
            r#"
[optimization]
webp_quality = 60
jpeg_quality = 82
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[optimization]
webp_quality = 80
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let opt = merged.get("optimization").unwrap();
        assert_eq!(opt.get("webp_quality").unwrap().as_integer(), Some(80));
        assert_eq!(opt.get("jpeg_quality").unwrap().as_integer(), Some(82));
    }

    // =========================================================================
    // Unknown key rejection
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let toml = r#"
[optimization]
jpeg_qualty = 80
"#;
        let result: Result<Settings, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_section_rejected() {
        let toml = r#"
[thumbnails]
aspect_ratio = [4, 5]
"#;
        let result: Result<Settings, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn validate_quality_boundaries() {
        let mut config = Settings::default();
        config.optimization.webp_quality = 100;
        config.optimization.jpeg_quality = 1;
        assert!(config.validate().is_ok());

        config.optimization.webp_quality = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        config.optimization.webp_quality = 60;
        config.optimization.jpeg_quality = 101;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_png_compression_too_high() {
        let mut config = Settings::default();
        config.optimization.png_compression = 10;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("png_compression"));
    }

    #[test]
    fn validate_lcp_images_cap() {
        let mut config = Settings::default();
        config.delivery.lcp_images = MAX_LCP_IMAGES;
        assert!(config.validate().is_ok());
        config.delivery.lcp_images = MAX_LCP_IMAGES + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
[optimization]
webp_quality = 200
"#,
        )
        .unwrap();

        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // Cascade tests
    // =========================================================================

    #[test]
    fn cascade_deeper_file_wins() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let logos = root.join("logos");
        let nested = logos.join("2024");
        fs::create_dir_all(&nested).unwrap();

        fs::write(
            root.join(CONFIG_FILE),
            r#"
[optimization]
compression_level = "low"
webp_quality = 70
"#,
        )
        .unwrap();
        fs::write(
            logos.join(CONFIG_FILE),
            r#"
[optimization]
compression_level = "high"
"#,
        )
        .unwrap();

        let at_root = resolve_config_at(root, root).unwrap();
        assert_eq!(at_root.optimization.compression_level, CompressionLevel::Low);

        let at_nested = resolve_config_at(root, &nested).unwrap();
        assert_eq!(at_nested.optimization.compression_level, CompressionLevel::High);
        // Inherited from root
        assert_eq!(at_nested.optimization.webp_quality, 70);
    }

    #[test]
    fn cascade_outside_root_uses_root_only() {
        let root = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        fs::write(
            root.path().join(CONFIG_FILE),
            "[optimization]\nenable_webp = false\n",
        )
        .unwrap();
        fs::write(
            elsewhere.path().join(CONFIG_FILE),
            "[optimization]\nwebp_quality = 99\n",
        )
        .unwrap();

        let config = resolve_config_at(root.path(), elsewhere.path()).unwrap();
        assert!(!config.optimization.enable_webp);
        assert_eq!(config.optimization.webp_quality, 60);
    }

    // =========================================================================
    // resolve_config / load_raw_config tests
    // =========================================================================

    #[test]
    fn load_raw_config_returns_none_when_no_file() {
        let tmp = TempDir::new().unwrap();
        assert!(load_raw_config(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn resolve_config_with_overlay() {
        let overlay: toml::Value = toml::from_str(
            r#"
[delivery]
lcp_images = 3
"#,
        )
        .unwrap();
        let config = resolve_config(stock_defaults_value(), Some(overlay)).unwrap();
        assert_eq!(config.delivery.lcp_images, 3);
        assert_eq!(config.optimization, OptimizationConfig::default());
    }

    // =========================================================================
    // stock_config_toml tests
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: Settings = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, Settings::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        assert!(content.contains("[optimization]"));
        assert!(content.contains("[delivery]"));
        assert!(content.contains("[processing]"));
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value();
        assert!(val.is_table());
        assert!(val.get("optimization").is_some());
        assert!(val.get("delivery").is_some());
        assert!(val.get("processing").is_some());
    }
}
