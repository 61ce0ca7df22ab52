//! Responsive delivery selection.
//!
//! Given the pre-generated size variants of an image, pick the one to serve
//! for a target display width and describe the rest for the browser:
//!
//! ```text
//! variants: thumb 300w, medium 600w, large 1200w
//!
//! target  450 → medium   (smallest ≥ target)
//! target  600 → medium   (exact match)
//! target 1600 → large    (nothing big enough: largest)
//!
//! srcset: "thumb.jpg 300w, medium.jpg 600w, large.jpg 1200w"
//! sizes:  "(max-width: 450px) 100vw, 450px"
//! ```
//!
//! Loading priority is decided per request by a [`RenderContext`]: the first
//! `lcp_images` selections are Largest Contentful Paint candidates and load
//! eagerly, everything after is lazy.

use serde::Serialize;
use std::fmt;

/// One pre-generated rendition of an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeVariant {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// URL or path the browser fetches.
    pub file: String,
}

impl SizeVariant {
    pub fn new(name: impl Into<String>, width: u32, height: u32, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            file: file.into(),
        }
    }
}

/// Variants ordered by ascending width. Equal widths keep their input order.
fn by_width(variants: &[SizeVariant]) -> Vec<&SizeVariant> {
    let mut sorted: Vec<&SizeVariant> = variants.iter().collect();
    sorted.sort_by_key(|v| v.width);
    sorted
}

/// The smallest variant at least `target_width` wide, else the largest.
///
/// Returns `None` only for an empty slice. Among equal widths the one listed
/// first wins.
pub fn select_variant(target_width: u32, variants: &[SizeVariant]) -> Option<&SizeVariant> {
    let sorted = by_width(variants);
    // Capping the target at the widest variant folds "else the largest" into
    // the same search.
    let widest = sorted.last()?.width;
    let floor = target_width.min(widest);
    sorted.into_iter().find(|v| v.width >= floor)
}

/// One `srcset` candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SrcsetEntry {
    pub file: String,
    pub width: u32,
}

impl fmt::Display for SrcsetEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}w", self.file, self.width)
    }
}

/// Width-descriptor candidates, ascending, one per distinct width.
pub fn build_srcset(variants: &[SizeVariant]) -> Vec<SrcsetEntry> {
    let mut entries: Vec<SrcsetEntry> = Vec::with_capacity(variants.len());
    for v in by_width(variants) {
        if entries.last().is_some_and(|e| e.width == v.width) {
            continue;
        }
        entries.push(SrcsetEntry {
            file: v.file.clone(),
            width: v.width,
        });
    }
    entries
}

/// Render a srcset list as the attribute value.
pub fn srcset_attribute(entries: &[SrcsetEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Two-tier sizing policy: full viewport width on narrow screens, capped at
/// `target_width` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizesHint {
    pub target_width: u32,
}

impl SizesHint {
    /// The standard `sizes` media expression.
    pub fn to_media_expression(self) -> String {
        format!(
            "(max-width: {w}px) 100vw, {w}px",
            w = self.target_width
        )
    }
}

impl fmt::Display for SizesHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_media_expression())
    }
}

pub fn build_sizes_hint(target_width: u32) -> SizesHint {
    SizesHint { target_width }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingPriority {
    /// Eager load, high fetch priority, preload hint.
    High,
    Lazy,
}

impl LoadingPriority {
    /// Value for the `loading` attribute.
    pub fn loading(self) -> &'static str {
        match self {
            LoadingPriority::High => "eager",
            LoadingPriority::Lazy => "lazy",
        }
    }

    /// Value for the `fetchpriority` attribute.
    pub fn fetch_priority(self) -> &'static str {
        match self {
            LoadingPriority::High => "high",
            LoadingPriority::Lazy => "auto",
        }
    }
}

/// Everything a renderer needs for one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponsiveSelection {
    pub selected: SizeVariant,
    pub srcset: Vec<SrcsetEntry>,
    pub sizes: SizesHint,
    pub priority: LoadingPriority,
}

impl ResponsiveSelection {
    pub fn srcset_attribute(&self) -> String {
        srcset_attribute(&self.srcset)
    }
}

/// Per-request render state.
///
/// Create one per page render. Selections are numbered in call order and the
/// first `lcp_images` of them get [`LoadingPriority::High`].
#[derive(Debug)]
pub struct RenderContext {
    lcp_images: usize,
    rendered: usize,
    preloads: Vec<SizeVariant>,
}

impl RenderContext {
    pub fn new(lcp_images: usize) -> Self {
        Self {
            lcp_images,
            rendered: 0,
            preloads: Vec::new(),
        }
    }

    pub fn from_config(config: &crate::config::DeliveryConfig) -> Self {
        Self::new(config.lcp_images)
    }

    /// Select a variant for the next image on the page.
    ///
    /// Returns `None` for an empty variant set; that call does not consume an
    /// LCP slot.
    pub fn select(
        &mut self,
        target_width: u32,
        variants: &[SizeVariant],
    ) -> Option<ResponsiveSelection> {
        let selected = select_variant(target_width, variants)?.clone();
        let priority = if self.rendered < self.lcp_images {
            self.preloads.push(selected.clone());
            LoadingPriority::High
        } else {
            LoadingPriority::Lazy
        };
        self.rendered += 1;

        Some(ResponsiveSelection {
            selected,
            srcset: build_srcset(variants),
            sizes: build_sizes_hint(target_width),
            priority,
        })
    }

    /// Variants selected with high priority so far, in render order.
    pub fn preload_hints(&self) -> &[SizeVariant] {
        &self.preloads
    }

    pub fn rendered(&self) -> usize {
        self.rendered
    }
}
