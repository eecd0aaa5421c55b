// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the ScanMaster document engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one batch submission. Used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Language tag selecting an OCR engine (`"ch"`, `"en"`, `"ch_en"`, ...).
///
/// Tags are normalised to lowercase so that `"EN"` and `"en"` share one
/// cached engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageTag(String);

impl LanguageTag {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(tag.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LanguageTag {
    fn default() -> Self {
        Self::new("ch")
    }
}

impl std::fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LanguageTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Which stages the normalization pipeline should attempt for one image.
///
/// There are no hidden defaults: callers always state both flags. The
/// `Default` impl mirrors the usual upload path (both enabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Run contrast, sharpening, and denoise.
    pub enhance: bool,
    /// Detect the document boundary and rectify it.
    pub auto_crop: bool,
}

impl PipelineOptions {
    pub fn new(enhance: bool, auto_crop: bool) -> Self {
        Self { enhance, auto_crop }
    }

    /// Enhancement only, no boundary detection.
    pub fn enhance_only() -> Self {
        Self::new(true, false)
    }

    /// Boundary detection and rectification only.
    pub fn crop_only() -> Self {
        Self::new(false, true)
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new(true, true)
    }
}

/// What happened to one optional pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not requested by the options.
    Skipped,
    /// Requested and applied.
    Applied,
    /// Requested, but the stage passed its input through unchanged.
    FellBack,
}

impl StageStatus {
    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// How images are arranged on a composite canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanvasMode {
    /// Vertical stack, one image per row, horizontally centred.
    Strip,
    /// Fixed number of columns, each image centred in a uniform cell.
    Grid,
}

/// Layout configuration for the canvas compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasLayout {
    pub mode: CanvasMode,
    /// Gap between neighbouring images, in pixels.
    pub spacing: u32,
    /// Column count, only consulted in `Grid` mode.
    pub columns: u32,
    /// Background colour as RGBA.
    pub background: [u8; 4],
}

impl CanvasLayout {
    pub fn strip(spacing: u32) -> Self {
        Self {
            mode: CanvasMode::Strip,
            spacing,
            ..Self::default()
        }
    }

    pub fn grid(columns: u32, spacing: u32) -> Self {
        Self {
            mode: CanvasMode::Grid,
            spacing,
            columns,
            ..Self::default()
        }
    }

    pub fn with_background(mut self, rgba: [u8; 4]) -> Self {
        self.background = rgba;
        self
    }

    /// A background is opaque only when its alpha channel is saturated.
    pub fn background_is_opaque(&self) -> bool {
        self.background[3] == u8::MAX
    }
}

impl Default for CanvasLayout {
    fn default() -> Self {
        Self {
            mode: CanvasMode::Strip,
            spacing: 20,
            columns: 2,
            background: [255, 255, 255, 0],
        }
    }
}
