// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.
//
// Every numeric threshold used by detection and enhancement lives here. The
// defaults are empirical starting points, not contracts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};
use crate::types::{CanvasLayout, CanvasMode, LanguageTag};

/// Top-level settings, loadable from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub detection: DetectionConfig,
    pub enhancement: EnhancementConfig,
    pub batch: BatchSettings,
    pub ocr: OcrSettings,
    pub canvas: CanvasLayout,
}

/// Boundary detector tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Gaussian sigma applied before edge detection.
    pub blur_sigma: f32,
    /// Canny hysteresis thresholds.
    pub canny_low: f32,
    pub canny_high: f32,
    /// Chebyshev radius used to close small gaps in the edge map.
    pub edge_dilation: u8,
    /// Polygon simplification tolerance as a fraction of contour perimeter.
    pub epsilon_ratio: f64,
    /// Minimum quadrilateral area as a fraction of the whole image.
    pub min_area_ratio: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            canny_low: 75.0,
            canny_high: 200.0,
            edge_dilation: 2,
            epsilon_ratio: 0.02,
            min_area_ratio: 0.10,
        }
    }
}

/// Enhancement strengths, applied in the order listed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// Contrast blend factor around the mean luminance (1.0 = unchanged).
    pub contrast: f32,
    /// Sharpness blend factor against a smoothed copy (1.0 = unchanged).
    pub sharpness: f32,
    /// Side length of the square median window (odd).
    pub denoise_kernel_size: u32,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            contrast: 1.5,
            sharpness: 1.5,
            denoise_kernel_size: 3,
        }
    }
}

/// Batch orchestration defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Upper bound on concurrently running items.
    pub concurrency_limit: usize,
    /// Optional wall-clock deadline for a whole batch, in milliseconds.
    pub deadline_ms: Option<u64>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            deadline_ms: None,
        }
    }
}

/// OCR collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub default_language: LanguageTag,
    /// Root directory holding one model subdirectory per language tag.
    pub model_dir: Option<PathBuf>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            default_language: LanguageTag::default(),
            model_dir: None,
        }
    }
}

impl AppConfig {
    /// Read a JSON config file. Sections that are absent keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a stage meaningless.
    pub fn validate(&self) -> Result<()> {
        let d = &self.detection;
        if !(d.epsilon_ratio > 0.0 && d.epsilon_ratio < 1.0) {
            return Err(ProcessingError::Config(format!(
                "detection.epsilon_ratio must be in (0, 1), got {}",
                d.epsilon_ratio
            )));
        }
        if !(d.min_area_ratio > 0.0 && d.min_area_ratio < 1.0) {
            return Err(ProcessingError::Config(format!(
                "detection.min_area_ratio must be in (0, 1), got {}",
                d.min_area_ratio
            )));
        }
        if d.canny_low > d.canny_high {
            return Err(ProcessingError::Config(
                "detection.canny_low must not exceed canny_high".into(),
            ));
        }

        let k = self.enhancement.denoise_kernel_size;
        if k == 0 || k % 2 == 0 {
            return Err(ProcessingError::Config(format!(
                "enhancement.denoise_kernel_size must be odd and non-zero, got {k}"
            )));
        }

        if self.batch.concurrency_limit == 0 {
            return Err(ProcessingError::Config(
                "batch.concurrency_limit must be at least 1".into(),
            ));
        }

        if self.canvas.mode == CanvasMode::Grid && self.canvas.columns == 0 {
            return Err(ProcessingError::Config(
                "canvas.columns must be at least 1 in grid mode".into(),
            ));
        }

        Ok(())
    }
}
