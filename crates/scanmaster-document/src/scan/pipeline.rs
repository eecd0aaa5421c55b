// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Normalization pipeline: detector, rectifier, and enhancer sequenced with a
// per-stage fallback policy.

use std::sync::atomic::{AtomicBool, Ordering};

use scanmaster_core::config::{AppConfig, DetectionConfig, EnhancementConfig};
use scanmaster_core::error::{ProcessingError, Result};
use scanmaster_core::types::{PipelineOptions, StageStatus};
use tracing::{debug, info, instrument, warn};

use super::detect::{BoundaryDetector, DetectionResult};
use super::enhance::ImageEnhancer;
use super::rectify::PerspectiveRectifier;
use crate::geometry::Quadrilateral;
use crate::image::RasterImage;

/// A point between stages where in-flight work may be abandoned.
///
/// Returning `Err` (normally [`ProcessingError::Cancelled`]) stops the
/// pipeline before the next stage starts. Stages themselves are never
/// interrupted midway.
pub trait Checkpoint: Send + Sync {
    fn check(&self) -> Result<()>;
}

/// Checkpoint for synchronous single-image calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancelled;

impl Checkpoint for NeverCancelled {
    fn check(&self) -> Result<()> {
        Ok(())
    }
}

impl Checkpoint for AtomicBool {
    fn check(&self) -> Result<()> {
        if self.load(Ordering::Acquire) {
            Err(ProcessingError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Result of one pipeline run: the final image plus what each stage did.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub image: RasterImage,
    pub crop: StageStatus,
    pub enhance: StageStatus,
    /// The quadrilateral that was rectified, when cropping applied.
    pub boundary: Option<Quadrilateral>,
}

impl PipelineOutcome {
    pub fn cropped(&self) -> bool {
        self.crop.applied()
    }

    pub fn enhanced(&self) -> bool {
        self.enhance.applied()
    }
}

/// `Start -> AutoCrop? -> Enhance? -> Done`.
///
/// A missing boundary is not an error: the crop stage records `FellBack` and
/// the original image continues to enhancement. Rectification and
/// enhancement failures are returned to the caller.
#[derive(Debug, Clone, Default)]
pub struct NormalizationPipeline {
    detector: BoundaryDetector,
    rectifier: PerspectiveRectifier,
    enhancer: ImageEnhancer,
}

impl NormalizationPipeline {
    pub fn new(detection: DetectionConfig, enhancement: EnhancementConfig) -> Self {
        Self {
            detector: BoundaryDetector::new(detection),
            rectifier: PerspectiveRectifier::new(),
            enhancer: ImageEnhancer::new(enhancement),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.detection, config.enhancement)
    }

    pub fn detector(&self) -> &BoundaryDetector {
        &self.detector
    }

    pub fn enhancer(&self) -> &ImageEnhancer {
        &self.enhancer
    }

    /// Run to completion on the calling thread.
    pub fn run(&self, image: RasterImage, options: PipelineOptions) -> Result<PipelineOutcome> {
        self.run_with_checkpoint(image, options, &NeverCancelled)
    }

    /// Decode `data` and run the pipeline on it.
    pub fn process_bytes(&self, data: &[u8], options: PipelineOptions) -> Result<PipelineOutcome> {
        let image = RasterImage::from_bytes(data)?;
        self.run(image, options)
    }

    /// Run, consulting `checkpoint` before each stage.
    #[instrument(skip_all, fields(
        width = image.width(),
        height = image.height(),
        auto_crop = options.auto_crop,
        enhance = options.enhance,
    ))]
    pub fn run_with_checkpoint(
        &self,
        image: RasterImage,
        options: PipelineOptions,
        checkpoint: &dyn Checkpoint,
    ) -> Result<PipelineOutcome> {
        checkpoint.check()?;

        let (image, crop, boundary) = if options.auto_crop {
            match self.detector.detect(&image) {
                DetectionResult::Found(quad) => {
                    checkpoint.check()?;
                    let rectified = self.rectifier.rectify(&image, &quad)?;
                    (rectified, StageStatus::Applied, Some(quad))
                }
                DetectionResult::NotFound => {
                    warn!("No document boundary found, keeping original image");
                    (image, StageStatus::FellBack, None)
                }
            }
        } else {
            (image, StageStatus::Skipped, None)
        };

        let (image, enhance) = if options.enhance {
            checkpoint.check()?;
            (self.enhancer.enhance(&image)?, StageStatus::Applied)
        } else {
            (image, StageStatus::Skipped)
        };

        debug!(?crop, ?enhance, "Pipeline stages resolved");
        info!(
            out_w = image.width(),
            out_h = image.height(),
            "Normalization complete"
        );
        Ok(PipelineOutcome {
            image,
            crop,
            enhance,
            boundary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};

    fn flat(width: u32, height: u32) -> RasterImage {
        RasterImage::from_dynamic(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            width,
            height,
            Luma([180]),
        )))
    }

    fn sheet() -> RasterImage {
        let mut img = GrayImage::from_pixel(400, 500, Luma([30u8]));
        for y in 60..440 {
            for x in 50..350 {
                img.put_pixel(x, y, Luma([240u8]));
            }
        }
        RasterImage::from_dynamic(DynamicImage::ImageLuma8(img))
    }

    #[test]
    fn missing_boundary_falls_back_to_original() {
        let outcome = NormalizationPipeline::default()
            .run(flat(320, 240), PipelineOptions::default())
            .unwrap();
        assert_eq!(outcome.image.dimensions(), (320, 240));
        assert!(!outcome.cropped());
        assert_eq!(outcome.crop, StageStatus::FellBack);
        assert!(outcome.enhanced());
        assert!(outcome.boundary.is_none());
    }

    #[test]
    fn detected_sheet_is_rectified() {
        let outcome = NormalizationPipeline::default()
            .run(sheet(), PipelineOptions::crop_only())
            .unwrap();
        assert!(outcome.cropped());
        assert_eq!(outcome.enhance, StageStatus::Skipped);
        let (w, h) = outcome.image.dimensions();
        assert!((w as i64 - 300).abs() <= 10, "width {w}");
        assert!((h as i64 - 380).abs() <= 10, "height {h}");
    }

    #[test]
    fn disabled_stages_are_skipped() {
        let outcome = NormalizationPipeline::default()
            .run(sheet(), PipelineOptions::new(false, false))
            .unwrap();
        assert_eq!(outcome.crop, StageStatus::Skipped);
        assert_eq!(outcome.enhance, StageStatus::Skipped);
        assert_eq!(outcome.image.dimensions(), (400, 500));
    }

    #[test]
    fn cancelled_checkpoint_stops_before_work() {
        let cancelled = AtomicBool::new(true);
        let err = NormalizationPipeline::default()
            .run_with_checkpoint(flat(10, 10), PipelineOptions::default(), &cancelled)
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn undecodable_bytes_are_decode_errors() {
        let err = NormalizationPipeline::default()
            .process_bytes(b"not an image", PipelineOptions::default())
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Decode(_)));
    }
}
