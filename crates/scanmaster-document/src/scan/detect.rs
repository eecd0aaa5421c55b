// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document boundary detection: find the outer quadrilateral of a sheet of
// paper inside a photograph.

use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;
use scanmaster_core::config::DetectionConfig;
use scanmaster_core::error::{ProcessingError, Result};
use tracing::{debug, instrument};

use crate::geometry::{Point2D, Quadrilateral, approximate_polygon, order_corners, polygon_area};
use crate::image::RasterImage;

/// Outcome of boundary detection. Never partial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectionResult {
    Found(Quadrilateral),
    NotFound,
}

impl DetectionResult {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn quadrilateral(&self) -> Option<&Quadrilateral> {
        match self {
            Self::Found(quad) => Some(quad),
            Self::NotFound => None,
        }
    }

    /// Turn `NotFound` into [`ProcessingError::GeometryNotFound`] for callers
    /// that want to propagate it with `?`.
    pub fn into_result(self) -> Result<Quadrilateral> {
        match self {
            Self::Found(quad) => Ok(quad),
            Self::NotFound => Err(ProcessingError::GeometryNotFound),
        }
    }
}

/// Locates the document's outer quadrilateral.
///
/// ## Pipeline
///
/// 1. Convert to grayscale
/// 2. Gaussian blur to suppress sensor noise
/// 3. Canny edge detection
/// 4. Dilate the edge map to close pixel gaps at corners
/// 5. Trace outer contours and keep the one enclosing the largest area
/// 6. Simplify it with a tolerance proportional to its perimeter
/// 7. Accept only four vertices forming a simple quadrilateral that covers
///    at least `min_area_ratio` of the image
///
/// Anything else is `NotFound`. Low-contrast photographs legitimately end up
/// there; the caller decides what to do about it.
#[derive(Debug, Clone, Default)]
pub struct BoundaryDetector {
    config: DetectionConfig,
}

impl BoundaryDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn detect(&self, image: &RasterImage) -> DetectionResult {
        self.detect_gray(&image.to_luma8())
    }

    /// Detection on an already-converted luminance image.
    pub fn detect_gray(&self, gray: &GrayImage) -> DetectionResult {
        let (width, height) = gray.dimensions();
        if width < 3 || height < 3 {
            debug!(width, height, "Image too small for boundary detection");
            return DetectionResult::NotFound;
        }

        let blurred = gaussian_blur_f32(gray, self.config.blur_sigma.max(0.1));
        let mut edges = canny(&blurred, self.config.canny_low, self.config.canny_high);
        if self.config.edge_dilation > 0 {
            edges = dilate(&edges, Norm::LInf, self.config.edge_dilation);
        }

        let contours: Vec<Vec<Point2D>> = find_contours::<i32>(&edges)
            .into_iter()
            .filter(|contour| contour.border_type == BorderType::Outer)
            .map(|contour| {
                contour
                    .points
                    .iter()
                    .map(|p| Point2D::new(p.x as f64, p.y as f64))
                    .collect()
            })
            .collect();
        debug!(contour_count = contours.len(), "Outer contours traced");

        self.select_quadrilateral(&contours, width as f64 * height as f64)
    }

    /// Pick the document quadrilateral from traced contours.
    ///
    /// Separate from the raster stages so it can be exercised on hand-built
    /// point lists.
    pub fn select_quadrilateral(&self, contours: &[Vec<Point2D>], image_area: f64) -> DetectionResult {
        let Some(largest) = contours
            .iter()
            .map(|c| (polygon_area(c), c))
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, c)| c)
        else {
            debug!("No contours to choose from");
            return DetectionResult::NotFound;
        };

        let approx = approximate_polygon(largest, self.config.epsilon_ratio);
        if approx.len() != 4 {
            debug!(vertices = approx.len(), "Largest contour is not a quadrilateral");
            return DetectionResult::NotFound;
        }

        let quad = order_corners([approx[0], approx[1], approx[2], approx[3]]);
        if !quad.is_simple() {
            debug!(?quad, "Rejected degenerate quadrilateral");
            return DetectionResult::NotFound;
        }

        let min_area = image_area * self.config.min_area_ratio;
        let area = quad.area();
        if area < min_area {
            debug!(area, min_area, "Quadrilateral too small to be the document");
            return DetectionResult::NotFound;
        }

        debug!(
            top_left = ?quad.top_left,
            top_right = ?quad.top_right,
            bottom_right = ?quad.bottom_right,
            bottom_left = ?quad.bottom_left,
            "Document boundary found"
        );
        DetectionResult::Found(quad)
    }
}
