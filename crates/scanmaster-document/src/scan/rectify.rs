// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective rectification: flatten a detected quadrilateral into an
// axis-aligned rectangle.

use image::{DynamicImage, ImageBuffer, Luma, LumaA, Pixel, Rgb, Rgba};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use scanmaster_core::error::{ProcessingError, Result};
use tracing::{debug, info, instrument};

use crate::geometry::{Homography, Quadrilateral, order_corners};
use crate::image::{PixelFormat, RasterImage};

/// Warps the interior of a quadrilateral onto a rectangle.
///
/// Destination pixels whose pre-image falls outside the source are filled
/// with the background colour (white by default, matching paper).
#[derive(Debug, Clone)]
pub struct PerspectiveRectifier {
    background: [u8; 4],
}

impl Default for PerspectiveRectifier {
    fn default() -> Self {
        Self {
            background: [255, 255, 255, 255],
        }
    }
}

impl PerspectiveRectifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_background(background: [u8; 4]) -> Self {
        Self { background }
    }

    /// Output size for a quadrilateral.
    ///
    /// Width is the longer of the top and bottom edges, height the longer of
    /// the left and right edges, each rounded and at least one pixel.
    pub fn target_size(quad: &Quadrilateral) -> (u32, u32) {
        let q = order_corners(quad.corners());
        let width = q
            .bottom_right
            .distance(&q.bottom_left)
            .max(q.top_right.distance(&q.top_left));
        let height = q
            .top_right
            .distance(&q.bottom_right)
            .max(q.top_left.distance(&q.bottom_left));
        (to_extent(width), to_extent(height))
    }

    /// Produce the flattened view of `quad`'s interior.
    ///
    /// The pixel format of the input is preserved; extended formats are
    /// resampled as RGBA8.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn rectify(&self, image: &RasterImage, quad: &Quadrilateral) -> Result<RasterImage> {
        let ordered = order_corners(quad.corners());
        if !ordered.is_simple() {
            return Err(ProcessingError::Rectification(format!(
                "degenerate quadrilateral {ordered:?}"
            )));
        }

        let (out_w, out_h) = Self::target_size(&ordered);
        let homography = Homography::quad_to_rect(&ordered, out_w as f64, out_h as f64)
            .ok_or_else(|| {
                ProcessingError::Rectification("quadrilateral-to-rectangle system is singular".into())
            })?;
        let projection = Projection::from_matrix(homography.to_f32()).ok_or_else(|| {
            ProcessingError::Rectification("projective transform is not invertible".into())
        })?;
        debug!(out_w, out_h, matrix = ?homography.matrix(), "Homography solved");

        let [r, g, b, a] = self.background;
        let dynamic = image.as_dynamic();
        let output = match image.pixel_format() {
            PixelFormat::Gray => DynamicImage::ImageLuma8(warp(
                &dynamic.to_luma8(),
                &projection,
                Luma([luma_of(r, g, b)]),
                out_w,
                out_h,
            )),
            PixelFormat::GrayAlpha => DynamicImage::ImageLumaA8(warp(
                &dynamic.to_luma_alpha8(),
                &projection,
                LumaA([luma_of(r, g, b), a]),
                out_w,
                out_h,
            )),
            PixelFormat::Rgb => DynamicImage::ImageRgb8(warp(
                &dynamic.to_rgb8(),
                &projection,
                Rgb([r, g, b]),
                out_w,
                out_h,
            )),
            PixelFormat::Rgba | PixelFormat::Extended => DynamicImage::ImageRgba8(warp(
                &dynamic.to_rgba8(),
                &projection,
                Rgba([r, g, b, a]),
                out_w,
                out_h,
            )),
        };

        info!(out_w, out_h, "Perspective rectification applied");
        Ok(RasterImage::from_dynamic(output))
    }
}

fn warp<P>(
    input: &ImageBuffer<P, Vec<u8>>,
    projection: &Projection,
    background: P,
    out_w: u32,
    out_h: u32,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    let mut output = ImageBuffer::from_pixel(out_w, out_h, background);
    warp_into(input, projection, Interpolation::Bilinear, background, &mut output);
    output
}

fn to_extent(length: f64) -> u32 {
    if length.is_finite() {
        (length.round() as u32).max(1)
    } else {
        1
    }
}

/// Rec. 601 luma, as used by `image` for grayscale conversion.
fn luma_of(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8
}
