// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Canvas composition: lay several pages onto one long strip or grid image.

use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage, imageops};
use scanmaster_core::error::{ProcessingError, Result};
use scanmaster_core::types::{CanvasLayout, CanvasMode};
use tracing::{debug, info, instrument};

use crate::image::RasterImage;

/// JPEG quality for flattened (opaque) canvases.
pub const CANVAS_JPEG_QUALITY: u8 = 95;

/// Column and row count of a grid holding `count` images.
pub fn grid_shape(count: usize, columns: u32) -> Result<(u32, u32)> {
    if columns == 0 {
        return Err(ProcessingError::Canvas("grid layout needs at least one column".into()));
    }
    let count = to_u32(count as u64)?;
    Ok((columns, count.div_ceil(columns)))
}

/// Canvas dimensions for images of the given sizes.
pub fn canvas_size(dims: &[(u32, u32)], layout: &CanvasLayout) -> Result<(u32, u32)> {
    if dims.is_empty() {
        return Err(ProcessingError::Canvas("no images to compose".into()));
    }
    let spacing = layout.spacing as u64;
    let (max_w, max_h) = max_extent(dims);
    match layout.mode {
        CanvasMode::Strip => {
            let heights: u64 = dims.iter().map(|&(_, h)| h as u64).sum();
            let gaps = spacing * (dims.len() as u64 - 1);
            Ok((max_w, to_u32(heights + gaps)?))
        }
        CanvasMode::Grid => {
            let (columns, rows) = grid_shape(dims.len(), layout.columns)?;
            let width = max_w as u64 * columns as u64 + spacing * (columns as u64 - 1);
            let height = max_h as u64 * rows as u64 + spacing * (rows as u64 - 1);
            Ok((to_u32(width)?, to_u32(height)?))
        }
    }
}

/// Top-left offset of each image on the canvas, in input order.
pub fn placements(dims: &[(u32, u32)], layout: &CanvasLayout) -> Result<Vec<(u32, u32)>> {
    // Validates the same preconditions and guarantees the offsets fit.
    canvas_size(dims, layout)?;
    let spacing = layout.spacing as u64;
    let (max_w, max_h) = max_extent(dims);

    match layout.mode {
        CanvasMode::Strip => {
            let mut y = 0u64;
            dims.iter()
                .map(|&(w, h)| -> Result<(u32, u32)> {
                    let at = ((max_w - w) / 2, to_u32(y)?);
                    y += h as u64 + spacing;
                    Ok(at)
                })
                .collect()
        }
        CanvasMode::Grid => {
            let columns = layout.columns as u64;
            let (cell_w, cell_h) = (max_w as u64, max_h as u64);
            dims.iter()
                .enumerate()
                .map(|(i, &(w, h))| -> Result<(u32, u32)> {
                    let col = i as u64 % columns;
                    let row = i as u64 / columns;
                    Ok((
                        to_u32(col * (cell_w + spacing) + (cell_w - w as u64) / 2)?,
                        to_u32(row * (cell_h + spacing) + (cell_h - h as u64) / 2)?,
                    ))
                })
                .collect()
        }
    }
}

fn max_extent(dims: &[(u32, u32)]) -> (u32, u32) {
    dims.iter()
        .fold((0, 0), |(mw, mh), &(w, h)| (mw.max(w), mh.max(h)))
}

fn to_u32(value: u64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ProcessingError::Canvas(format!("canvas dimension {value} is too large")))
}

/// Encoding chosen for a composed canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanvasFormat {
    Png,
    Jpeg,
}

impl CanvasFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// A composed canvas, not yet encoded.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: RasterImage,
    format: CanvasFormat,
}

impl Canvas {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// PNG when the background keeps transparency, JPEG otherwise.
    pub fn format(&self) -> CanvasFormat {
        self.format
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        match self.format {
            CanvasFormat::Png => self.image.to_png_bytes(),
            CanvasFormat::Jpeg => self.image.to_jpeg_bytes(CANVAS_JPEG_QUALITY),
        }
    }

    pub fn into_raster(self) -> RasterImage {
        self.image
    }
}

/// Stateless compositor for a fixed [`CanvasLayout`].
#[derive(Debug, Clone, Default)]
pub struct CanvasCompositor {
    layout: CanvasLayout,
}

impl CanvasCompositor {
    pub fn new(layout: CanvasLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &CanvasLayout {
        &self.layout
    }

    /// Paste `images` onto one canvas in input order.
    ///
    /// Opaque backgrounds produce an RGB canvas (alpha composited onto the
    /// background colour); anything else stays RGBA.
    #[instrument(skip_all, fields(count = images.len(), mode = ?self.layout.mode))]
    pub fn compose(&self, images: &[RasterImage]) -> Result<Canvas> {
        let dims: Vec<(u32, u32)> = images.iter().map(RasterImage::dimensions).collect();
        let (width, height) = canvas_size(&dims, &self.layout)?;
        let offsets = placements(&dims, &self.layout)?;
        debug!(width, height, "Canvas size resolved");

        let mut canvas = RgbaImage::from_pixel(width, height, Rgba(self.layout.background));
        for (image, &(x, y)) in images.iter().zip(&offsets) {
            imageops::overlay(&mut canvas, &image.as_dynamic().to_rgba8(), x as i64, y as i64);
        }

        let (image, format) = if self.layout.background_is_opaque() {
            let flat = flatten(&canvas, self.layout.background);
            (DynamicImage::ImageRgb8(flat), CanvasFormat::Jpeg)
        } else {
            (DynamicImage::ImageRgba8(canvas), CanvasFormat::Png)
        };

        info!(width, height, format = ?format, "Canvas composed");
        Ok(Canvas {
            image: RasterImage::from_dynamic(image),
            format,
        })
    }
}

/// Composite every pixel over the background colour and drop alpha.
fn flatten(canvas: &RgbaImage, background: [u8; 4]) -> RgbImage {
    RgbImage::from_fn(canvas.width(), canvas.height(), |x, y| {
        let Rgba([r, g, b, a]) = *canvas.get_pixel(x, y);
        let alpha = a as u32;
        let mix = |fg: u8, bg: u8| ((fg as u32 * alpha + bg as u32 * (255 - alpha) + 127) / 255) as u8;
        Rgb([mix(r, background[0]), mix(g, background[1]), mix(b, background[2])])
    })
}
