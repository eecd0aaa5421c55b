// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Owned raster image: decode, raw construction, resize-to-fit, and encoding.
// Every processing stage takes a `RasterImage` and returns a new one.

use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat};
use scanmaster_core::error::{ProcessingError, Result};
use tracing::{debug, info, instrument};

/// Pixel layout of a [`RasterImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
    /// 16-bit or floating point samples. Decodable, but not accepted by the
    /// enhancer.
    Extended,
}

impl PixelFormat {
    /// Channels per pixel for the 8-bit formats.
    pub fn channel_count(&self) -> Option<u8> {
        match self {
            Self::Gray => Some(1),
            Self::GrayAlpha => Some(2),
            Self::Rgb => Some(3),
            Self::Rgba => Some(4),
            Self::Extended => None,
        }
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, Self::GrayAlpha | Self::Rgba)
    }
}

/// An owned, immutable pixel buffer.
///
/// Transformations consume `self` (or borrow it) and hand back a new
/// `RasterImage`; nothing mutates a buffer a caller can still observe.
#[derive(Debug, Clone)]
pub struct RasterImage {
    image: DynamicImage,
}

impl RasterImage {
    // -- Construction ---------------------------------------------------------

    /// Decode raw encoded bytes (JPEG, PNG, WebP, ...).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(ProcessingError::Decode("input is empty".into()));
        }
        let image = image::load_from_memory(data)
            .map_err(|err| ProcessingError::Decode(err.to_string()))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(ProcessingError::Decode("decoded image has no pixels".into()));
        }
        debug!(
            width = image.width(),
            height = image.height(),
            "Image decoded from bytes"
        );
        Ok(Self { image })
    }

    /// Build an image from a plain 8-bit sample buffer laid out row-major.
    pub fn from_raw(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ProcessingError::Decode(format!(
                "raw image must be at least 1x1, got {width}x{height}"
            )));
        }
        let channels = format.channel_count().ok_or_else(|| {
            ProcessingError::Decode("raw buffers must use an 8-bit pixel format".into())
        })?;
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(ProcessingError::Decode(format!(
                "raw buffer holds {} bytes, expected {expected} for {width}x{height}x{channels}",
                data.len()
            )));
        }

        let length_error = || ProcessingError::Decode("raw buffer length mismatch".into());
        let image = match format {
            PixelFormat::Gray => DynamicImage::ImageLuma8(
                ImageBuffer::from_raw(width, height, data).ok_or_else(length_error)?,
            ),
            PixelFormat::GrayAlpha => DynamicImage::ImageLumaA8(
                ImageBuffer::from_raw(width, height, data).ok_or_else(length_error)?,
            ),
            PixelFormat::Rgb => DynamicImage::ImageRgb8(
                ImageBuffer::from_raw(width, height, data).ok_or_else(length_error)?,
            ),
            PixelFormat::Rgba => DynamicImage::ImageRgba8(
                ImageBuffer::from_raw(width, height, data).ok_or_else(length_error)?,
            ),
            PixelFormat::Extended => return Err(length_error()),
        };
        Ok(Self { image })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    pub fn pixel_format(&self) -> PixelFormat {
        match self.image {
            DynamicImage::ImageLuma8(_) => PixelFormat::Gray,
            DynamicImage::ImageLumaA8(_) => PixelFormat::GrayAlpha,
            DynamicImage::ImageRgb8(_) => PixelFormat::Rgb,
            DynamicImage::ImageRgba8(_) => PixelFormat::Rgba,
            _ => PixelFormat::Extended,
        }
    }

    pub fn channel_count(&self) -> u8 {
        self.image.color().channel_count()
    }

    /// Borrow the underlying `DynamicImage`.
    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    /// Consume the raster and return the underlying `DynamicImage`.
    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    /// 8-bit luminance copy, the input of boundary detection.
    pub fn to_luma8(&self) -> GrayImage {
        self.image.to_luma8()
    }

    // -- Transformations ------------------------------------------------------

    /// Downscale so that neither side exceeds `max_side`, preserving aspect
    /// ratio. Images already within bounds are returned unchanged.
    #[instrument(skip(self), fields(width = self.width(), height = self.height()))]
    pub fn fit_within(self, max_side: u32) -> Self {
        let max_side = max_side.max(1);
        if self.width() <= max_side && self.height() <= max_side {
            return self;
        }
        let resized = self
            .image
            .resize(max_side, max_side, image::imageops::FilterType::Lanczos3);
        info!(
            new_w = resized.width(),
            new_h = resized.height(),
            "Image resized to fit"
        );
        Self { image: resized }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        encode_to_format(&self.image, ImageFormat::Png)
    }

    /// Encode as JPEG bytes with the given quality (1-100). Alpha is dropped.
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let rgb = self.image.to_rgb8();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        rgb.write_with_encoder(encoder)
            .map_err(|err| ProcessingError::Encode(format!("JPEG encoding failed: {err}")))?;
        Ok(buffer)
    }
}

impl From<DynamicImage> for RasterImage {
    fn from(image: DynamicImage) -> Self {
        Self::from_dynamic(image)
    }
}

/// Encode a `DynamicImage` into the specified format, returning the raw bytes.
fn encode_to_format(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image
        .write_to(&mut cursor, format)
        .map_err(|err| ProcessingError::Encode(err.to_string()))?;
    Ok(buffer)
}
