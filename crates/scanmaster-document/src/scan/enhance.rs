// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan enhancement: contrast boost, sharpening, and median denoise applied
// to a rectified page.

use image::{DynamicImage, ImageBuffer, Pixel};
use imageproc::filter::median_filter;
use scanmaster_core::config::EnhancementConfig;
use scanmaster_core::error::{ProcessingError, Result};
use tracing::{debug, info, instrument};

use crate::image::RasterImage;

/// Weight of the centre tap in the smoothing kernel used by [`sharpen`].
/// Every other tap of the 3x3 window weighs 1, so the kernel sums to 13.
const SMOOTH_CENTRE_WEIGHT: f32 = 5.0;
const SMOOTH_KERNEL_SUM: f32 = 13.0;

/// Applies the fixed enhancement sequence to 8-bit images.
///
/// The order is always contrast, then sharpening, then median denoise. Alpha
/// channels are left alone by the first two steps.
#[derive(Debug, Clone, Default)]
pub struct ImageEnhancer {
    config: EnhancementConfig,
}

impl ImageEnhancer {
    pub fn new(config: EnhancementConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnhancementConfig {
        &self.config
    }

    /// Run the enhancement pass.
    ///
    /// # Errors
    ///
    /// [`ProcessingError::Enhancement`] for 16-bit or floating-point inputs and
    /// for strength settings that cannot be applied (negative factors, even
    /// or zero kernel sizes).
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn enhance(&self, image: &RasterImage) -> Result<RasterImage> {
        let radius = self.validated_radius()?;
        let mean = mean_luma(image.as_dynamic());
        debug!(mean, radius, "Enhancement parameters resolved");

        let output = match image.as_dynamic() {
            DynamicImage::ImageLuma8(buf) => {
                DynamicImage::ImageLuma8(self.apply(buf, mean, 1, radius))
            }
            DynamicImage::ImageLumaA8(buf) => {
                DynamicImage::ImageLumaA8(self.apply(buf, mean, 1, radius))
            }
            DynamicImage::ImageRgb8(buf) => {
                DynamicImage::ImageRgb8(self.apply(buf, mean, 3, radius))
            }
            DynamicImage::ImageRgba8(buf) => {
                DynamicImage::ImageRgba8(self.apply(buf, mean, 3, radius))
            }
            other => {
                return Err(ProcessingError::Enhancement(format!(
                    "unsupported pixel format {:?}",
                    other.color()
                )));
            }
        };

        info!(
            contrast = self.config.contrast,
            sharpness = self.config.sharpness,
            kernel = self.config.denoise_kernel_size,
            "Enhancement applied"
        );
        Ok(RasterImage::from_dynamic(output))
    }

    fn validated_radius(&self) -> Result<u32> {
        let EnhancementConfig {
            contrast,
            sharpness,
            denoise_kernel_size,
        } = self.config;
        if !contrast.is_finite() || contrast < 0.0 {
            return Err(ProcessingError::Enhancement(format!(
                "contrast factor must be a non-negative number, got {contrast}"
            )));
        }
        if !sharpness.is_finite() || sharpness < 0.0 {
            return Err(ProcessingError::Enhancement(format!(
                "sharpness factor must be a non-negative number, got {sharpness}"
            )));
        }
        if denoise_kernel_size == 0 || denoise_kernel_size % 2 == 0 {
            return Err(ProcessingError::Enhancement(format!(
                "denoise kernel size must be odd, got {denoise_kernel_size}"
            )));
        }
        Ok(denoise_kernel_size / 2)
    }

    fn apply<P>(
        &self,
        input: &ImageBuffer<P, Vec<u8>>,
        mean: f32,
        colour_channels: usize,
        radius: u32,
    ) -> ImageBuffer<P, Vec<u8>>
    where
        P: Pixel<Subpixel = u8>,
    {
        let contrasted = adjust_contrast(input, mean, self.config.contrast, colour_channels);
        let sharpened = sharpen(&contrasted, self.config.sharpness, colour_channels);
        if radius == 0 {
            sharpened
        } else {
            median_filter(&sharpened, radius, radius)
        }
    }
}

/// Mean luminance rounded to a whole grey level.
fn mean_luma(image: &DynamicImage) -> f32 {
    let gray = image.to_luma8();
    let count = gray.as_raw().len();
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = gray.as_raw().iter().map(|&v| v as u64).sum();
    (sum as f64 / count as f64).round() as f32
}

/// Move each colour sample away from (or towards) `mean` by `factor`.
pub(crate) fn adjust_contrast<P>(
    input: &ImageBuffer<P, Vec<u8>>,
    mean: f32,
    factor: f32,
    colour_channels: usize,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let mut output = input.clone();
    for pixel in output.pixels_mut() {
        for sample in pixel.channels_mut().iter_mut().take(colour_channels) {
            *sample = blend(mean, *sample as f32, factor);
        }
    }
    output
}

/// Extrapolate each sample away from a 3x3 smoothed copy of the image.
///
/// Border pixels read their missing neighbours by clamping to the edge.
pub(crate) fn sharpen<P>(
    input: &ImageBuffer<P, Vec<u8>>,
    factor: f32,
    colour_channels: usize,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = input.dimensions();
    let mut output = input.clone();
    if width == 0 || height == 0 {
        return output;
    }

    let max_x = width as i64 - 1;
    let max_y = height as i64 - 1;
    for y in 0..height {
        for x in 0..width {
            let mut acc = [0.0f32; 4];
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let sx = (x as i64 + dx).clamp(0, max_x) as u32;
                    let sy = (y as i64 + dy).clamp(0, max_y) as u32;
                    let weight = if dx == 0 && dy == 0 {
                        SMOOTH_CENTRE_WEIGHT
                    } else {
                        1.0
                    };
                    let neighbour = input.get_pixel(sx, sy);
                    for (a, &v) in acc.iter_mut().zip(neighbour.channels()).take(colour_channels) {
                        *a += weight * v as f32;
                    }
                }
            }

            let pixel = output.get_pixel_mut(x, y);
            for (sample, a) in pixel.channels_mut().iter_mut().zip(acc).take(colour_channels) {
                *sample = blend(a / SMOOTH_KERNEL_SUM, *sample as f32, factor);
            }
        }
    }
    output
}

/// `base + (value - base) * factor`, rounded and clamped to a u8.
fn blend(base: f32, value: f32, factor: f32) -> u8 {
    (base + (value - base) * factor).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PixelFormat;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    fn gray(img: GrayImage) -> RasterImage {
        RasterImage::from_dynamic(DynamicImage::ImageLuma8(img))
    }

    #[test]
    fn uniform_image_is_unchanged() {
        let out = ImageEnhancer::default()
            .enhance(&gray(GrayImage::from_pixel(10, 10, Luma([128]))))
            .unwrap();
        assert!(out.to_luma8().pixels().all(|p| p.0[0] == 128));
    }

    #[test]
    fn contrast_spreads_values_around_mean() {
        let mut img = GrayImage::from_pixel(2, 1, Luma([100]));
        img.put_pixel(1, 0, Luma([200]));
        let out = adjust_contrast(&img, 150.0, 1.5, 1);
        assert_eq!(out.get_pixel(0, 0).0[0], 75);
        assert_eq!(out.get_pixel(1, 0).0[0], 225);
    }

    #[test]
    fn sharpen_overshoots_at_step_edge() {
        let img = GrayImage::from_fn(5, 3, |x, _| if x < 2 { Luma([50]) } else { Luma([200]) });
        let out = sharpen(&img, 1.5, 1);
        assert!(out.get_pixel(2, 1).0[0] > 200);
        assert!(out.get_pixel(1, 1).0[0] < 50);
        // Far from the edge the neighbourhood is flat.
        assert_eq!(out.get_pixel(4, 1).0[0], 200);
    }

    #[test]
    fn median_removes_isolated_speck() {
        let mut img = GrayImage::from_pixel(9, 9, Luma([100]));
        img.put_pixel(4, 4, Luma([255]));
        let enhancer = ImageEnhancer::new(EnhancementConfig {
            contrast: 1.0,
            sharpness: 1.0,
            denoise_kernel_size: 3,
        });
        let out = enhancer.enhance(&gray(img)).unwrap();
        assert!(out.to_luma8().pixels().all(|p| p.0[0] == 100));
    }

    #[test]
    fn rgba_keeps_format_and_alpha() {
        let img = RgbaImage::from_pixel(6, 6, Rgba([90, 120, 150, 200]));
        let out = ImageEnhancer::default()
            .enhance(&RasterImage::from_dynamic(DynamicImage::ImageRgba8(img)))
            .unwrap();
        assert_eq!(out.pixel_format(), PixelFormat::Rgba);
        assert_eq!(out.dimensions(), (6, 6));
        assert!(out.as_dynamic().to_rgba8().pixels().all(|p| p.0[3] == 200));
    }

    #[test]
    fn sixteen_bit_input_is_rejected() {
        let img = RasterImage::from_dynamic(DynamicImage::new_rgb16(4, 4));
        let err = ImageEnhancer::default().enhance(&img).unwrap_err();
        assert_eq!(err.kind(), scanmaster_core::ErrorKind::EnhancementError);
    }

    #[test]
    fn even_kernel_is_rejected() {
        let enhancer = ImageEnhancer::new(EnhancementConfig {
            denoise_kernel_size: 4,
            ..EnhancementConfig::default()
        });
        let img = gray(GrayImage::from_pixel(4, 4, Luma([10])));
        assert!(matches!(
            enhancer.enhance(&img),
            Err(ProcessingError::Enhancement(_))
        ));
    }
}
