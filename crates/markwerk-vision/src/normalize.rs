// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image normalisation: grayscale conversion, Gaussian smoothing, locally
// adaptive binarization into an ink mask, and morphological closing.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::close;
use markwerk_core::config::PreprocessConfig;
use markwerk_core::error::{OmrError, Result};
use tracing::{debug, info, instrument};

use crate::raster::RasterRef;

/// Mask value for ink (foreground) pixels.
pub const INK: u8 = 255;
/// Mask value for paper (background) pixels.
pub const PAPER: u8 = 0;

/// Output of normalisation: the smoothed intensity image and the ink mask.
#[derive(Debug, Clone)]
pub struct NormalizedSheet {
    /// Smoothed single-channel intensity.
    pub gray: GrayImage,
    /// Binary mask: [`INK`] where a pixel is darker than its neighbourhood.
    pub ink: GrayImage,
}

/// Converts a raw raster into a noise-reduced, illumination-robust ink mask.
///
/// The threshold for every pixel is the mean of its `threshold_block_size`
/// window minus `threshold_c`, so a shadow across part of the sheet moves the
/// threshold with it instead of swallowing the marks.
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    config: PreprocessConfig,
}

impl ImageNormalizer {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Run the full normalisation pipeline:
    ///
    /// 1. Validate the buffer and convert to grayscale
    /// 2. Gaussian blur sized from `blur_kernel_size`
    /// 3. Adaptive binarization into an ink mask
    /// 4. Morphological closing of the mask (if enabled)
    #[instrument(skip(self, raster), fields(width = raster.width, height = raster.height))]
    pub fn normalize(&self, raster: RasterRef<'_>) -> Result<NormalizedSheet> {
        let gray = raster.to_luma()?;
        let (width, height) = gray.dimensions();
        if width < self.config.min_width || height < self.config.min_height {
            return Err(OmrError::Image(format!(
                "image too small: {width}x{height}, need at least {}x{}",
                self.config.min_width, self.config.min_height
            )));
        }

        let smoothed = if self.config.blur_kernel_size > 1 {
            let sigma = kernel_sigma(self.config.blur_kernel_size);
            debug!(kernel = self.config.blur_kernel_size, sigma, "Applying Gaussian blur");
            gaussian_blur_f32(&gray, sigma)
        } else {
            gray
        };

        let mut ink = binarize_ink(
            &smoothed,
            self.config.threshold_radius(),
            self.config.threshold_c,
        );

        if self.config.closing_radius > 0 {
            ink = close(&ink, Norm::LInf, self.config.closing_radius);
            debug!(radius = self.config.closing_radius, "Closed ink mask");
        }

        info!(width, height, "Sheet normalised");
        Ok(NormalizedSheet {
            gray: smoothed,
            ink,
        })
    }
}

/// Standard deviation matching a Gaussian kernel of the given odd size.
fn kernel_sigma(kernel_size: u32) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Mark every pixel darker than its local mean minus `c` as ink.
///
/// Uses a summed-area table, so the cost is independent of the window size.
pub fn binarize_ink(gray: &GrayImage, block_radius: u32, c: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let table = SummedArea::new(gray);
    let mut output = GrayImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let local_mean = table.window_mean(x, y, block_radius);
            let threshold = (local_mean as i32 - c).clamp(0, 255);
            let pixel_val = gray.get_pixel(x, y).0[0] as i32;
            let value = if pixel_val < threshold { INK } else { PAPER };
            output.put_pixel(x, y, Luma([value]));
        }
    }

    output
}

/// Running sums of a grayscale image: `sums[(y, x)]` is the total of every
/// pixel above and left of `(x, y)`, with a zero first row and column.
struct SummedArea {
    sums: Vec<u64>,
    width: u32,
    height: u32,
}

impl SummedArea {
    fn new(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        let cols = width as usize + 1;
        let mut sums = vec![0u64; cols * (height as usize + 1)];
        for (y, row) in gray.rows().enumerate() {
            let mut across = 0u64;
            for (x, pixel) in row.enumerate() {
                across += u64::from(pixel.0[0]);
                sums[(y + 1) * cols + x + 1] = sums[y * cols + x + 1] + across;
            }
        }
        Self { sums, width, height }
    }

    fn at(&self, x: usize, y: usize) -> u64 {
        self.sums[y * (self.width as usize + 1) + x]
    }

    /// Mean of the `(2r + 1)`-wide square around `(cx, cy)`, cut off at the
    /// image edges. `(cx, cy)` must lie inside the image.
    fn window_mean(&self, cx: u32, cy: u32, radius: u32) -> f64 {
        let left = cx.saturating_sub(radius) as usize;
        let top = cy.saturating_sub(radius) as usize;
        let right = cx.saturating_add(radius + 1).min(self.width) as usize;
        let bottom = cy.saturating_add(radius + 1).min(self.height) as usize;

        let total = self.at(right, bottom) + self.at(left, top)
            - self.at(right, top)
            - self.at(left, bottom);
        total as f64 / ((right - left) * (bottom - top)) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PixelFormat;

    fn normalizer() -> ImageNormalizer {
        ImageNormalizer::new(PreprocessConfig::default())
    }

    #[test]
    fn undersized_image_is_rejected() {
        let data = vec![255u8; 32 * 32];
        let raster = RasterRef::new(&data, 32, 32, PixelFormat::Luma8);
        let err = normalizer().normalize(raster).unwrap_err();
        assert!(matches!(err, OmrError::Image(ref msg) if msg.contains("too small")));
    }

    #[test]
    fn blank_page_has_no_ink() {
        let data = vec![230u8; 100 * 100];
        let raster = RasterRef::new(&data, 100, 100, PixelFormat::Luma8);
        let sheet = normalizer().normalize(raster).unwrap();
        assert!(sheet.ink.pixels().all(|p| p.0[0] == PAPER));
    }

    #[test]
    fn dark_square_becomes_ink_under_gradient() {
        // Paper brightness falls from 240 on the left to 140 on the right.
        let mut gray = GrayImage::from_fn(120, 80, |x, _| Luma([240 - (x * 100 / 119) as u8]));
        for y in 30..40 {
            for x in 90..100 {
                let paper = gray.get_pixel(x, y).0[0];
                gray.put_pixel(x, y, Luma([paper - 100]));
            }
        }
        let ink = binarize_ink(&gray, 15, 10);
        assert_eq!(ink.get_pixel(95, 35).0[0], INK);
        assert_eq!(ink.get_pixel(20, 35).0[0], PAPER);
        assert_eq!(ink.get_pixel(110, 10).0[0], PAPER);
    }

    #[test]
    fn uniform_shift_does_not_change_mask() {
        let base = GrayImage::from_fn(64, 64, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 { Luma([60]) } else { Luma([180]) }
        });
        let shifted = GrayImage::from_fn(64, 64, |x, y| Luma([base.get_pixel(x, y).0[0] + 40]));
        assert_eq!(binarize_ink(&base, 7, 5), binarize_ink(&shifted, 7, 5));
    }

    #[test]
    fn kernel_sigma_matches_common_convention() {
        assert!((kernel_sigma(5) - 1.1).abs() < 1e-6);
        assert!(kernel_sigma(3) > 0.0);
    }

    #[test]
    fn window_mean_is_clipped_at_edges() {
        let gray = GrayImage::from_pixel(10, 10, Luma([100u8]));
        assert!((SummedArea::new(&gray).window_mean(0, 0, 3) - 100.0).abs() < 1e-9);

        // Left half 0, right half 200: a corner window sees only its own half.
        let split = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 0 } else { 200 }]));
        let table = SummedArea::new(&split);
        assert_eq!(table.window_mean(0, 0, 2), 0.0);
        assert_eq!(table.window_mean(9, 9, 2), 200.0);
        assert!((table.window_mean(5, 5, 1) - 400.0 / 3.0).abs() < 1e-9);
    }
}
