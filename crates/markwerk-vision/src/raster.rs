// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster intake: the decoded pixel buffer a sheet arrives as, its
// consistency checks, and conversion to single-channel intensity.

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use markwerk_core::error::{OmrError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Channel layout of a decoded buffer. All formats use 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Luma8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            Self::Luma8 => 1,
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
        }
    }
}

/// Borrowed view of a decoded pixel buffer.
#[derive(Debug, Clone, Copy)]
pub struct RasterRef<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl<'a> RasterRef<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
        }
    }

    /// Check that the buffer is non-empty and agrees with its metadata.
    pub fn check(&self) -> Result<()> {
        if self.data.is_empty() {
            return Err(OmrError::Image("pixel buffer is empty".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(OmrError::Image(format!(
                "invalid dimensions {}x{}",
                self.width, self.height
            )));
        }
        let expected = self.width as usize * self.height as usize * self.format.channels();
        if self.data.len() != expected {
            return Err(OmrError::Image(format!(
                "buffer holds {} bytes but {}x{} {:?} needs {}",
                self.data.len(),
                self.width,
                self.height,
                self.format,
                expected
            )));
        }
        Ok(())
    }

    /// Convert to single-channel intensity.
    #[instrument(skip(self), fields(width = self.width, height = self.height, format = ?self.format))]
    pub fn to_luma(&self) -> Result<GrayImage> {
        self.check()?;
        let owned = self.data.to_vec();
        let gray = match self.format {
            PixelFormat::Luma8 => GrayImage::from_raw(self.width, self.height, owned),
            PixelFormat::Rgb8 => RgbImage::from_raw(self.width, self.height, owned)
                .map(|rgb| DynamicImage::ImageRgb8(rgb).to_luma8()),
            PixelFormat::Rgba8 => RgbaImage::from_raw(self.width, self.height, owned)
                .map(|rgba| DynamicImage::ImageRgba8(rgba).to_luma8()),
        };
        let gray = gray.ok_or_else(|| OmrError::Image("buffer rejected by image container".into()))?;
        debug!("Converted to grayscale");
        Ok(gray)
    }
}

/// Owned pixel buffer, for handing sheets to worker threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedRaster {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl OwnedRaster {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
        }
    }

    pub fn as_raster(&self) -> RasterRef<'_> {
        RasterRef::new(&self.data, self.width, self.height, self.format)
    }

    /// Take ownership of an already-decoded image, keeping its channel layout
    /// where possible.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let color = image.color();
        if color.has_alpha() {
            Self::new(image.into_rgba8().into_raw(), width, height, PixelFormat::Rgba8)
        } else if color.has_color() {
            Self::new(image.into_rgb8().into_raw(), width, height, PixelFormat::Rgb8)
        } else {
            Self::new(image.into_luma8().into_raw(), width, height, PixelFormat::Luma8)
        }
    }

    /// Decode encoded image bytes (JPEG, PNG, TIFF, BMP, ...).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(OmrError::Image("image file is empty".into()));
        }
        let image = image::load_from_memory(data)
            .map_err(|err| OmrError::Image(format!("failed to decode scan image: {err}")))?;
        debug!(
            width = image.width(),
            height = image.height(),
            "Scan image decoded"
        );
        Ok(Self::from_dynamic(image))
    }
}
