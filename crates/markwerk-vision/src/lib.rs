// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// markwerk-vision: Image side of the Markwerk OMR engine.
//
// Turns a decoded raster into per-question classifications: normalisation
// (grayscale, smoothing, adaptive binarization), grid location (sheet boundary,
// perspective rectification, bubble regions), fill-based mark classification,
// and confidence estimation.

pub mod classify;
pub mod confidence;
pub mod grid;
pub mod normalize;
pub mod raster;

#[cfg(any(test, feature = "synthetic"))]
pub mod synthetic;

// Re-export the primary structs so callers can use `markwerk_vision::GridLocator` etc.
pub use classify::{BubbleSample, MarkClassifier, QuestionMarks};
pub use confidence::ConfidenceEstimator;
pub use grid::{BubbleRegion, Grid, GridLocator, GridStrategy};
pub use normalize::{ImageNormalizer, NormalizedSheet};
pub use raster::{OwnedRaster, PixelFormat, RasterRef};
