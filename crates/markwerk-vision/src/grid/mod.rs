// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Grid location: find the sheet boundary, rectify it, and resolve every
// (question, option) pair to a bubble region.

pub mod boundary;
pub mod contours;
pub mod layout;

use image::GrayImage;
use markwerk_core::config::{BoundaryMode, GridConfig, GridStrategyConfig};
use markwerk_core::error::{OmrError, Result};
use markwerk_core::types::SheetShape;
use tracing::{debug, info, instrument, warn};

use crate::normalize::NormalizedSheet;

pub use boundary::Quad;
pub use contours::ContourClustering;
pub use layout::FixedLayout;

/// Axis-aligned pixel rectangle occupied by one bubble in the rectified sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BubbleRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BubbleRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Centre in pixel coordinates.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Shrink each side by `fraction` of the region's size. Never collapses
    /// below one pixel.
    pub fn inset(&self, fraction: f64) -> Self {
        let dx = (self.width as f64 * fraction).floor() as u32;
        let dy = (self.height as f64 * fraction).floor() as u32;
        Self {
            x: self.x + dx,
            y: self.y + dy,
            width: self.width.saturating_sub(2 * dx).max(1),
            height: self.height.saturating_sub(2 * dy).max(1),
        }
    }
}

/// Per-sheet geometry: where the sheet was found, its rectified ink mask, and
/// the region of every bubble.
///
/// Regions are stored question-major: `regions[q * options + o]`.
#[derive(Debug, Clone)]
pub struct Grid {
    shape: SheetShape,
    corners: Quad,
    rectified: GrayImage,
    regions: Vec<BubbleRegion>,
}

impl Grid {
    /// Assemble a grid, refusing any region count other than
    /// `questions × options`.
    pub fn new(
        shape: SheetShape,
        corners: Quad,
        rectified: GrayImage,
        regions: Vec<BubbleRegion>,
    ) -> Result<Self> {
        if regions.len() != shape.bubble_count() {
            return Err(OmrError::GridDetection(format!(
                "found {} bubbles, expected {} ({} questions × {} options)",
                regions.len(),
                shape.bubble_count(),
                shape.questions,
                shape.options
            )));
        }
        let (w, h) = rectified.dimensions();
        if let Some(outside) = regions
            .iter()
            .find(|r| r.x + r.width > w || r.y + r.height > h)
        {
            return Err(OmrError::GridDetection(format!(
                "bubble region {outside:?} lies outside the {w}x{h} sheet"
            )));
        }
        Ok(Self {
            shape,
            corners,
            rectified,
            regions,
        })
    }

    pub fn shape(&self) -> SheetShape {
        self.shape
    }

    /// Sheet corners in the source image (top-left, top-right, bottom-right,
    /// bottom-left).
    pub fn corners(&self) -> &Quad {
        &self.corners
    }

    /// Ink mask after perspective rectification.
    pub fn rectified(&self) -> &GrayImage {
        &self.rectified
    }

    pub fn bubble_count(&self) -> usize {
        self.regions.len()
    }

    pub fn region(&self, question: usize, option: usize) -> Option<&BubbleRegion> {
        if option >= self.shape.options {
            return None;
        }
        self.regions.get(question * self.shape.options + option)
    }

    /// Regions of one question, in option order.
    pub fn question_regions(&self, question: usize) -> &[BubbleRegion] {
        let start = question * self.shape.options;
        self.regions
            .get(start..start + self.shape.options)
            .unwrap_or(&[])
    }
}

/// Resolves bubble regions inside a rectified ink mask.
///
/// Implementations must return exactly `shape.bubble_count()` regions in
/// question-major order, or a `GridDetection` error.
pub trait GridStrategy: Send + Sync + std::fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn resolve(&self, ink: &GrayImage, shape: SheetShape) -> Result<Vec<BubbleRegion>>;
}

/// Finds the sheet, rectifies it, and hands the result to a [`GridStrategy`].
#[derive(Debug)]
pub struct GridLocator {
    boundary: BoundaryMode,
    min_boundary_fraction: f64,
    strategy: Box<dyn GridStrategy>,
}

impl GridLocator {
    /// Build the locator described by the configuration.
    pub fn from_config(config: &GridConfig) -> Self {
        let strategy: Box<dyn GridStrategy> = match &config.strategy {
            GridStrategyConfig::Layout(layout) => Box::new(FixedLayout::new(layout.clone())),
            GridStrategyConfig::Contours(contours) => {
                Box::new(ContourClustering::new(contours.clone()))
            }
        };
        Self::with_strategy(config.boundary, config.min_boundary_fraction, strategy)
    }

    /// Build a locator around any strategy.
    pub fn with_strategy(
        boundary: BoundaryMode,
        min_boundary_fraction: f64,
        strategy: Box<dyn GridStrategy>,
    ) -> Self {
        Self {
            boundary,
            min_boundary_fraction,
            strategy,
        }
    }

    /// Locate the grid of a normalised sheet.
    #[instrument(skip(self, sheet), fields(strategy = self.strategy.name(), questions = shape.questions, options = shape.options))]
    pub fn locate(&self, sheet: &NormalizedSheet, shape: SheetShape) -> Result<Grid> {
        let ink = &sheet.ink;
        let (corners, rectified) = match self.boundary {
            BoundaryMode::Skip => (boundary::image_frame(ink), ink.clone()),
            mode => match boundary::find_boundary(ink, self.min_boundary_fraction) {
                Some(corners) => {
                    let rectified = boundary::rectify(ink, &corners)?;
                    (corners, rectified)
                }
                None if mode == BoundaryMode::Optional => {
                    warn!("Sheet boundary not found; using the full image");
                    (boundary::image_frame(ink), ink.clone())
                }
                None => {
                    return Err(OmrError::GridDetection(
                        "sheet boundary not found".into(),
                    ));
                }
            },
        };
        debug!(
            width = rectified.width(),
            height = rectified.height(),
            "Sheet rectified"
        );

        let regions = self.strategy.resolve(&rectified, shape)?;
        let grid = Grid::new(shape, corners, rectified, regions)?;
        info!(bubbles = grid.bubble_count(), "Grid resolved");
        Ok(grid)
    }
}
