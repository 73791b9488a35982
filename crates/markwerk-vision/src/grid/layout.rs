// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fixed-layout strategy: bubble positions computed from the known sheet
// geometry.

use image::GrayImage;
use markwerk_core::config::LayoutConfig;
use markwerk_core::error::{OmrError, Result};
use markwerk_core::types::SheetShape;
use tracing::debug;

use super::{BubbleRegion, GridStrategy};

/// Smallest bubble side, in pixels, that can still be sampled.
const MIN_BUBBLE_SIDE: f64 = 2.0;

/// Places bubbles on a regular grid inside the rectified sheet.
#[derive(Debug, Clone)]
pub struct FixedLayout {
    config: LayoutConfig,
}

impl FixedLayout {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Bubble regions for a sheet of the given pixel size.
    ///
    /// Question `q` sits in block `q / rows_per_block`, row
    /// `q % rows_per_block`. Each region is a square centred in its cell.
    pub fn regions(&self, width: u32, height: u32, shape: SheetShape) -> Result<Vec<BubbleRegion>> {
        let c = &self.config;
        let (w, h) = (width as f64, height as f64);
        let blocks = c.blocks.max(1) as usize;
        let rows = shape.questions.div_ceil(blocks).max(1);

        let content_x = c.margin_left * w;
        let content_y = c.margin_top * h;
        let content_w = w * (1.0 - c.margin_left - c.margin_right);
        let content_h = h * (1.0 - c.margin_top - c.margin_bottom);
        let gap = c.block_gap * w;

        let block_w = (content_w - gap * (blocks - 1) as f64) / blocks as f64;
        let label_w = block_w * c.label_fraction;
        let cell_w = (block_w - label_w) / shape.options.max(1) as f64;
        let cell_h = content_h / rows as f64;
        let side = c.bubble_fraction * cell_w.min(cell_h);

        if side < MIN_BUBBLE_SIDE {
            return Err(OmrError::GridDetection(format!(
                "layout gives {side:.1}px bubbles on a {width}x{height} sheet"
            )));
        }
        debug!(blocks, rows, cell_w, cell_h, side, "Layout geometry");

        let size = side.round() as u32;
        let mut regions = Vec::with_capacity(shape.bubble_count());
        for q in 0..shape.questions {
            let block = q / rows;
            let row = q % rows;
            let cy = content_y + (row as f64 + 0.5) * cell_h;
            let block_x = content_x + block as f64 * (block_w + gap) + label_w;
            for o in 0..shape.options {
                let cx = block_x + (o as f64 + 0.5) * cell_w;
                let x = (cx - side / 2.0).round().max(0.0) as u32;
                let y = (cy - side / 2.0).round().max(0.0) as u32;
                regions.push(BubbleRegion::new(
                    x,
                    y,
                    size.min(width.saturating_sub(x)),
                    size.min(height.saturating_sub(y)),
                ));
            }
        }
        Ok(regions)
    }
}

impl GridStrategy for FixedLayout {
    fn name(&self) -> &'static str {
        "layout"
    }

    fn resolve(&self, ink: &GrayImage, shape: SheetShape) -> Result<Vec<BubbleRegion>> {
        self.regions(ink.width(), ink.height(), shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(blocks: u32) -> FixedLayout {
        FixedLayout::new(LayoutConfig {
            blocks,
            margin_top: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            margin_right: 0.0,
            block_gap: 0.0,
            label_fraction: 0.0,
            bubble_fraction: 0.5,
        })
    }

    #[test]
    fn single_block_grid_positions() {
        let regions = plain(1).regions(400, 200, SheetShape::new(2, 4)).unwrap();
        assert_eq!(regions.len(), 8);
        // Cells are 100x100, bubbles 50x50 centred.
        assert_eq!(regions[0], BubbleRegion::new(25, 25, 50, 50));
        assert_eq!(regions[3], BubbleRegion::new(325, 25, 50, 50));
        assert_eq!(regions[4], BubbleRegion::new(25, 125, 50, 50));
    }

    #[test]
    fn questions_fill_blocks_column_first() {
        let regions = plain(2).regions(400, 200, SheetShape::new(4, 2)).unwrap();
        // Two rows per block; question 2 starts the second block.
        let (q1_x, q1_y) = regions[2].center();
        let (q2_x, q2_y) = regions[4].center();
        assert!(q1_y > 90.0 && q1_x < 200.0);
        assert!(q2_y < 100.0 && q2_x > 200.0);
    }

    #[test]
    fn default_layout_stays_inside_sheet() {
        let layout = FixedLayout::new(LayoutConfig::default());
        let regions = layout.regions(559, 759, SheetShape::new(20, 4)).unwrap();
        assert!(regions.iter().all(|r| r.x + r.width <= 559 && r.y + r.height <= 759));
        // Regions never overlap within a question.
        for q in 0..20 {
            let row = &regions[q * 4..q * 4 + 4];
            assert!(row.windows(2).all(|w| w[0].x + w[0].width <= w[1].x));
        }
    }

    #[test]
    fn microscopic_sheet_is_grid_error() {
        let err = plain(1).regions(10, 10, SheetShape::new(50, 5)).unwrap_err();
        assert!(matches!(err, OmrError::GridDetection(_)));
    }
}
