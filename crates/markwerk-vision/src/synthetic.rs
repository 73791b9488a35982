// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Synthetic answer sheets for tests and benchmarks: a framed page with the
// bubble layout printed on it and chosen bubbles filled in.

use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use markwerk_core::config::LayoutConfig;
use markwerk_core::error::Result;
use markwerk_core::types::{Selection, SheetShape};

use crate::grid::FixedLayout;
use crate::raster::{OwnedRaster, PixelFormat};

/// Target height of one question row, in pixels.
const ROW_PITCH: f64 = 34.0;

/// Describes a sheet to render.
#[derive(Debug, Clone)]
pub struct SyntheticSheet {
    shape: SheetShape,
    layout: LayoutConfig,
    width: u32,
    height: u32,
    /// Paper between the image edge and the printed frame.
    margin: u32,
    frame_thickness: u32,
    marks: Vec<Vec<usize>>,
    paper: u8,
    ink: u8,
    gradient: u8,
    brightness_shift: i16,
}

impl SyntheticSheet {
    /// A blank sheet sized so each question row is about [`ROW_PITCH`] tall.
    pub fn new(shape: SheetShape) -> Self {
        Self::with_layout(shape, LayoutConfig::default())
    }

    pub fn with_layout(shape: SheetShape, layout: LayoutConfig) -> Self {
        let margin = 20;
        let rows = shape.questions.div_ceil(layout.blocks.max(1) as usize).max(1);
        let usable = 1.0 - layout.margin_top - layout.margin_bottom;
        let inner_h = (rows as f64 * ROW_PITCH / usable).ceil() as u32;
        Self {
            shape,
            width: 600 * layout.blocks.max(1),
            height: inner_h + 2 * margin + 1,
            layout,
            margin,
            frame_thickness: 4,
            marks: vec![Vec::new(); shape.questions],
            paper: 235,
            ink: 30,
            gradient: 0,
            brightness_shift: 0,
        }
    }

    /// Fill bubbles to match the given selections. Ambiguous questions get
    /// their first two options filled.
    pub fn with_selections(mut self, selections: &[Selection]) -> Self {
        for (q, selection) in selections.iter().enumerate().take(self.shape.questions) {
            self.marks[q] = match selection {
                Selection::Option(o) => vec![*o],
                Selection::Blank => Vec::new(),
                Selection::Ambiguous => vec![0, 1],
            };
        }
        self
    }

    /// Fill one more bubble.
    pub fn mark(mut self, question: usize, option: usize) -> Self {
        if let Some(marks) = self.marks.get_mut(question) {
            if !marks.contains(&option) {
                marks.push(option);
            }
        }
        self
    }

    /// Darken the page linearly from left to right by up to `drop` levels.
    pub fn with_gradient(mut self, drop: u8) -> Self {
        self.gradient = drop;
        self
    }

    /// Add a constant to every pixel.
    pub fn with_brightness_shift(mut self, shift: i16) -> Self {
        self.brightness_shift = shift;
        self
    }

    pub fn shape(&self) -> SheetShape {
        self.shape
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The selection a perfect reader would report for each question.
    pub fn expected(&self) -> Vec<Selection> {
        self.marks
            .iter()
            .map(|marks| match marks.as_slice() {
                [] => Selection::Blank,
                [only] => Selection::Option(*only),
                _ => Selection::Ambiguous,
            })
            .collect()
    }

    pub fn render(&self) -> Result<GrayImage> {
        let (w, h, m) = (self.width, self.height, self.margin);
        let ink = Luma([self.ink]);
        let mut image = GrayImage::from_pixel(w, h, Luma([self.paper]));

        for t in 0..self.frame_thickness {
            let inset = m + t;
            let rect = Rect::at(inset as i32, inset as i32).of_size(w - 2 * inset, h - 2 * inset);
            draw_hollow_rect_mut(&mut image, rect, ink);
        }

        // The frame's outer edge spans (w - 2m - 1) × (h - 2m - 1) pixels once
        // rectified.
        let regions = FixedLayout::new(self.layout.clone()).regions(
            w - 2 * m - 1,
            h - 2 * m - 1,
            self.shape,
        )?;
        for q in 0..self.shape.questions {
            for o in 0..self.shape.options {
                let region = &regions[q * self.shape.options + o];
                let radius = (region.width / 2) as i32;
                let center = (
                    (m + region.x) as i32 + radius,
                    (m + region.y) as i32 + radius,
                );
                if self.marks[q].contains(&o) {
                    draw_filled_circle_mut(&mut image, center, radius, ink);
                } else {
                    draw_hollow_circle_mut(&mut image, center, radius, ink);
                    draw_hollow_circle_mut(&mut image, center, radius - 1, ink);
                }
            }
        }

        if self.gradient > 0 || self.brightness_shift != 0 {
            let span = (w.max(2) - 1) as i32;
            for (x, _, pixel) in image.enumerate_pixels_mut() {
                let drop = self.gradient as i32 * x as i32 / span;
                let value = pixel.0[0] as i32 - drop + self.brightness_shift as i32;
                pixel.0[0] = value.clamp(0, 255) as u8;
            }
        }
        Ok(image)
    }

    /// Render straight into an owned single-channel raster.
    pub fn raster(&self) -> Result<OwnedRaster> {
        let image = self.render()?;
        let (w, h) = image.dimensions();
        Ok(OwnedRaster::new(image.into_raw(), w, h, PixelFormat::Luma8))
    }
}
