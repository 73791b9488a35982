// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Contour-clustering strategy: detect bubble-shaped blobs and sort them into
// rows and question groups.

use std::f32::consts::PI;

use image::GrayImage;
use imageproc::contours::{BorderType, Contour, find_contours};
use markwerk_core::config::ContourConfig;
use markwerk_core::error::{OmrError, Result};
use markwerk_core::types::SheetShape;
use tracing::debug;

use super::boundary::shoelace_area;
use super::{BubbleRegion, GridStrategy};

const MIN_ASPECT: f32 = 0.5;
const MAX_ASPECT: f32 = 2.0;
/// Accepted range of outline area over inscribed-ellipse area.
const ROUNDNESS: std::ops::RangeInclusive<f32> = 0.7..=1.25;

/// Finds bubbles by shape, then clusters them into rows by vertical position.
///
/// Rows longer than the option count are split left to right into question
/// groups (side-by-side blocks); questions are numbered down each group before
/// moving to the next.
#[derive(Debug, Clone)]
pub struct ContourClustering {
    config: ContourConfig,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    region: BubbleRegion,
    cx: f64,
    cy: f64,
}

impl ContourClustering {
    pub fn new(config: ContourConfig) -> Self {
        Self { config }
    }

    fn candidates(&self, ink: &GrayImage) -> Vec<Candidate> {
        let contours: Vec<Contour<i32>> = find_contours(ink);
        contours
            .iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .filter_map(|c| self.bubble_shape(c))
            .collect()
    }

    fn bubble_shape(&self, contour: &Contour<i32>) -> Option<Candidate> {
        let xs = contour.points.iter().map(|p| p.x);
        let ys = contour.points.iter().map(|p| p.y);
        let (min_x, max_x) = (xs.clone().min()?, xs.max()?);
        let (min_y, max_y) = (ys.clone().min()?, ys.max()?);
        let width = (max_x - min_x + 1) as u32;
        let height = (max_y - min_y + 1) as u32;

        let area = width * height;
        if area < self.config.min_bubble_area || area > self.config.max_bubble_area {
            return None;
        }
        let aspect = width as f32 / height as f32;
        if !(MIN_ASPECT..=MAX_ASPECT).contains(&aspect) {
            return None;
        }

        // The outline runs through pixel centres, one pixel inside the box.
        let ellipse = PI / 4.0 * (width - 1) as f32 * (height - 1) as f32;
        let outline: Vec<(f32, f32)> = contour
            .points
            .iter()
            .map(|p| (p.x as f32, p.y as f32))
            .collect();
        if ellipse <= 0.0 || !ROUNDNESS.contains(&(shoelace_area(&outline) / ellipse)) {
            return None;
        }

        let region = BubbleRegion::new(min_x as u32, min_y as u32, width, height);
        let (cx, cy) = region.center();
        Some(Candidate { region, cx, cy })
    }
}

/// Group candidates into rows: sorted by centre y, a new row starts whenever the
/// next centre is further than `tolerance` from the current row's mean.
fn cluster_rows(mut candidates: Vec<Candidate>, tolerance: f64) -> Vec<Vec<Candidate>> {
    candidates.sort_by(|a, b| a.cy.total_cmp(&b.cy).then(a.cx.total_cmp(&b.cx)));
    let mut rows: Vec<Vec<Candidate>> = Vec::new();
    let mut row_mean = 0.0;
    for candidate in candidates {
        match rows.last_mut() {
            Some(row) if (candidate.cy - row_mean).abs() <= tolerance => {
                row.push(candidate);
                row_mean += (candidate.cy - row_mean) / row.len() as f64;
            }
            _ => {
                row_mean = candidate.cy;
                rows.push(vec![candidate]);
            }
        }
    }
    for row in &mut rows {
        row.sort_by(|a, b| a.cx.total_cmp(&b.cx));
    }
    rows
}

fn median_height(candidates: &[Candidate]) -> f64 {
    let mut heights: Vec<u32> = candidates.iter().map(|c| c.region.height).collect();
    heights.sort_unstable();
    heights.get(heights.len() / 2).copied().unwrap_or(1) as f64
}

impl GridStrategy for ContourClustering {
    fn name(&self) -> &'static str {
        "contours"
    }

    fn resolve(&self, ink: &GrayImage, shape: SheetShape) -> Result<Vec<BubbleRegion>> {
        let candidates = self.candidates(ink);
        let expected = shape.bubble_count();
        if candidates.len() != expected {
            return Err(OmrError::GridDetection(format!(
                "found {} bubbles, expected {expected} ({} questions × {} options)",
                candidates.len(),
                shape.questions,
                shape.options
            )));
        }

        let tolerance = self.config.row_tolerance * median_height(&candidates);
        let rows = cluster_rows(candidates, tolerance);
        debug!(rows = rows.len(), tolerance, "Bubbles clustered into rows");

        // (group, row) → one question's bubbles.
        let mut questions: Vec<(usize, usize, &[Candidate])> = Vec::new();
        for (r, row) in rows.iter().enumerate() {
            if row.len() % shape.options != 0 {
                return Err(OmrError::GridDetection(format!(
                    "row {} holds {} bubbles, not a multiple of {} options",
                    r + 1,
                    row.len(),
                    shape.options
                )));
            }
            for (g, group) in row.chunks(shape.options).enumerate() {
                questions.push((g, r, group));
            }
        }
        questions.sort_by_key(|&(g, r, _)| (g, r));

        Ok(questions
            .into_iter()
            .flat_map(|(_, _, group)| group.iter().map(|c| c.region))
            .collect())
    }
}
