// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sheet boundary: locate the printed frame as the largest near-quadrilateral
// contour of the ink mask and warp it to an upright rectangle.

use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use markwerk_core::error::{OmrError, Result};
use tracing::{debug, instrument, warn};

use crate::normalize::PAPER;

/// Four corners in pixel coordinates: top-left, top-right, bottom-right,
/// bottom-left.
pub type Quad = [(f32, f32); 4];

/// How many of the largest contours are tried before giving up.
const MAX_CANDIDATES: usize = 8;

/// The corner quadrilateral must cover at least this share of the contour's
/// own area, otherwise the contour is not four-sided.
const MIN_QUAD_FILL: f32 = 0.9;

/// Corners of the whole image, used when no boundary is searched for.
pub fn image_frame(image: &GrayImage) -> Quad {
    let (w, h) = (image.width() as f32, image.height() as f32);
    [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)]
}

/// Find the sheet frame in an ink mask.
///
/// Contours are tried largest first. A contour qualifies when the quadrilateral
/// spanned by its four extreme points covers nearly all of it, and that
/// quadrilateral covers at least `min_fraction` of the image.
#[instrument(skip(ink), fields(width = ink.width(), height = ink.height()))]
pub fn find_boundary(ink: &GrayImage, min_fraction: f64) -> Option<Quad> {
    let img_area = ink.width() as f32 * ink.height() as f32;
    let min_area = img_area * min_fraction as f32;

    let contours: Vec<Contour<i32>> = find_contours(ink);
    let mut outer: Vec<(f32, &Contour<i32>)> = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.points.len() >= 4)
        .map(|c| (bbox_area(c), c))
        .filter(|(area, _)| *area >= min_area)
        .collect();
    outer.sort_by(|a, b| b.0.total_cmp(&a.0));
    debug!(candidates = outer.len(), "Boundary candidates");

    for (_, contour) in outer.into_iter().take(MAX_CANDIDATES) {
        let corners = extreme_corners(contour);
        let quad_area = shoelace_area(&corners);
        if quad_area < min_area {
            continue;
        }
        let outline: Vec<(f32, f32)> = contour
            .points
            .iter()
            .map(|p| (p.x as f32, p.y as f32))
            .collect();
        let contour_area = shoelace_area(&outline);
        if contour_area <= 0.0 || quad_area < contour_area * MIN_QUAD_FILL {
            continue;
        }
        debug!(
            top_left = ?corners[0],
            top_right = ?corners[1],
            bottom_right = ?corners[2],
            bottom_left = ?corners[3],
            quad_area,
            "Sheet boundary found"
        );
        return Some(corners);
    }

    warn!(min_area, "No quadrilateral boundary in ink mask");
    None
}

/// Warp the quadrilateral to an upright rectangle sized from its longer edges.
pub fn rectify(ink: &GrayImage, corners: &Quad) -> Result<GrayImage> {
    let [tl, tr, br, bl] = *corners;
    let out_w = distance(tl, tr).max(distance(bl, br)).round().max(1.0) as u32;
    let out_h = distance(tl, bl).max(distance(tr, br)).round().max(1.0) as u32;

    let dest: Quad = [
        (0.0, 0.0),
        (out_w as f32, 0.0),
        (out_w as f32, out_h as f32),
        (0.0, out_h as f32),
    ];

    // Maps source corners onto the output rectangle.
    let projection = Projection::from_control_points(*corners, dest).ok_or_else(|| {
        OmrError::GridDetection("sheet boundary is degenerate; cannot rectify".into())
    })?;

    let mut output = GrayImage::new(out_w, out_h);
    warp_into(
        ink,
        &projection,
        Interpolation::Nearest,
        Luma([PAPER]),
        &mut output,
    );
    debug!(out_w, out_h, "Sheet warped upright");
    Ok(output)
}

/// Corners picked as the contour points extreme along the two diagonals.
fn extreme_corners(contour: &Contour<i32>) -> Quad {
    let pts = &contour.points;
    let pick = |key: fn(i32, i32) -> i32, max: bool| {
        let chosen = if max {
            pts.iter().max_by_key(|p| key(p.x, p.y))
        } else {
            pts.iter().min_by_key(|p| key(p.x, p.y))
        };
        chosen.map_or((0.0, 0.0), |p| (p.x as f32, p.y as f32))
    };
    [
        pick(|x, y| x + y, false),
        pick(|x, y| x - y, true),
        pick(|x, y| x + y, true),
        pick(|x, y| x - y, false),
    ]
}

fn bbox_area(contour: &Contour<i32>) -> f32 {
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
    for p in &contour.points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    ((max_x - min_x + 1) as f32) * ((max_y - min_y + 1) as f32)
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Area of a simple polygon by the shoelace formula. Vertices may run either
/// way round.
pub(crate) fn shoelace_area(vertices: &[(f32, f32)]) -> f32 {
    let n = vertices.len();
    let mut area = 0.0f32;
    for i in 0..n {
        let j = (i + 1) % n;
        area += vertices[i].0 * vertices[j].1;
        area -= vertices[j].0 * vertices[i].1;
    }
    area.abs() / 2.0
}
