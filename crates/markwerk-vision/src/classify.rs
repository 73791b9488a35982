// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mark classification: measure how much of each bubble is inked and decide
// which option, if any, the candidate chose.

use image::GrayImage;
use markwerk_core::config::MarkConfig;
use markwerk_core::types::Selection;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::grid::{BubbleRegion, Grid};
use crate::normalize::PAPER;

/// Slack for comparing differences of fill ratios, which carry rounding.
const MARGIN_EPSILON: f64 = 1e-9;

/// Measured fill of one bubble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BubbleSample {
    pub option: usize,
    /// Share of inked pixels in the sampled area, in [0, 1].
    pub fill_ratio: f64,
    /// Whether the ratio exceeds the fill threshold.
    pub filled: bool,
}

/// Samples and decision for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionMarks {
    pub question: usize,
    /// One sample per option, in option order.
    pub samples: Vec<BubbleSample>,
    pub selection: Selection,
    /// Highest fill ratio of the question.
    pub top_fill: f64,
    /// Second-highest fill ratio (0 for a single option).
    pub runner_up_fill: f64,
}

impl QuestionMarks {
    /// More than one bubble exceeds the threshold and none stands out.
    pub fn multiple_marks(&self) -> bool {
        self.selection == Selection::Ambiguous
    }

    pub fn filled_count(&self) -> usize {
        self.samples.iter().filter(|s| s.filled).count()
    }
}

/// Decides each question from its bubbles' fill ratios.
///
/// A question resolves to its most-filled option when that ratio exceeds
/// `fill_threshold` and leads the runner-up by at least `separation_margin`.
/// Nothing above the threshold is blank; two or more above it without that
/// lead is ambiguous. A lone mark above the threshold with a weak lead still
/// resolves, and the confidence estimate reports the weakness.
#[derive(Debug, Clone)]
pub struct MarkClassifier {
    config: MarkConfig,
}

impl MarkClassifier {
    pub fn new(config: MarkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MarkConfig {
        &self.config
    }

    /// Classify every question of a located grid.
    #[instrument(skip(self, grid), fields(bubbles = grid.bubble_count()))]
    pub fn classify(&self, grid: &Grid) -> Vec<QuestionMarks> {
        let shape = grid.shape();
        let ink = grid.rectified();
        let marks: Vec<QuestionMarks> = (0..shape.questions)
            .map(|q| {
                let ratios = grid
                    .question_regions(q)
                    .iter()
                    .map(|region| fill_ratio(ink, region, self.config.sample_inset))
                    .collect::<Vec<_>>();
                self.decide(q, &ratios)
            })
            .collect();
        debug!(
            blank = marks.iter().filter(|m| m.selection == Selection::Blank).count(),
            ambiguous = marks.iter().filter(|m| m.multiple_marks()).count(),
            "Marks classified"
        );
        marks
    }

    /// Decide one question from its per-option fill ratios.
    pub fn decide(&self, question: usize, ratios: &[f64]) -> QuestionMarks {
        let threshold = self.config.fill_threshold;
        let samples: Vec<BubbleSample> = ratios
            .iter()
            .enumerate()
            .map(|(option, &fill_ratio)| BubbleSample {
                option,
                fill_ratio,
                filled: fill_ratio > threshold,
            })
            .collect();

        // Stable sort keeps the lower option first on ties.
        let mut ranked: Vec<&BubbleSample> = samples.iter().collect();
        ranked.sort_by(|a, b| b.fill_ratio.total_cmp(&a.fill_ratio));
        let top = ranked.first().map_or(0.0, |s| s.fill_ratio);
        let runner_up = ranked.get(1).map_or(0.0, |s| s.fill_ratio);

        let selection = match ranked.first() {
            Some(best) if best.filled => {
                let lead = top - runner_up;
                if lead + MARGIN_EPSILON >= self.config.separation_margin || runner_up <= threshold {
                    Selection::Option(best.option)
                } else {
                    Selection::Ambiguous
                }
            }
            _ => Selection::Blank,
        };

        QuestionMarks {
            question,
            samples,
            selection,
            top_fill: top,
            runner_up_fill: runner_up,
        }
    }
}

/// Share of ink pixels inside `region` after trimming `inset` of each side.
pub fn fill_ratio(ink: &GrayImage, region: &BubbleRegion, inset: f64) -> f64 {
    let area = region.inset(inset);
    let (w, h) = ink.dimensions();
    let x_end = (area.x + area.width).min(w);
    let y_end = (area.y + area.height).min(h);
    if area.x >= x_end || area.y >= y_end {
        return 0.0;
    }

    let mut inked = 0u64;
    for y in area.y..y_end {
        for x in area.x..x_end {
            if ink.get_pixel(x, y).0[0] != PAPER {
                inked += 1;
            }
        }
    }
    let total = (x_end - area.x) as u64 * (y_end - area.y) as u64;
    (inked as f64 / total as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::INK;
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn classifier() -> MarkClassifier {
        MarkClassifier::new(MarkConfig::default())
    }

    #[test]
    fn clear_single_mark_resolves() {
        let marks = classifier().decide(0, &[0.05, 0.9, 0.1, 0.0]);
        assert_eq!(marks.selection, Selection::Option(1));
        assert_eq!(marks.filled_count(), 1);
        assert_eq!(marks.top_fill, 0.9);
        assert_eq!(marks.runner_up_fill, 0.1);
    }

    #[test]
    fn nothing_above_threshold_is_blank() {
        let marks = classifier().decide(3, &[0.1, 0.2, 0.5, 0.0]);
        assert_eq!(marks.selection, Selection::Blank);
        assert_eq!(marks.question, 3);
    }

    #[test]
    fn two_close_marks_are_ambiguous() {
        let marks = classifier().decide(0, &[0.85, 0.1, 0.8, 0.0]);
        assert_eq!(marks.selection, Selection::Ambiguous);
        assert!(marks.multiple_marks());
    }

    #[test]
    fn dominant_mark_beats_partial_erasure() {
        let marks = classifier().decide(0, &[0.95, 0.6, 0.0, 0.0]);
        assert_eq!(marks.selection, Selection::Option(0));
    }

    #[test]
    fn weak_lone_mark_still_resolves() {
        let marks = classifier().decide(0, &[0.55, 0.45, 0.0, 0.0]);
        assert_eq!(marks.selection, Selection::Option(0));
    }

    #[test]
    fn lead_of_exactly_the_margin_resolves() {
        // 140/200 and 110/200 differ by 0.15 only up to rounding.
        let marks = classifier().decide(0, &[140.0 / 200.0, 110.0 / 200.0, 0.0, 0.0]);
        assert_eq!(marks.selection, Selection::Option(0));
        let marks = classifier().decide(0, &[0.8, 0.65, 0.0, 0.0]);
        assert_eq!(marks.selection, Selection::Option(0));
    }

    #[test]
    fn ties_do_not_depend_on_option_order() {
        let marks = classifier().decide(0, &[0.0, 0.9, 0.9, 0.0]);
        assert_eq!(marks.selection, Selection::Ambiguous);
    }

    #[test]
    fn fill_ratio_counts_ink_in_inset() {
        let mut ink = GrayImage::new(40, 40);
        draw_filled_rect_mut(&mut ink, Rect::at(10, 10).of_size(10, 20), Luma([INK]));
        let region = BubbleRegion::new(10, 10, 20, 20);
        // Inset 0.25 samples x,y in 15..25: half of it is inked.
        assert!((fill_ratio(&ink, &region, 0.25) - 0.5).abs() < 1e-9);
        assert_eq!(fill_ratio(&ink, &BubbleRegion::new(30, 30, 10, 10), 0.0), 0.0);
    }

    #[test]
    fn fill_ratio_clips_to_image() {
        let ink = GrayImage::from_pixel(10, 10, Luma([INK]));
        assert_eq!(fill_ratio(&ink, &BubbleRegion::new(5, 5, 20, 20), 0.0), 1.0);
        assert_eq!(fill_ratio(&ink, &BubbleRegion::new(50, 50, 5, 5), 0.0), 0.0);
    }
}
