// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Confidence estimation: how clear each decision was, per question and per
// sheet, plus the review flags derived from it.

use markwerk_core::config::{ConfidenceConfig, MarkConfig};
use markwerk_core::types::{QuestionFlag, QuestionResult, Selection};

use crate::classify::QuestionMarks;

/// Turns classifier output into per-question results with confidence and flags.
#[derive(Debug, Clone)]
pub struct ConfidenceEstimator {
    fill_threshold: f64,
    floor: f64,
}

impl ConfidenceEstimator {
    pub fn new(marks: &MarkConfig, confidence: &ConfidenceConfig) -> Self {
        Self {
            fill_threshold: marks.fill_threshold,
            floor: confidence.confidence_floor,
        }
    }

    /// Confidence in [0, 1] for one decision.
    ///
    /// A marked or ambiguous question scores the top option's relative lead
    /// over the runner-up; a blank question scores how far the strongest
    /// bubble stayed below the threshold.
    pub fn question_confidence(&self, marks: &QuestionMarks) -> f64 {
        let raw = match marks.selection {
            Selection::Blank => (self.fill_threshold - marks.top_fill) / self.fill_threshold,
            Selection::Option(_) | Selection::Ambiguous => {
                if marks.top_fill <= 0.0 {
                    0.0
                } else {
                    (marks.top_fill - marks.runner_up_fill) / marks.top_fill
                }
            }
        };
        raw.clamp(0.0, 1.0)
    }

    /// Build the per-question results, in question order.
    pub fn assess(&self, marks: &[QuestionMarks]) -> Vec<QuestionResult> {
        marks
            .iter()
            .map(|m| {
                let confidence = self.question_confidence(m);
                let mut flags = Vec::new();
                match m.selection {
                    Selection::Ambiguous => flags.push(QuestionFlag::MultipleMarks),
                    Selection::Blank => flags.push(QuestionFlag::Blank),
                    Selection::Option(_) => {}
                }
                if confidence < self.floor {
                    flags.push(QuestionFlag::LowConfidence);
                }
                flags.sort();
                QuestionResult {
                    question: m.question,
                    selected: m.selection,
                    confidence,
                    flags,
                }
            })
            .collect()
    }

    /// Weighted mean of question confidences.
    ///
    /// Falls back to equal weights when `weights` does not line up with the
    /// results. An empty sheet has confidence 0.
    pub fn sheet_confidence(&self, results: &[QuestionResult], weights: &[f64]) -> f64 {
        if results.is_empty() {
            return 0.0;
        }
        if weights.len() != results.len() {
            return results.iter().map(|r| r.confidence).sum::<f64>() / results.len() as f64;
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        let weighted: f64 = results
            .iter()
            .zip(weights)
            .map(|(r, w)| r.confidence * w)
            .sum();
        (weighted / total).clamp(0.0, 1.0)
    }
}
