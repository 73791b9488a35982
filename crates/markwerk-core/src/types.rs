// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Markwerk OMR engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, OmrError};

/// Wire encoding of an ambiguous answer.
pub const AMBIGUOUS_MARKER: &str = "MULTIPLE";

/// Number of questions and options a sheet is expected to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SheetShape {
    pub questions: usize,
    pub options: usize,
}

impl SheetShape {
    pub fn new(questions: usize, options: usize) -> Self {
        Self { questions, options }
    }

    /// Total bubble count (`questions × options`).
    pub fn bubble_count(&self) -> usize {
        self.questions * self.options
    }
}

/// Letter shown on the sheet for an option index (0 → 'A').
pub fn option_letter(index: usize) -> char {
    (b'A' + index as u8) as char
}

/// Option index for a letter, case-insensitive ('c' → 2).
pub fn option_index(letter: char) -> Option<usize> {
    let upper = letter.to_ascii_uppercase();
    upper
        .is_ascii_uppercase()
        .then(|| (upper as u8 - b'A') as usize)
}

/// What the classifier decided for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Selection {
    /// A single option, by index.
    Option(usize),
    /// No bubble filled.
    Blank,
    /// Several bubbles filled without a clear winner.
    Ambiguous,
}

impl Selection {
    /// Parse an answer letter; `""` is blank and `"MULTIPLE"` is ambiguous.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Some(Self::Blank);
        }
        if trimmed.eq_ignore_ascii_case(AMBIGUOUS_MARKER) {
            return Some(Self::Ambiguous);
        }
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(letter), None) => option_index(letter).map(Self::Option),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Option(_))
    }
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Option(index) => write!(f, "{}", option_letter(*index)),
            Self::Blank => Ok(()),
            Self::Ambiguous => f.write_str(AMBIGUOUS_MARKER),
        }
    }
}

impl From<Selection> for String {
    fn from(selection: Selection) -> Self {
        selection.to_string()
    }
}

impl TryFrom<String> for Selection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("not an answer letter: {value:?}"))
    }
}

/// Informational markers attached to a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionFlag {
    MultipleMarks,
    LowConfidence,
    Blank,
}

/// Classification outcome for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    /// Zero-based question index.
    pub question: usize,
    pub selected: Selection,
    /// Certainty in [0, 1].
    pub confidence: f64,
    /// Sorted, without duplicates.
    pub flags: Vec<QuestionFlag>,
}

impl QuestionResult {
    pub fn has_flag(&self, flag: QuestionFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// One entry of a sheet's `processing_errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&OmrError> for ProcessingError {
    fn from(err: &OmrError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Final, immutable outcome of one sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetResult {
    pub student_id: String,
    /// Weighted score in [0, 100].
    pub score: f64,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
    pub blank_answers: u32,
    pub ambiguous_answers: u32,
    /// Weighted mean of per-question confidences.
    pub confidence: f64,
    /// Whether a valid grid was resolved for this sheet.
    pub grid_detected: bool,
    pub answers: Vec<QuestionResult>,
    pub processing_errors: Vec<ProcessingError>,
}

impl SheetResult {
    /// Zero-data result for a sheet that failed before it could be scored.
    pub fn failed(student_id: impl Into<String>, err: &OmrError, grid_detected: bool) -> Self {
        Self {
            student_id: student_id.into(),
            score: 0.0,
            correct_answers: 0,
            incorrect_answers: 0,
            blank_answers: 0,
            ambiguous_answers: 0,
            confidence: 0.0,
            grid_detected,
            answers: Vec::new(),
            processing_errors: vec![ProcessingError::from(err)],
        }
    }

    /// A sheet without processing errors was scored.
    pub fn is_success(&self) -> bool {
        self.processing_errors.is_empty()
    }

    /// Selections in question order.
    pub fn selections(&self) -> Vec<Selection> {
        self.answers.iter().map(|a| a.selected).collect()
    }
}

/// Batch-level headline numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_sheets_processed: u64,
    pub sheets_failed: u64,
    pub average_score: f64,
    pub median_score: f64,
    pub average_confidence: f64,
    /// Percentage of sheets without a fatal error.
    pub success_rate: f64,
    pub processing_errors: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineAccuracy {
    /// Percentage; mean confidence, or ground-truth accuracy when supplied.
    pub mark_detection_accuracy: f64,
    /// Percentage of sheets with a valid grid.
    pub grid_detection_success_rate: f64,
}

/// Aggregated statistics over a batch of sheets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub summary: ReportSummary,
    pub score_distribution: BTreeMap<String, u64>,
    pub pipeline_accuracy: PipelineAccuracy,
}

/// Round to two decimals, as reported figures are.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_wire_format() {
        assert_eq!(serde_json::to_string(&Selection::Option(2)).unwrap(), "\"C\"");
        assert_eq!(serde_json::to_string(&Selection::Blank).unwrap(), "\"\"");
        assert_eq!(
            serde_json::to_string(&Selection::Ambiguous).unwrap(),
            "\"MULTIPLE\""
        );
        let parsed: Selection = serde_json::from_str("\"b\"").unwrap();
        assert_eq!(parsed, Selection::Option(1));
    }

    #[test]
    fn selection_rejects_words() {
        assert!(Selection::parse("AB").is_none());
        assert!(Selection::parse("1").is_none());
        assert_eq!(Selection::parse("  "), Some(Selection::Blank));
    }

    #[test]
    fn failed_sheet_records_kind() {
        let err = OmrError::GridDetection("boundary not found".into());
        let sheet = SheetResult::failed("s-01", &err, false);
        assert!(!sheet.is_success());
        assert_eq!(sheet.processing_errors[0].kind, ErrorKind::GridDetection);
        assert!(sheet.processing_errors[0].message.contains("boundary not found"));
        assert_eq!(sheet.score, 0.0);
    }

    #[test]
    fn option_letters() {
        assert_eq!(option_letter(0), 'A');
        assert_eq!(option_letter(3), 'D');
        assert_eq!(option_index('d'), Some(3));
        assert_eq!(option_index('?'), None);
    }

    #[test]
    fn rounding() {
        assert_eq!(round2(96.0), 96.0);
        assert_eq!(round2(66.666_666), 66.67);
    }
}
