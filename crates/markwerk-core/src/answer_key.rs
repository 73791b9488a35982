// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Answer key: the correct option and weight for every question of an exam.
// Loaded once per batch, validated, then shared read-only by every sheet.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{OmrError, Result};
use crate::types::{SheetShape, option_index, option_letter};

/// Descriptive header of an answer key document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub total_questions: usize,
    pub options_per_question: usize,
}

/// On-disk shape of the answer key, before validation.
#[derive(Debug, Deserialize)]
struct RawAnswerKey {
    exam_info: ExamInfo,
    answers: Vec<String>,
    #[serde(default)]
    question_weights: Option<Vec<f64>>,
    #[serde(default)]
    accepted_answers: Option<Vec<Vec<String>>>,
}

/// A validated answer key. Construct with [`AnswerKey::from_json`] or
/// [`AnswerKey::new`]; the fields cannot drift out of agreement afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerKey {
    info: ExamInfo,
    answers: Vec<usize>,
    weights: Vec<f64>,
    alternates: Vec<Vec<usize>>,
}

impl AnswerKey {
    /// Parse and validate an answer key document.
    #[instrument(skip(json), fields(json_len = json.len()))]
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawAnswerKey = serde_json::from_str(json)
            .map_err(|err| OmrError::Config(format!("malformed answer key: {err}")))?;

        let options = raw.exam_info.options_per_question;
        let answers = raw
            .answers
            .iter()
            .enumerate()
            .map(|(q, letter)| parse_letter(q, letter, options))
            .collect::<Result<Vec<_>>>()?;

        let alternates = match raw.accepted_answers {
            Some(lists) => {
                if lists.len() != raw.exam_info.total_questions {
                    return Err(OmrError::Config(format!(
                        "accepted_answers has {} entries, expected {}",
                        lists.len(),
                        raw.exam_info.total_questions
                    )));
                }
                lists
                    .iter()
                    .enumerate()
                    .map(|(q, letters)| {
                        letters
                            .iter()
                            .map(|letter| parse_letter(q, letter, options))
                            .collect::<Result<Vec<_>>>()
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            None => Vec::new(),
        };

        let weights = raw
            .question_weights
            .unwrap_or_else(|| vec![1.0; raw.exam_info.total_questions]);

        let key = Self::build(raw.exam_info, answers, weights, alternates)?;
        info!(
            title = %key.info.title,
            questions = key.len(),
            options = key.options_per_question(),
            "answer key loaded"
        );
        Ok(key)
    }

    /// Build a key from option indices and weights.
    pub fn new(
        info: ExamInfo,
        answers: Vec<usize>,
        weights: Vec<f64>,
    ) -> Result<Self> {
        Self::build(info, answers, weights, Vec::new())
    }

    /// Attach per-question alternate options (same length as the key).
    pub fn with_alternates(mut self, alternates: Vec<Vec<usize>>) -> Result<Self> {
        if alternates.len() != self.len() {
            return Err(OmrError::Config(format!(
                "alternates has {} entries, expected {}",
                alternates.len(),
                self.len()
            )));
        }
        check_indices(&alternates.concat(), self.options_per_question())?;
        self.alternates = alternates;
        Ok(self)
    }

    fn build(
        info: ExamInfo,
        answers: Vec<usize>,
        weights: Vec<f64>,
        alternates: Vec<Vec<usize>>,
    ) -> Result<Self> {
        if info.total_questions == 0 {
            return Err(OmrError::Config("total_questions must be at least 1".into()));
        }
        if !(2..=26).contains(&info.options_per_question) {
            return Err(OmrError::Config(format!(
                "options_per_question must lie in 2..=26, got {}",
                info.options_per_question
            )));
        }
        if answers.len() != info.total_questions {
            return Err(OmrError::Config(format!(
                "answers has {} entries, total_questions is {}",
                answers.len(),
                info.total_questions
            )));
        }
        if weights.len() != info.total_questions {
            return Err(OmrError::Config(format!(
                "question_weights has {} entries, total_questions is {}",
                weights.len(),
                info.total_questions
            )));
        }
        if let Some((q, w)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| !(w.is_finite() && **w > 0.0))
        {
            return Err(OmrError::Config(format!(
                "question {} has non-positive weight {w}",
                q + 1
            )));
        }
        check_indices(&answers, info.options_per_question)?;

        Ok(Self {
            info,
            answers,
            weights,
            alternates,
        })
    }

    pub fn info(&self) -> &ExamInfo {
        &self.info
    }

    /// Number of questions.
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn options_per_question(&self) -> usize {
        self.info.options_per_question
    }

    /// Questions × options this key expects on every sheet.
    pub fn shape(&self) -> SheetShape {
        SheetShape::new(self.len(), self.options_per_question())
    }

    /// Correct option index for each question.
    pub fn answers(&self) -> &[usize] {
        &self.answers
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Sum of all question weights.
    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Extra options accepted for a question, if alternates were supplied.
    pub fn alternates(&self, question: usize) -> &[usize] {
        self.alternates
            .get(question)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Correct letters, for display.
    pub fn answer_letters(&self) -> String {
        self.answers.iter().map(|&i| option_letter(i)).collect()
    }
}

fn parse_letter(question: usize, letter: &str, options: usize) -> Result<usize> {
    let trimmed = letter.trim();
    let mut chars = trimmed.chars();
    let index = match (chars.next(), chars.next()) {
        (Some(c), None) => option_index(c),
        _ => None,
    };
    match index {
        Some(i) if i < options => Ok(i),
        _ => Err(OmrError::Config(format!(
            "question {}: {letter:?} is not one of the {options} option letters",
            question + 1
        ))),
    }
}

fn check_indices(indices: &[usize], options: usize) -> Result<()> {
    match indices.iter().find(|&&i| i >= options) {
        Some(bad) => Err(OmrError::Config(format!(
            "option index {bad} out of range for {options} options"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "exam_info": {
            "title": "Sample Mathematics Exam",
            "date": "2024-01-15",
            "total_questions": 4,
            "options_per_question": 4
        },
        "answers": ["A", "b", "C", "D"],
        "question_weights": [1, 1, 2, 1]
    }"#;

    #[test]
    fn loads_sample_key() {
        let key = AnswerKey::from_json(SAMPLE).unwrap();
        assert_eq!(key.len(), 4);
        assert_eq!(key.answers(), &[0, 1, 2, 3]);
        assert_eq!(key.total_weight(), 5.0);
        assert_eq!(key.answer_letters(), "ABCD");
        assert_eq!(
            key.info().date,
            Some(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
        assert_eq!(key.shape().bubble_count(), 16);
    }

    #[test]
    fn missing_weights_are_uniform() {
        let json = r#"{
            "exam_info": {"total_questions": 2, "options_per_question": 4},
            "answers": ["A", "B"]
        }"#;
        let key = AnswerKey::from_json(json).unwrap();
        assert_eq!(key.weights(), &[1.0, 1.0]);
    }

    #[test]
    fn length_mismatch_is_config_error() {
        let json = r#"{
            "exam_info": {"total_questions": 3, "options_per_question": 4},
            "answers": ["A", "B"],
            "question_weights": [1, 1, 1]
        }"#;
        assert!(matches!(AnswerKey::from_json(json), Err(OmrError::Config(_))));
    }

    #[test]
    fn weight_count_mismatch_is_config_error() {
        let json = r#"{
            "exam_info": {"total_questions": 2, "options_per_question": 4},
            "answers": ["A", "B"],
            "question_weights": [1]
        }"#;
        assert!(matches!(AnswerKey::from_json(json), Err(OmrError::Config(_))));
    }

    #[test]
    fn non_positive_weight_is_rejected() {
        let json = r#"{
            "exam_info": {"total_questions": 2, "options_per_question": 4},
            "answers": ["A", "B"],
            "question_weights": [1, 0]
        }"#;
        assert!(matches!(AnswerKey::from_json(json), Err(OmrError::Config(_))));
    }

    #[test]
    fn letter_outside_option_range_is_rejected() {
        let json = r#"{
            "exam_info": {"total_questions": 1, "options_per_question": 4},
            "answers": ["E"]
        }"#;
        assert!(matches!(AnswerKey::from_json(json), Err(OmrError::Config(_))));
    }

    #[test]
    fn accepted_answers_are_parsed() {
        let json = r#"{
            "exam_info": {"total_questions": 2, "options_per_question": 4},
            "answers": ["A", "B"],
            "accepted_answers": [["C"], []]
        }"#;
        let key = AnswerKey::from_json(json).unwrap();
        assert_eq!(key.alternates(0), &[2]);
        assert!(key.alternates(1).is_empty());
    }
}
