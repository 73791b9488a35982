// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Weighted scoring of classified answers against the answer key.

use std::sync::Arc;

use markwerk_core::config::ScoringConfig;
use markwerk_core::error::{OmrError, Result};
use markwerk_core::types::{QuestionResult, Selection};
use markwerk_core::AnswerKey;
use serde::{Deserialize, Serialize};

/// Score and answer counts for one sheet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    /// `100 × earned weight / total weight`.
    pub score: f64,
    pub correct: u32,
    /// Resolved to a single option that is not accepted.
    pub incorrect: u32,
    pub blank: u32,
    pub ambiguous: u32,
}

#[derive(Debug, Clone)]
pub struct Scorer {
    key: Arc<AnswerKey>,
    allow_alternates: bool,
}

impl Scorer {
    pub fn new(key: Arc<AnswerKey>, config: &ScoringConfig) -> Self {
        Self {
            key,
            allow_alternates: config.allow_alternate_answers,
        }
    }

    pub fn key(&self) -> &AnswerKey {
        &self.key
    }

    /// Whether a selection earns the question's weight. Blank and ambiguous
    /// answers never do.
    pub fn is_correct(&self, question: usize, selection: Selection) -> bool {
        let Selection::Option(chosen) = selection else {
            return false;
        };
        if self.key.answers().get(question) == Some(&chosen) {
            return true;
        }
        self.allow_alternates && self.key.alternates(question).contains(&chosen)
    }

    /// Score a sheet's answers, which must cover every question of the key.
    pub fn score(&self, answers: &[QuestionResult]) -> Result<ScoreCard> {
        if answers.len() != self.key.len() {
            return Err(OmrError::Scoring {
                expected: self.key.len(),
                actual: answers.len(),
            });
        }

        let mut card = ScoreCard {
            score: 0.0,
            correct: 0,
            incorrect: 0,
            blank: 0,
            ambiguous: 0,
        };
        let mut earned = 0.0;
        for (q, (answer, weight)) in answers.iter().zip(self.key.weights()).enumerate() {
            match answer.selected {
                Selection::Blank => card.blank += 1,
                Selection::Ambiguous => card.ambiguous += 1,
                Selection::Option(_) if self.is_correct(q, answer.selected) => {
                    card.correct += 1;
                    earned += weight;
                }
                Selection::Option(_) => card.incorrect += 1,
            }
        }

        // Same summation order as the total, so a perfect sheet is exactly 100.
        let total = self.key.total_weight();
        card.score = if earned == total {
            100.0
        } else {
            (100.0 * earned / total).clamp(0.0, 100.0)
        };
        Ok(card)
    }
}
