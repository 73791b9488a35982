// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch statistics. The accumulator is mergeable and its report does not
// depend on the order sheets were added in, so partial tallies from
// concurrent workers can be combined in any grouping.

use std::collections::BTreeMap;

use markwerk_core::config::ReportConfig;
use markwerk_core::types::{
    BatchReport, PipelineAccuracy, ReportSummary, Selection, SheetResult, round2,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchAggregator {
    total: u64,
    failed: u64,
    grid_detected: u64,
    error_entries: u64,
    /// Scores of successfully scored sheets, in arrival order.
    scores: Vec<f64>,
    confidences: Vec<f64>,
    truth_checked: u64,
    truth_matched: u64,
}

impl BatchAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sheet into the tally.
    pub fn add(&mut self, result: &SheetResult) {
        self.total += 1;
        self.error_entries += result.processing_errors.len() as u64;
        if result.grid_detected {
            self.grid_detected += 1;
        }
        if result.is_success() {
            self.scores.push(result.score);
            self.confidences.push(result.confidence);
        } else {
            self.failed += 1;
        }
    }

    /// Fold one sheet in and compare its selections with known answers.
    ///
    /// Questions of a failed sheet count as misread.
    pub fn add_with_truth(&mut self, result: &SheetResult, truth: &[Selection]) {
        self.add(result);
        self.truth_checked += truth.len() as u64;
        self.truth_matched += result
            .answers
            .iter()
            .zip(truth)
            .filter(|(answer, expected)| answer.selected == **expected)
            .count() as u64;
    }

    /// Combine two tallies.
    pub fn merge(mut self, other: Self) -> Self {
        self.total += other.total;
        self.failed += other.failed;
        self.grid_detected += other.grid_detected;
        self.error_entries += other.error_entries;
        self.scores.extend(other.scores);
        self.confidences.extend(other.confidences);
        self.truth_checked += other.truth_checked;
        self.truth_matched += other.truth_matched;
        self
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Produce the batch report. Percentages and means are rounded to two
    /// decimals; averages, the median, and the distribution cover scored
    /// sheets only.
    pub fn report(&self, config: &ReportConfig) -> BatchReport {
        let scores = sorted(&self.scores);
        let confidences = sorted(&self.confidences);
        let average_confidence = mean(&confidences);

        let mut score_distribution: BTreeMap<String, u64> = config
            .score_buckets
            .iter()
            .map(|bucket| (bucket.label.clone(), 0))
            .collect();
        for &score in &scores {
            if let Some(label) = config.bucket_for(score) {
                *score_distribution.entry(label.to_string()).or_default() += 1;
            }
        }

        let mark_detection_accuracy = if self.truth_checked > 0 {
            percentage(self.truth_matched, self.truth_checked)
        } else {
            average_confidence * 100.0
        };

        BatchReport {
            summary: ReportSummary {
                total_sheets_processed: self.total,
                sheets_failed: self.failed,
                average_score: round2(mean(&scores)),
                median_score: round2(median(&scores)),
                average_confidence: round2(average_confidence),
                success_rate: round2(percentage(self.total - self.failed, self.total)),
                processing_errors: self.error_entries,
            },
            score_distribution,
            pipeline_accuracy: PipelineAccuracy {
                mark_detection_accuracy: round2(mark_detection_accuracy),
                grid_detection_success_rate: round2(percentage(self.grid_detected, self.total)),
            },
        }
    }
}

impl<'a> Extend<&'a SheetResult> for BatchAggregator {
    fn extend<I: IntoIterator<Item = &'a SheetResult>>(&mut self, iter: I) {
        for result in iter {
            self.add(result);
        }
    }
}

impl<'a> FromIterator<&'a SheetResult> for BatchAggregator {
    fn from_iter<I: IntoIterator<Item = &'a SheetResult>>(iter: I) -> Self {
        let mut aggregator = Self::new();
        aggregator.extend(iter);
        aggregator
    }
}

// Sorting before summing makes the float results independent of arrival order.
fn sorted(values: &[f64]) -> Vec<f64> {
    let mut values = values.to_vec();
    values.sort_by(f64::total_cmp);
    values
}

fn mean(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.iter().sum::<f64>() / sorted.len() as f64
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markwerk_core::OmrError;
    use markwerk_core::types::QuestionResult;

    fn scored(id: &str, score: f64, confidence: f64) -> SheetResult {
        SheetResult {
            student_id: id.into(),
            score,
            correct_answers: 0,
            incorrect_answers: 0,
            blank_answers: 0,
            ambiguous_answers: 0,
            confidence,
            grid_detected: true,
            answers: Vec::new(),
            processing_errors: Vec::new(),
        }
    }

    fn failed(id: &str) -> SheetResult {
        SheetResult::failed(id, &OmrError::GridDetection("sheet boundary not found".into()), false)
    }

    #[test]
    fn empty_batch_reports_zeros() {
        let report = BatchAggregator::new().report(&ReportConfig::default());
        assert_eq!(report.summary.total_sheets_processed, 0);
        assert_eq!(report.summary.success_rate, 0.0);
        assert_eq!(report.summary.average_score, 0.0);
        assert!(report.score_distribution.values().all(|&n| n == 0));
    }

    #[test]
    fn summary_covers_scored_sheets() {
        let results = [
            scored("a", 95.0, 0.9),
            scored("b", 72.5, 0.7),
            scored("c", 40.0, 0.8),
            failed("d"),
        ];
        let report = results.iter().collect::<BatchAggregator>().report(&ReportConfig::default());
        assert_eq!(report.summary.total_sheets_processed, 4);
        assert_eq!(report.summary.sheets_failed, 1);
        assert_eq!(report.summary.average_score, 69.17);
        assert_eq!(report.summary.median_score, 72.5);
        assert_eq!(report.summary.average_confidence, 0.8);
        assert_eq!(report.summary.success_rate, 75.0);
        assert_eq!(report.summary.processing_errors, 1);
        assert_eq!(report.score_distribution["90-100"], 1);
        assert_eq!(report.score_distribution["70-79"], 1);
        assert_eq!(report.score_distribution["0-59"], 1);
        assert_eq!(report.pipeline_accuracy.grid_detection_success_rate, 75.0);
        assert_eq!(report.pipeline_accuracy.mark_detection_accuracy, 80.0);
    }

    #[test]
    fn merge_is_order_independent() {
        let results: Vec<SheetResult> = (0..30)
            .map(|i| {
                if i % 7 == 0 {
                    failed(&format!("s{i}"))
                } else {
                    scored(&format!("s{i}"), (i * 37 % 101) as f64 * 0.99, 0.5 + (i % 5) as f64 * 0.1)
                }
            })
            .collect();
        let config = ReportConfig::default();

        let whole: BatchAggregator = results.iter().collect();
        let left: BatchAggregator = results[..11].iter().collect();
        let right: BatchAggregator = results[11..].iter().rev().collect();
        let merged = right.merge(left);

        assert_eq!(whole.report(&config), merged.report(&config));
    }

    #[test]
    fn even_count_median_is_midpoint() {
        let results = [scored("a", 60.0, 1.0), scored("b", 80.0, 1.0)];
        let report = results.iter().collect::<BatchAggregator>().report(&ReportConfig::default());
        assert_eq!(report.summary.median_score, 70.0);
    }

    #[test]
    fn ground_truth_drives_mark_accuracy() {
        let mut sheet = scored("a", 50.0, 0.2);
        sheet.answers = vec![
            QuestionResult {
                question: 0,
                selected: Selection::Option(0),
                confidence: 0.2,
                flags: Vec::new(),
            },
            QuestionResult {
                question: 1,
                selected: Selection::Blank,
                confidence: 0.2,
                flags: Vec::new(),
            },
        ];
        let mut aggregator = BatchAggregator::new();
        aggregator.add_with_truth(&sheet, &[Selection::Option(0), Selection::Option(1)]);
        aggregator.add_with_truth(&failed("b"), &[Selection::Option(0), Selection::Option(1)]);
        let report = aggregator.report(&ReportConfig::default());
        assert_eq!(report.pipeline_accuracy.mark_detection_accuracy, 25.0);
    }
}
