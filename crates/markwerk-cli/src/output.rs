// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Writing batch results to disk and summarising them for the terminal.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use markwerk_core::AnswerKey;
use markwerk_core::config::ReportConfig;
use markwerk_core::error::Result;
use markwerk_grading::BatchOutcome;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const RESULTS_FILE: &str = "results.json";
pub const REPORT_FILE: &str = "report.json";
pub const MANIFEST_FILE: &str = "run.json";

/// What was graded, against which key, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub generated_at: DateTime<Utc>,
    pub exam_title: String,
    pub total_questions: usize,
    pub options_per_question: usize,
    pub input: PathBuf,
    pub sheets: usize,
}

impl RunManifest {
    pub fn new(key: &AnswerKey, input: &Path, sheets: usize) -> Self {
        Self {
            generated_at: Utc::now(),
            exam_title: key.info().title.clone(),
            total_questions: key.len(),
            options_per_question: key.options_per_question(),
            input: input.to_path_buf(),
            sheets,
        }
    }
}

/// Write `results.json`, `report.json` and `run.json` into `dir`, creating
/// it if needed.
pub fn write_outcome(dir: &Path, outcome: &BatchOutcome, manifest: &RunManifest) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    write_json(&dir.join(RESULTS_FILE), &outcome.results)?;
    write_json(&dir.join(REPORT_FILE), &outcome.report)?;
    write_json(&dir.join(MANIFEST_FILE), manifest)?;
    info!(dir = %dir.display(), sheets = outcome.results.len(), "Results written");
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Human-readable batch summary. Buckets are listed in configured order.
pub fn render_summary(outcome: &BatchOutcome, config: &ReportConfig) -> String {
    let summary = &outcome.report.summary;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Sheets: {} processed, {} failed ({:.2}% success)",
        summary.total_sheets_processed, summary.sheets_failed, summary.success_rate
    );
    let _ = writeln!(
        out,
        "Score: average {:.2}, median {:.2}",
        summary.average_score, summary.median_score
    );
    let _ = writeln!(
        out,
        "Confidence: average {:.2}, grid found on {:.2}% of sheets",
        summary.average_confidence, outcome.report.pipeline_accuracy.grid_detection_success_rate
    );

    let _ = writeln!(out, "Distribution:");
    for bucket in &config.score_buckets {
        let count = outcome
            .report
            .score_distribution
            .get(&bucket.label)
            .copied()
            .unwrap_or(0);
        let _ = writeln!(out, "  {:>8}  {count}", bucket.label);
    }

    let failed: Vec<_> = outcome.results.iter().filter(|r| !r.is_success()).collect();
    if !failed.is_empty() {
        let _ = writeln!(out, "Failed sheets:");
        for result in failed {
            for error in &result.processing_errors {
                let _ = writeln!(out, "  {}: {}", result.student_id, error.message);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use markwerk_core::types::SheetResult;
    use markwerk_core::{ExamInfo, OmrError};
    use markwerk_grading::BatchAggregator;

    fn outcome() -> BatchOutcome {
        let mut good = SheetResult::failed("s_01", &OmrError::Image("x".into()), true);
        good.processing_errors.clear();
        good.score = 85.0;
        good.confidence = 0.9;
        let bad = SheetResult::failed(
            "s_02",
            &OmrError::GridDetection("sheet boundary not found".into()),
            false,
        );
        let results = vec![good, bad];
        let report = results
            .iter()
            .collect::<BatchAggregator>()
            .report(&ReportConfig::default());
        BatchOutcome { results, report }
    }

    fn key() -> AnswerKey {
        let info = ExamInfo {
            title: "Quiz".into(),
            date: None,
            total_questions: 2,
            options_per_question: 4,
        };
        AnswerKey::new(info, vec![0, 1], vec![1.0, 1.0]).unwrap()
    }

    #[test]
    fn writes_all_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out");
        let outcome = outcome();
        let manifest = RunManifest::new(&key(), Path::new("scans"), 2);
        write_outcome(&out, &outcome, &manifest).unwrap();

        let results: Vec<SheetResult> =
            serde_json::from_str(&std::fs::read_to_string(out.join(RESULTS_FILE)).unwrap()).unwrap();
        assert_eq!(results, outcome.results);
        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join(REPORT_FILE)).unwrap()).unwrap();
        assert_eq!(report["summary"]["sheets_failed"], 1);
        let written: RunManifest =
            serde_json::from_str(&std::fs::read_to_string(out.join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(written, manifest);
    }

    #[test]
    fn summary_lists_failures_and_buckets_in_order() {
        let text = render_summary(&outcome(), &ReportConfig::default());
        assert!(text.contains("2 processed, 1 failed (50.00% success)"));
        assert!(text.contains("s_02: grid detection failed: sheet boundary not found"));
        let top = text.find("90-100").unwrap();
        let bottom = text.find("0-59").unwrap();
        assert!(top < bottom);
    }
}
