// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The grading run: load key and settings, collect scans, run the batch,
// write the results.

use std::path::{Path, PathBuf};

use markwerk_core::error::Result;
use markwerk_core::{AnswerKey, OmrConfig};
use markwerk_grading::{BatchOutcome, BatchRunner};
use tracing::info;

use crate::inputs;
use crate::output::{self, RunManifest};

/// Options for one grading run.
#[derive(Debug, Clone)]
pub struct GradeOptions {
    pub answer_key: PathBuf,
    pub input: PathBuf,
    pub config: Option<PathBuf>,
    pub output: PathBuf,
    /// Overrides `batch.concurrency_limit` from the settings file.
    pub concurrency: Option<usize>,
}

/// Everything the binary reports after a run.
#[derive(Debug)]
pub struct GradeRun {
    pub outcome: BatchOutcome,
    pub config: OmrConfig,
    pub manifest: RunManifest,
}

pub fn load_config(path: Option<&Path>) -> Result<OmrConfig> {
    match path {
        Some(path) => OmrConfig::from_json(&std::fs::read_to_string(path)?),
        None => Ok(OmrConfig::default()),
    }
}

pub async fn execute(options: &GradeOptions) -> Result<GradeRun> {
    let key = AnswerKey::from_json(&std::fs::read_to_string(&options.answer_key)?)?;
    let mut config = load_config(options.config.as_deref())?;
    if let Some(limit) = options.concurrency {
        config.batch.concurrency_limit = limit;
    }
    let runner = BatchRunner::new(&config, key)?;

    let paths = inputs::collect_images(&options.input)?;
    info!(input = %options.input.display(), scans = paths.len(), "Scans collected");
    let manifest = RunManifest::new(runner.pipeline().key(), &options.input, paths.len());

    let outcome = runner.run(inputs::sheets(paths)).await?;
    output::write_outcome(&options.output, &outcome, &manifest)?;

    Ok(GradeRun {
        outcome,
        config,
        manifest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use markwerk_core::types::{Selection, SheetShape};
    use markwerk_core::{ErrorKind, OmrError};
    use markwerk_vision::synthetic::SyntheticSheet;

    const KEY: &str = r#"{
        "exam_info": {
            "title": "Unit Quiz",
            "date": "2026-03-02",
            "total_questions": 4,
            "options_per_question": 4
        },
        "answers": ["A", "B", "C", "D"]
    }"#;

    fn options(dir: &Path) -> GradeOptions {
        GradeOptions {
            answer_key: dir.join("key.json"),
            input: dir.join("scans"),
            config: None,
            output: dir.join("out"),
            concurrency: Some(2),
        }
    }

    #[tokio::test]
    async fn grades_a_folder_of_scans() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("key.json"), KEY).unwrap();
        let scans = dir.path().join("scans");
        std::fs::create_dir(&scans).unwrap();

        let selections = [
            Selection::Option(0),
            Selection::Option(1),
            Selection::Option(2),
            Selection::Blank,
        ];
        SyntheticSheet::new(SheetShape::new(4, 4))
            .with_selections(&selections)
            .render()
            .unwrap()
            .save(scans.join("student_001.png"))
            .unwrap();
        std::fs::write(scans.join("student_002.png"), b"not a png").unwrap();
        std::fs::write(scans.join("roster.csv"), b"id\n").unwrap();

        let run = execute(&options(dir.path())).await.unwrap();
        let results = &run.outcome.results;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].student_id, "student_001");
        assert_eq!(results[0].score, 75.0);
        assert_eq!(results[1].processing_errors[0].kind, ErrorKind::Image);
        assert_eq!(run.outcome.report.summary.success_rate, 50.0);
        assert_eq!(run.manifest.exam_title, "Unit Quiz");
        assert!(dir.path().join("out").join(output::RESULTS_FILE).is_file());
        assert!(dir.path().join("out").join(output::REPORT_FILE).is_file());
    }

    #[tokio::test]
    async fn malformed_key_stops_before_grading() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("key.json"), r#"{"answers": ["A"]}"#).unwrap();
        std::fs::create_dir(dir.path().join("scans")).unwrap();

        let err = execute(&options(dir.path())).await.unwrap_err();
        assert!(matches!(err, OmrError::Config(_)));
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn zero_concurrency_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("key.json"), KEY).unwrap();
        std::fs::create_dir(dir.path().join("scans")).unwrap();
        let mut options = options(dir.path());
        options.concurrency = Some(0);

        assert!(matches!(execute(&options).await, Err(OmrError::Config(_))));
    }

    #[test]
    fn settings_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"batch": {"concurrency_limit": 3}}"#).unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.batch.concurrency_limit, 3);
        assert_eq!(load_config(None).unwrap().batch.concurrency_limit, OmrConfig::default().batch.concurrency_limit);
    }
}
