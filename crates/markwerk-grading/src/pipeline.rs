// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-sheet pipeline: normalise → locate grid → classify → estimate
// confidence → score. Synchronous and free of shared mutable state, so many
// sheets can run through one pipeline at once.

use std::path::Path;
use std::sync::Arc;

use markwerk_core::error::{OmrError, Result};
use markwerk_core::types::SheetResult;
use markwerk_core::{AnswerKey, OmrConfig};
use markwerk_vision::{
    ConfidenceEstimator, GridLocator, ImageNormalizer, MarkClassifier, OwnedRaster, RasterRef,
};
use tracing::{debug, info, instrument, warn};

use crate::scoring::Scorer;

/// Everything needed to turn one raster into a [`SheetResult`].
#[derive(Debug)]
pub struct SheetPipeline {
    normalizer: ImageNormalizer,
    locator: GridLocator,
    classifier: MarkClassifier,
    estimator: ConfidenceEstimator,
    scorer: Scorer,
}

impl SheetPipeline {
    pub fn new(config: &OmrConfig, key: Arc<AnswerKey>) -> Self {
        Self {
            normalizer: ImageNormalizer::new(config.preprocess.clone()),
            locator: GridLocator::from_config(&config.grid),
            classifier: MarkClassifier::new(config.marks.clone()),
            estimator: ConfidenceEstimator::new(&config.marks, &config.confidence),
            scorer: Scorer::new(key, &config.scoring),
        }
    }

    /// Swap in a different grid locator (for custom strategies).
    pub fn with_locator(mut self, locator: GridLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn key(&self) -> &AnswerKey {
        self.scorer.key()
    }

    /// Process one sheet. Sheet-level failures are recorded in the result's
    /// `processing_errors`; this never fails the caller.
    #[instrument(skip(self, raster))]
    pub fn process(&self, student_id: &str, raster: RasterRef<'_>) -> SheetResult {
        let mut grid_detected = false;
        match self.run(student_id, raster, &mut grid_detected) {
            Ok(result) => {
                info!(
                    score = result.score,
                    confidence = result.confidence,
                    "Sheet scored"
                );
                result
            }
            Err(err) => {
                warn!(error = %err, grid_detected, "Sheet failed");
                SheetResult::failed(student_id, &err, grid_detected)
            }
        }
    }

    /// Decode an encoded image file and process it. Decoding failures are
    /// recorded like any other sheet failure.
    pub fn process_encoded(&self, student_id: &str, bytes: &[u8]) -> SheetResult {
        match OwnedRaster::decode(bytes) {
            Ok(raster) => self.process(student_id, raster.as_raster()),
            Err(err) => {
                warn!(student_id, error = %err, "Sheet could not be decoded");
                SheetResult::failed(student_id, &err, false)
            }
        }
    }

    /// Read a scan from disk and process it. A file that cannot be read is
    /// that sheet's `Io` failure.
    pub fn process_file(&self, student_id: &str, path: &Path) -> SheetResult {
        match std::fs::read(path) {
            Ok(bytes) => self.process_encoded(student_id, &bytes),
            Err(err) => {
                warn!(student_id, path = %path.display(), error = %err, "Scan could not be read");
                SheetResult::failed(student_id, &OmrError::from(err), false)
            }
        }
    }

    fn run(
        &self,
        student_id: &str,
        raster: RasterRef<'_>,
        grid_detected: &mut bool,
    ) -> Result<SheetResult> {
        let key = self.scorer.key();
        let sheet = self.normalizer.normalize(raster)?;
        // The key's shape is enforced here, before any mark is read.
        let grid = self.locator.locate(&sheet, key.shape())?;
        *grid_detected = true;

        let marks = self.classifier.classify(&grid);
        let answers = self.estimator.assess(&marks);
        let card = self.scorer.score(&answers)?;
        let confidence = self.estimator.sheet_confidence(&answers, key.weights());
        debug!(
            correct = card.correct,
            incorrect = card.incorrect,
            blank = card.blank,
            ambiguous = card.ambiguous,
            "Answers compared with key"
        );

        Ok(SheetResult {
            student_id: student_id.to_string(),
            score: card.score,
            correct_answers: card.correct,
            incorrect_answers: card.incorrect,
            blank_answers: card.blank,
            ambiguous_answers: card.ambiguous,
            confidence,
            grid_detected: true,
            answers,
            processing_errors: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markwerk_core::types::Selection;
    use markwerk_core::{ErrorKind, ExamInfo};
    use markwerk_vision::PixelFormat;
    use markwerk_vision::synthetic::SyntheticSheet;

    fn pipeline(questions: usize) -> SheetPipeline {
        let info = ExamInfo {
            title: "Pipeline".into(),
            date: None,
            total_questions: questions,
            options_per_question: 4,
        };
        let answers = (0..questions).map(|q| q % 4).collect();
        let key = AnswerKey::new(info, answers, vec![1.0; questions]).unwrap();
        SheetPipeline::new(&OmrConfig::default(), Arc::new(key))
    }

    #[test]
    fn undersized_image_is_recorded_not_raised() {
        let data = vec![200u8; 16 * 16];
        let result = pipeline(4).process("tiny", RasterRef::new(&data, 16, 16, PixelFormat::Luma8));
        assert!(!result.is_success());
        assert!(!result.grid_detected);
        assert_eq!(result.processing_errors[0].kind, ErrorKind::Image);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn missing_scan_file_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = pipeline(4).process_file("gone", &dir.path().join("gone.png"));
        assert!(!result.is_success());
        assert_eq!(result.processing_errors[0].kind, ErrorKind::Io);
    }

    #[test]
    fn rendered_sheet_is_scored() {
        let pipeline = pipeline(8);
        let selections: Vec<Selection> = (0..8).map(|q| Selection::Option(q % 4)).collect();
        let raster = SyntheticSheet::new(pipeline.key().shape())
            .with_selections(&selections)
            .raster()
            .unwrap();
        let result = pipeline.process("s-01", raster.as_raster());
        assert!(result.is_success(), "{:?}", result.processing_errors);
        assert_eq!(result.score, 100.0);
        assert_eq!(result.selections(), selections);
        assert!(result.confidence > 0.7);
    }
}
