// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch dispatcher: runs the per-sheet pipeline over many sheets on a bounded
// pool of blocking workers and folds the results into a report.

use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use markwerk_core::config::{BatchConfig, ReportConfig};
use markwerk_core::error::{OmrError, Result};
use markwerk_core::types::{BatchReport, Selection, SheetResult};
use markwerk_core::{AnswerKey, OmrConfig};
use markwerk_vision::OwnedRaster;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{info, instrument, warn};

use crate::aggregate::BatchAggregator;
use crate::breaker::FailureBreaker;
use crate::pipeline::SheetPipeline;

/// Where a sheet's pixels come from.
#[derive(Debug, Clone)]
pub enum SheetSource {
    /// Already decoded.
    Raster(OwnedRaster),
    /// Encoded file bytes (JPEG, PNG, ...), decoded on the worker.
    Encoded(Vec<u8>),
    /// A scan on disk, read and decoded on the worker.
    File(PathBuf),
}

/// One sheet queued for processing.
#[derive(Debug, Clone)]
pub struct SheetInput {
    pub student_id: String,
    pub source: SheetSource,
    /// Known selections, for measuring reading accuracy.
    pub ground_truth: Option<Vec<Selection>>,
}

impl SheetInput {
    pub fn new(student_id: impl Into<String>, raster: OwnedRaster) -> Self {
        Self::from_source(student_id, SheetSource::Raster(raster))
    }

    pub fn encoded(student_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::from_source(student_id, SheetSource::Encoded(bytes))
    }

    pub fn file(student_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::from_source(student_id, SheetSource::File(path.into()))
    }

    fn from_source(student_id: impl Into<String>, source: SheetSource) -> Self {
        Self {
            student_id: student_id.into(),
            source,
            ground_truth: None,
        }
    }

    pub fn with_ground_truth(mut self, truth: Vec<Selection>) -> Self {
        self.ground_truth = Some(truth);
        self
    }
}

/// Per-sheet results in input order, plus the batch report.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub results: Vec<SheetResult>,
    pub report: BatchReport,
}

/// Runs batches of sheets against one answer key.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    pipeline: Arc<SheetPipeline>,
    batch: BatchConfig,
    report: ReportConfig,
}

impl BatchRunner {
    /// Validate the configuration and build a runner. Configuration errors
    /// surface here, before any sheet is touched.
    pub fn new(config: &OmrConfig, key: AnswerKey) -> Result<Self> {
        config.validate()?;
        let pipeline = SheetPipeline::new(config, Arc::new(key));
        Ok(Self::from_pipeline(pipeline, config))
    }

    /// Wrap an already-built pipeline.
    pub fn from_pipeline(pipeline: SheetPipeline, config: &OmrConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            batch: config.batch.clone(),
            report: config.report.clone(),
        }
    }

    pub fn pipeline(&self) -> &SheetPipeline {
        &self.pipeline
    }

    /// Process every sheet and build the report.
    ///
    /// At most `concurrency_limit` sheets are in flight, and the next input is
    /// only pulled from `sheets` once a worker is free. Results come back in
    /// input order whatever order they finished in.
    ///
    /// The failure breaker sees results in input order. Once it opens,
    /// dispatch stops and in-flight sheets are drained; if any input remains
    /// after the sheet that opened it, the batch fails with
    /// [`OmrError::BatchAborted`].
    #[instrument(skip(self, sheets), fields(concurrency = self.batch.concurrency_limit))]
    pub async fn run<I>(&self, sheets: I) -> Result<BatchOutcome>
    where
        I: IntoIterator<Item = SheetInput>,
    {
        let semaphore = Arc::new(Semaphore::new(self.batch.concurrency_limit.max(1)));
        let mut tasks: JoinSet<SheetResult> = JoinSet::new();
        let mut progress = Progress::new(self.batch.max_consecutive_failures);
        let mut pending = sheets.into_iter().fuse();

        info!("Starting batch");

        loop {
            // Record whatever has already finished before deciding to go on.
            while let Some(joined) = tasks.try_join_next_with_id() {
                progress.record(joined);
            }
            if !progress.breaker.allow_dispatch() {
                break;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| OmrError::Config("worker pool closed".into()))?;

            // Finished while we waited for a permit.
            while let Some(joined) = tasks.try_join_next_with_id() {
                progress.record(joined);
            }
            if !progress.breaker.allow_dispatch() {
                break;
            }

            let Some(SheetInput {
                student_id,
                source,
                ground_truth,
            }) = pending.next()
            else {
                break;
            };
            let index = progress.reserve(&student_id, ground_truth);
            let pipeline = Arc::clone(&self.pipeline);
            let handle = tasks.spawn_blocking(move || {
                let _permit = permit;
                match source {
                    SheetSource::Raster(raster) => pipeline.process(&student_id, raster.as_raster()),
                    SheetSource::Encoded(bytes) => pipeline.process_encoded(&student_id, &bytes),
                    SheetSource::File(path) => pipeline.process_file(&student_id, &path),
                }
            });
            progress.track(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            progress.record(joined);
        }

        if let Some(tripped_at) = progress.tripped_at {
            let remaining = tripped_at + 1 < progress.slots.len() || pending.next().is_some();
            if remaining {
                if let Some(message) = progress.breaker.status_message() {
                    warn!(%message, "Batch aborted");
                }
                return Err(OmrError::BatchAborted {
                    consecutive_failures: progress.breaker.consecutive_failures(),
                });
            }
            warn!(
                failures = progress.breaker.consecutive_failures(),
                "Failure streak ran to the last sheet; reporting the batch"
            );
        }

        let total = progress.slots.len();
        let mut aggregator = BatchAggregator::new();
        let mut results = Vec::with_capacity(total);
        for (slot, truth) in progress.slots.into_iter().zip(progress.truths) {
            let Some(result) = slot else { continue };
            match truth {
                Some(truth) => aggregator.add_with_truth(&result, &truth),
                None => aggregator.add(&result),
            }
            results.push(result);
        }
        let report = aggregator.report(&self.report);

        info!(
            processed = report.summary.total_sheets_processed,
            failed = report.summary.sheets_failed,
            average_score = report.summary.average_score,
            "Batch complete"
        );
        Ok(BatchOutcome { results, report })
    }
}

/// Bookkeeping for one run. Results are slotted by input index and fed to
/// the breaker only along the finished input-order prefix.
struct Progress {
    slots: Vec<Option<SheetResult>>,
    truths: Vec<Option<Vec<Selection>>>,
    students: Vec<String>,
    tasks: HashMap<Id, usize>,
    breaker: FailureBreaker,
    /// Length of the prefix already fed to the breaker.
    counted: usize,
    /// Input index of the sheet whose failure opened the breaker.
    tripped_at: Option<usize>,
}

impl Progress {
    fn new(failure_threshold: Option<u32>) -> Self {
        Self {
            slots: Vec::new(),
            truths: Vec::new(),
            students: Vec::new(),
            tasks: HashMap::new(),
            breaker: FailureBreaker::new(failure_threshold),
            counted: 0,
            tripped_at: None,
        }
    }

    fn reserve(&mut self, student_id: &str, truth: Option<Vec<Selection>>) -> usize {
        self.slots.push(None);
        self.truths.push(truth);
        self.students.push(student_id.to_string());
        self.slots.len() - 1
    }

    fn track(&mut self, id: Id, index: usize) {
        self.tasks.insert(id, index);
    }

    fn record(&mut self, joined: std::result::Result<(Id, SheetResult), JoinError>) {
        let (id, finished) = match joined {
            Ok((id, result)) => (id, Ok(result)),
            Err(err) => (err.id(), Err(err)),
        };
        let Some(index) = self.tasks.remove(&id) else {
            return;
        };
        let result = finished.unwrap_or_else(|err| {
            let detail = if err.is_panic() {
                panic_message(err.into_panic())
            } else {
                "task cancelled".to_string()
            };
            let student_id = &self.students[index];
            warn!(student_id, %detail, "Sheet task did not finish");
            SheetResult::failed(student_id.as_str(), &OmrError::Worker(detail), false)
        });
        self.slots[index] = Some(result);
        self.advance();
    }

    fn advance(&mut self) {
        while let Some(Some(result)) = self.slots.get(self.counted) {
            match result.processing_errors.first() {
                None => self.breaker.record_success(),
                Some(error) => self.breaker.record_failure(&error.message),
            }
            if self.tripped_at.is_none() && !self.breaker.allow_dispatch() {
                self.tripped_at = Some(self.counted);
            }
            self.counted += 1;
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "panic with no message".to_string()
    }
}
