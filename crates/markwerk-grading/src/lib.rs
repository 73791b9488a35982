// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// markwerk-grading covers everything after the marks are read: scoring against the
// answer key, the synchronous per-sheet pipeline, the bounded batch
// dispatcher with its failure breaker, and batch statistics.

pub mod aggregate;
pub mod batch;
pub mod breaker;
pub mod pipeline;
pub mod scoring;

pub use aggregate::BatchAggregator;
pub use batch::{BatchOutcome, BatchRunner, SheetInput, SheetSource};
pub use breaker::{CircuitState, FailureBreaker};
pub use pipeline::SheetPipeline;
pub use scoring::{ScoreCard, Scorer};
