// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Markwerk.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for all Markwerk operations.
#[derive(Debug, Error)]
pub enum OmrError {
    // -- Batch-fatal --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("batch aborted after {consecutive_failures} consecutive sheet failures")]
    BatchAborted { consecutive_failures: u32 },

    // -- Per-sheet --
    #[error("image unusable: {0}")]
    Image(String),

    #[error("grid detection failed: {0}")]
    GridDetection(String),

    #[error("scoring mismatch: answer key has {expected} questions, sheet has {actual}")]
    Scoring { expected: usize, actual: usize },

    #[error("sheet worker crashed: {0}")]
    Worker(String),

    // -- Collaborator I/O --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OmrError {
    /// Coarse category recorded in a sheet's `processing_errors`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::BatchAborted { .. } => ErrorKind::BatchAborted,
            Self::Image(_) => ErrorKind::Image,
            Self::GridDetection(_) => ErrorKind::GridDetection,
            Self::Scoring { .. } => ErrorKind::Scoring,
            Self::Worker(_) => ErrorKind::Worker,
            Self::Io(_) => ErrorKind::Io,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Whether the error is confined to one sheet, so the batch may continue.
    pub fn is_sheet_local(&self) -> bool {
        matches!(
            self,
            Self::Image(_) | Self::GridDetection(_) | Self::Scoring { .. } | Self::Worker(_)
        )
    }
}

/// Serializable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    BatchAborted,
    Image,
    GridDetection,
    Scoring,
    Worker,
    Io,
    Serialization,
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OmrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_local_errors() {
        assert!(OmrError::Image("empty".into()).is_sheet_local());
        assert!(OmrError::GridDetection("no frame".into()).is_sheet_local());
        assert!(OmrError::Scoring { expected: 4, actual: 3 }.is_sheet_local());
        assert!(OmrError::Worker("index out of bounds".into()).is_sheet_local());
        assert!(!OmrError::Config("bad".into()).is_sheet_local());
        assert!(!OmrError::BatchAborted { consecutive_failures: 3 }.is_sheet_local());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::GridDetection).unwrap();
        assert_eq!(json, "\"grid_detection\"");
    }
}
