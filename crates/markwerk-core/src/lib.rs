// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Markwerk: Core types, configuration, and error definitions shared across
// all crates.

pub mod answer_key;
pub mod config;
pub mod error;
pub mod human_errors;
pub mod types;

pub use answer_key::{AnswerKey, ExamInfo};
pub use config::OmrConfig;
pub use error::{ErrorKind, OmrError};
pub use types::*;
