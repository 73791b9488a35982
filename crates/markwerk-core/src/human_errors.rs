// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator-facing error messages.
//
// Every engine error is mapped to a plain sentence and a concrete next step for
// whoever is feeding the scanner. Severity drives how the binary reports it.

use crate::error::OmrError;

/// What the operator has to do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The sheet itself is the problem; scan it again.
    Rescan,
    /// The answer key or configuration must be corrected before any run.
    FixConfiguration,
    /// Files could not be read or written.
    Environment,
    /// The batch was stopped on purpose.
    Aborted,
}

/// A readable error with a suggested next step.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// One-line summary.
    pub message: String,
    /// What to try next.
    pub suggestion: String,
    pub severity: Severity,
}

/// Convert an `OmrError` into something an exam administrator can act on.
pub fn humanize_error(err: &OmrError) -> HumanError {
    match err {
        OmrError::Config(detail) => HumanError {
            message: "The answer key or settings are not valid.".into(),
            suggestion: format!("Correct the file and run the batch again. ({detail})"),
            severity: Severity::FixConfiguration,
        },

        OmrError::BatchAborted {
            consecutive_failures,
        } => HumanError {
            message: format!("Processing stopped after {consecutive_failures} unreadable sheets in a row."),
            suggestion: "Check that the scans belong to this exam and that the scanner settings are right, then rerun.".into(),
            severity: Severity::Aborted,
        },

        OmrError::Image(detail) => {
            if detail.contains("too small") {
                HumanError {
                    message: "This scan is too small to read.".into(),
                    suggestion: "Scan the sheet again at a higher resolution (at least 150 DPI).".into(),
                    severity: Severity::Rescan,
                }
            } else {
                HumanError {
                    message: "This scan could not be read.".into(),
                    suggestion: format!("The file may be damaged. Scan the sheet again. ({detail})"),
                    severity: Severity::Rescan,
                }
            }
        }

        OmrError::GridDetection(detail) => {
            if detail.contains("boundary") {
                HumanError {
                    message: "The edges of the answer sheet could not be found.".into(),
                    suggestion: "Make sure the whole printed frame is visible and not folded, then scan again.".into(),
                    severity: Severity::Rescan,
                }
            } else {
                HumanError {
                    message: "The answer bubbles could not be lined up.".into(),
                    suggestion: format!("Check that this sheet uses the same layout as the answer key. ({detail})"),
                    severity: Severity::Rescan,
                }
            }
        }

        OmrError::Scoring { expected, actual } => HumanError {
            message: "The sheet does not match the answer key.".into(),
            suggestion: format!("The key has {expected} questions but the sheet produced {actual}. Check the exam version."),
            severity: Severity::FixConfiguration,
        },

        OmrError::Worker(detail) => HumanError {
            message: "This sheet could not be processed.".into(),
            suggestion: format!("Scan the sheet again. If it keeps failing, please report it. ({detail})"),
            severity: Severity::Rescan,
        },

        OmrError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError {
                message: "A file could not be found.".into(),
                suggestion: "Check the path and try again.".into(),
                severity: Severity::Environment,
            },
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: "A file could not be opened.".into(),
                suggestion: "Check the file permissions, or copy the scans to a folder you own.".into(),
                severity: Severity::Environment,
            },
            _ => HumanError {
                message: "There was a problem reading or writing a file.".into(),
                suggestion: "Try again. If this keeps happening, the disk may be full.".into(),
                severity: Severity::Environment,
            },
        },

        OmrError::Serialization(_) => HumanError {
            message: "Results could not be written.".into(),
            suggestion: "Try again. If this keeps happening, please report it.".into(),
            severity: Severity::Environment,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_frame_asks_for_rescan() {
        let err = OmrError::GridDetection("sheet boundary not found".into());
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Rescan);
        assert!(human.message.contains("edges"));
    }

    #[test]
    fn bubble_mismatch_mentions_layout() {
        let err = OmrError::GridDetection("found 78 bubbles, expected 80".into());
        let human = humanize_error(&err);
        assert!(human.suggestion.contains("78 bubbles"));
    }

    #[test]
    fn bad_key_needs_configuration_fix() {
        let human = humanize_error(&OmrError::Config("answers has 3 entries".into()));
        assert_eq!(human.severity, Severity::FixConfiguration);
    }

    #[test]
    fn abort_reports_failure_count() {
        let human = humanize_error(&OmrError::BatchAborted {
            consecutive_failures: 10,
        });
        assert_eq!(human.severity, Severity::Aborted);
        assert!(human.message.contains("10"));
    }

    #[test]
    fn crashed_sheet_asks_for_rescan() {
        let human = humanize_error(&OmrError::Worker("index out of bounds".into()));
        assert_eq!(human.severity, Severity::Rescan);
        assert!(human.suggestion.contains("index out of bounds"));
    }

    #[test]
    fn missing_file_is_environment() {
        let err = OmrError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(humanize_error(&err).severity, Severity::Environment);
    }
}
