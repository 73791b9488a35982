// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch circuit breaker.
//
// If sheet after sheet fails, the input is probably wrong (scans from another
// exam, a broken scanner profile). Stop dispatching instead of grinding
// through the rest of the pile.

use tracing::{debug, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; sheets are dispatched.
    Closed,
    /// Too many failures in a row. Dispatch stops for the rest of the batch.
    Open,
}

/// Counts consecutive sheet failures and opens once a threshold is reached.
#[derive(Debug, Clone)]
pub struct FailureBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    /// `None` never opens.
    failure_threshold: Option<u32>,
    last_error: Option<String>,
}

impl FailureBreaker {
    pub fn new(failure_threshold: Option<u32>) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            failure_threshold,
            last_error: None,
        }
    }

    /// Whether another sheet may be dispatched.
    pub fn allow_dispatch(&self) -> bool {
        self.state == CircuitState::Closed
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// A sheet was scored. An open breaker stays open.
    pub fn record_success(&mut self) {
        if self.state == CircuitState::Open {
            return;
        }
        if self.consecutive_failures > 0 {
            debug!(
                failures = self.consecutive_failures,
                "Sheet succeeded; failure streak reset"
            );
        }
        self.consecutive_failures = 0;
        self.last_error = None;
    }

    /// A sheet failed. Once open, the streak that opened the breaker is kept
    /// as reported.
    pub fn record_failure(&mut self, error: &str) {
        if self.state == CircuitState::Open {
            return;
        }
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());

        if let Some(threshold) = self.failure_threshold {
            if self.consecutive_failures >= threshold {
                warn!(
                    failures = self.consecutive_failures,
                    last_error = error,
                    "Opening circuit breaker; batch will stop"
                );
                self.state = CircuitState::Open;
            }
        }
    }

    /// Status line for the operator, if the breaker is not closed.
    pub fn status_message(&self) -> Option<String> {
        match self.state {
            CircuitState::Closed => None,
            CircuitState::Open => Some(format!(
                "Stopped after {} unreadable sheets in a row (last: {}).",
                self.consecutive_failures,
                self.last_error.as_deref().unwrap_or("unknown error")
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold() {
        let mut breaker = FailureBreaker::new(Some(3));
        for _ in 0..2 {
            breaker.record_failure("grid detection failed");
        }
        assert!(breaker.allow_dispatch());
        breaker.record_failure("grid detection failed");
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_dispatch());
        assert!(breaker.status_message().unwrap().contains("3 unreadable"));
        breaker.record_failure("grid detection failed");
        breaker.record_success();
        assert_eq!(breaker.consecutive_failures(), 3);
        assert!(!breaker.allow_dispatch());
    }

    #[test]
    fn success_resets_streak() {
        let mut breaker = FailureBreaker::new(Some(3));
        breaker.record_failure("image unusable");
        breaker.record_failure("image unusable");
        breaker.record_success();
        breaker.record_failure("image unusable");
        assert!(breaker.allow_dispatch());
        assert_eq!(breaker.consecutive_failures(), 1);
    }

    #[test]
    fn disabled_breaker_never_opens() {
        let mut breaker = FailureBreaker::new(None);
        for _ in 0..1000 {
            breaker.record_failure("image unusable");
        }
        assert!(breaker.allow_dispatch());
        assert!(breaker.status_message().is_none());
    }
}
