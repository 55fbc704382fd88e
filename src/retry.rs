//! Retry policy for node execution.
//!
//! Unlike the teacher crate's `RetryPolicy` (exponential backoff with
//! jitter), this crate's retry loop uses a single fixed inter-attempt delay.
//! The specification does not call for backoff, and a fixed delay keeps
//! S3-style timing assertions (`elapsed >= attempts * delay`) exact instead
//! of approximate.

use std::time::Duration;

/// How a node should retry its `execute` body on failure.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, inclusive of the first. Must be >= 1.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// If true, a node that exhausts its retry budget is treated as
    /// completed rather than failed (the error is swallowed after
    /// `on_retry_failed`, if set, has run).
    pub continue_on_failed: bool,
}

impl RetryPolicy {
    /// A policy that retries `max_attempts` times with `delay_ms` between
    /// attempts and propagates the final error on exhaustion.
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            delay: Duration::from_millis(delay_ms),
            continue_on_failed: false,
        }
    }

    /// Swallow the final error on exhaustion instead of propagating it.
    pub fn continue_on_failed(mut self) -> Self {
        self.continue_on_failed = true;
        self
    }
}

impl Default for RetryPolicy {
    /// A single attempt, no retries.
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 1,
            delay: Duration::from_millis(0),
            continue_on_failed: false,
        }
    }
}

/// Tracks progress through a [`RetryPolicy`] across attempts of a single
/// node execution.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Attempts made so far (1-indexed once the first attempt starts).
    pub attempts: u32,
    /// Message from the most recent failure, if any.
    pub last_error: Option<String>,
}

impl RetryState {
    /// Record a failed attempt.
    pub fn record_attempt(&mut self, error: impl std::fmt::Display) {
        self.attempts += 1;
        self.last_error = Some(error.to_string());
    }

    /// Whether another attempt is permitted under `policy`.
    pub fn should_retry(&self, policy: &RetryPolicy) -> bool {
        self.attempts < policy.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_single_attempt() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 1);
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let p = RetryPolicy::new(3, 10);
        let mut state = RetryState::default();
        assert!(state.should_retry(&p));
        state.record_attempt("boom");
        assert!(state.should_retry(&p));
        state.record_attempt("boom");
        assert!(state.should_retry(&p));
        state.record_attempt("boom");
        assert!(!state.should_retry(&p));
    }

    #[test]
    fn zero_max_attempts_is_clamped_to_one() {
        let p = RetryPolicy::new(0, 10);
        assert_eq!(p.max_attempts, 1);
    }
}
