//! Sub-step control flow for multi-tick protocols.
//!
//! Reconciliation never blocks a worker on a long-running external
//! operation. Every sub-step that may need to wait (a data-mover job, a
//! health-check window) returns a [`StepOutcome`] instead of sleeping;
//! the caller turns `RetryAfter` into a requeue. Fatal failures use the
//! ordinary `Err` arm of `Result<StepOutcome, Error>` — they are not a
//! third variant here, so `?` keeps working.

use std::time::Duration;

/// Result of one non-blocking sub-step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step completed; the caller may proceed to the next step.
    Continue,
    /// The step is waiting on external progress; redeliver after the delay.
    RetryAfter(Duration),
}

impl StepOutcome {
    /// Convenience constructor for second-denominated waits
    pub fn retry_secs(secs: u64) -> Self {
        Self::RetryAfter(Duration::from_secs(secs))
    }

    /// True when the caller may proceed
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_secs_builds_duration() {
        assert_eq!(
            StepOutcome::retry_secs(30),
            StepOutcome::RetryAfter(Duration::from_secs(30))
        );
    }

    #[test]
    fn continue_is_continue() {
        assert!(StepOutcome::Continue.is_continue());
        assert!(!StepOutcome::retry_secs(1).is_continue());
    }
}
