//! Reconciliation loop primitives.
//!
//! A reconciliation loop compares a value the system has stored with the value
//! an authoritative source reports, and overwrites the stored copy when they
//! disagree. Key concepts:
//!
//! - **Stored state**: what our persistent store currently says.
//! - **Observed state**: what the source of truth reports right now.
//! - **Convergence**: making stored match observed.
//!
//! # Invariants
//!
//! - Converging an already converged value is a no-op and reports
//!   [`Convergence::Unchanged`], so callers can skip the write.
//! - Decisions are deterministic given the same inputs.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Reconciliation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// The resource has failed too often inside the retry window.
    #[error("retries exhausted for {resource} after {attempts} attempts")]
    RetriesExhausted { resource: String, attempts: u32 },
}

/// Convergence status for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Stored state matches observed state.
    Converged,

    /// Stored state was just rewritten to match observed state.
    Converging,

    /// The source of truth could not be consulted.
    Unknown,
}

impl ConvergenceStatus {
    /// Returns true if the resource has converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// Outcome of comparing a stored value with an observed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence<T> {
    /// Stored already equals observed; nothing to write.
    Unchanged(T),

    /// Stored differs and must be overwritten with `to`.
    Updated { from: T, to: T },
}

impl<T: PartialEq> Convergence<T> {
    /// Compare `stored` against `observed`.
    pub fn between(stored: T, observed: T) -> Self {
        if stored == observed {
            Self::Unchanged(stored)
        } else {
            Self::Updated {
                from: stored,
                to: observed,
            }
        }
    }

    /// Returns true if a write is required.
    pub fn needs_write(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }

    /// The value stored once this outcome is applied.
    pub fn current(&self) -> &T {
        match self {
            Self::Unchanged(value) => value,
            Self::Updated { to, .. } => to,
        }
    }

    /// Consume the outcome, returning the value stored once it is applied.
    pub fn into_current(self) -> T {
        match self {
            Self::Unchanged(value) => value,
            Self::Updated { to, .. } => to,
        }
    }

    /// Map to the coarse [`ConvergenceStatus`].
    pub fn status(&self) -> ConvergenceStatus {
        match self {
            Self::Unchanged(_) => ConvergenceStatus::Converged,
            Self::Updated { .. } => ConvergenceStatus::Converging,
        }
    }
}

/// Retry tracker for failed operations.
///
/// Counts failures per resource key inside a sliding window. Once a key has
/// failed more than `max_retries` times within `window`, it is reported as
/// exhausted until the window lapses.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    /// Maximum retries per resource.
    max_retries: u32,

    /// Retry window duration.
    window: Duration,

    /// Tracked failures: resource_key -> (count, first_failure_time).
    failures: BTreeMap<String, (u32, Instant)>,
}

impl RetryTracker {
    /// Create a new retry tracker.
    pub fn new(max_retries: u32, window: Duration) -> Self {
        Self {
            max_retries,
            window,
            failures: BTreeMap::new(),
        }
    }

    /// Record a failure for a resource.
    ///
    /// Returns true if retries are exhausted.
    pub fn record_failure(&mut self, resource_key: &str) -> bool {
        let now = Instant::now();

        let (count, first) = self
            .failures
            .entry(resource_key.to_string())
            .or_insert((0, now));

        if now.duration_since(*first) > self.window {
            *count = 0;
            *first = now;
        }

        *count += 1;
        *count > self.max_retries
    }

    /// Check whether a resource may be attempted again.
    pub fn check(&self, resource_key: &str) -> Result<(), ReconcileError> {
        let Some((count, first)) = self.failures.get(resource_key) else {
            return Ok(());
        };

        if first.elapsed() > self.window || *count <= self.max_retries {
            return Ok(());
        }

        Err(ReconcileError::RetriesExhausted {
            resource: resource_key.to_string(),
            attempts: *count,
        })
    }

    /// Check if retries are exhausted for a resource.
    pub fn is_exhausted(&self, resource_key: &str) -> bool {
        self.check(resource_key).is_err()
    }

    /// Clear failure tracking for a resource (on success).
    pub fn clear(&mut self, resource_key: &str) {
        self.failures.remove(resource_key);
    }

    /// Prune expired entries.
    pub fn prune(&mut self) {
        let window = self.window;
        self.failures
            .retain(|_, (_, first)| first.elapsed() <= window);
    }

    /// Number of resources currently tracked.
    pub fn tracked(&self) -> usize {
        self.failures.len()
    }
}

impl Default for RetryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_WINDOW)
    }
}

/// Default reconciliation interval.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Default retry limit per resource inside the window.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default retry window.
pub const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(10 * 60); // 10 minutes

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("paid", "paid", false)]
    #[case("unpaid", "paid", true)]
    #[case("stale", "invalid", true)]
    fn test_convergence_between(
        #[case] stored: &str,
        #[case] observed: &str,
        #[case] needs_write: bool,
    ) {
        let outcome = Convergence::between(stored, observed);
        assert_eq!(outcome.needs_write(), needs_write);
        assert_eq!(*outcome.current(), observed);
    }

    #[test]
    fn test_convergence_is_idempotent() {
        let first = Convergence::between("unpaid", "paid");
        assert_eq!(first.status(), ConvergenceStatus::Converging);

        let second = Convergence::between(first.into_current(), "paid");
        assert_eq!(second, Convergence::Unchanged("paid"));
        assert!(second.status().is_converged());
    }

    #[test]
    fn test_retry_tracker() {
        let mut tracker = RetryTracker::new(3, Duration::from_secs(60));

        assert!(!tracker.record_failure("in_1")); // 1st
        assert!(!tracker.record_failure("in_1")); // 2nd
        assert!(!tracker.record_failure("in_1")); // 3rd
        assert!(tracker.record_failure("in_1")); // 4th - exhausted

        assert!(tracker.is_exhausted("in_1"));
        assert!(!tracker.is_exhausted("in_2"));
        assert_eq!(
            tracker.check("in_1"),
            Err(ReconcileError::RetriesExhausted {
                resource: "in_1".to_string(),
                attempts: 4,
            })
        );

        tracker.clear("in_1");
        assert!(!tracker.is_exhausted("in_1"));
    }

    #[test]
    fn test_retry_tracker_window_lapses() {
        let mut tracker = RetryTracker::new(0, Duration::from_millis(10));
        assert!(tracker.record_failure("in_1"));
        assert!(tracker.is_exhausted("in_1"));

        std::thread::sleep(Duration::from_millis(25));
        assert!(!tracker.is_exhausted("in_1"));

        tracker.prune();
        assert_eq!(tracker.tracked(), 0);
    }
}
