//! # Fibonacci Backoff
//!
//! Retry delays for failed reconciliations. The sequence grows more slowly
//! than exponential backoff: with a 5s minimum and 60s cap it runs
//! 5s, 5s, 10s, 15s, 25s, 40s, 60s, 60s, ...
//!
//! `BackoffTracker` keeps one sequence per Map key and is owned by the
//! dispatcher; the reconciler itself never sleeps or retries.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Previous delay in seconds
    prev_secs: u64,
    /// Current delay in seconds
    current_secs: u64,
    /// Maximum delay in seconds
    max_secs: u64,
}

impl FibonacciBackoff {
    /// Create a new backoff between `min` and `max`
    ///
    /// Sub-second precision is dropped; a zero minimum is raised to one second.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let min_secs = min.as_secs().max(1);
        Self {
            prev_secs: 0,
            current_secs: min_secs,
            max_secs: max.as_secs().max(min_secs),
        }
    }

    /// Get the next delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current_secs;

        let next_secs = self.prev_secs.saturating_add(self.current_secs);
        self.prev_secs = self.current_secs;
        self.current_secs = std::cmp::min(next_secs, self.max_secs);

        Duration::from_secs(result)
    }
}

/// Per-key backoff state
#[derive(Debug)]
pub struct BackoffTracker {
    min: Duration,
    max: Duration,
    /// namespace/name -> backoff sequence
    states: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl BackoffTracker {
    /// Create a tracker whose sequences run from `min` to `max`
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Next retry delay for `key`, advancing its sequence
    pub fn next_for(&self, key: &str) -> Duration {
        match self.states.lock() {
            Ok(mut states) => states
                .entry(key.to_string())
                .or_insert_with(|| FibonacciBackoff::new(self.min, self.max))
                .next_backoff(),
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using minimum backoff", e);
                self.min
            }
        }
    }

    /// Forget the sequence for `key` (on successful reconciliation)
    pub fn reset(&self, key: &str) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(key);
        }
    }

    /// Number of keys currently backing off
    pub fn tracked(&self) -> usize {
        self.states.lock().map(|s| s.len()).unwrap_or(0)
    }
}
