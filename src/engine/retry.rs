//! Consecutive-failure tracking.

use tracing::{debug, warn};

/// A counter of consecutive matching cycles, paired with its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Streak {
    count: u32,
    threshold: u32,
}

impl Streak {
    /// A zero threshold is treated as 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
        }
    }

    /// Count one more cycle. Returns `true` exactly when the threshold is
    /// reached, in which case the count is already back at 0.
    pub fn bump(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.threshold {
            self.count = 0;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

/// Decides when a run of recoverable failures warrants a sleep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    streak: Streak,
}

impl RetryPolicy {
    pub fn new(retries_before_sleep_limit: u32) -> Self {
        Self {
            streak: Streak::new(retries_before_sleep_limit),
        }
    }

    /// Record a failed cycle. Returns `true` when the caller must sleep.
    pub fn on_failure(&mut self) -> bool {
        let should_sleep = self.streak.bump();
        if should_sleep {
            warn!(limit = self.streak.threshold(), "Failure streak reached, sleeping");
        } else {
            debug!(streak = self.streak.count(), "Recoverable failure counted");
        }
        should_sleep
    }

    pub fn on_success(&mut self) {
        self.streak.reset();
    }

    pub fn streak(&self) -> &Streak {
        &self.streak
    }
}
