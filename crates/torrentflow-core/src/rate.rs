//! Instantaneous throughput from a cumulative byte counter.
//!
//! # Design
//! - One tracker per direction, each with its own sample timestamp.
//! - The rate covers only the last interval; no smoothing is applied.
//! - A counter that moves backwards yields a zero rate and rebases the tracker.

use std::time::Instant;

/// Last-interval rate estimate for one direction of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateTracker {
    last_bytes: u64,
    last_sample: Instant,
    current_rate: u64,
}

impl RateTracker {
    /// Start tracking from a zero counter at `now`.
    #[must_use]
    pub const fn new(now: Instant) -> Self {
        Self::starting_at(0, now)
    }

    /// Start tracking from an existing counter value.
    #[must_use]
    pub const fn starting_at(bytes: u64, now: Instant) -> Self {
        Self {
            last_bytes: bytes,
            last_sample: now,
            current_rate: 0,
        }
    }

    /// Record a new cumulative counter value and return the updated rate.
    ///
    /// When the clock has not advanced since the previous sample the tracker
    /// is left untouched.
    pub fn sample(&mut self, bytes: u64, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.last_sample);
        if elapsed.is_zero() {
            return self.current_rate;
        }
        let delta = bytes.saturating_sub(self.last_bytes);
        self.current_rate = per_second(delta, elapsed.as_secs_f64());
        self.last_bytes = bytes;
        self.last_sample = now;
        self.current_rate
    }

    /// Rate computed by the most recent sample, in bytes per second.
    #[must_use]
    pub const fn current_rate(&self) -> u64 {
        self.current_rate
    }

    /// Counter value seen by the most recent sample.
    #[must_use]
    pub const fn last_bytes(&self) -> u64 {
        self.last_bytes
    }

    /// Time of the most recent sample.
    #[must_use]
    pub const fn last_sample(&self) -> Instant {
        self.last_sample
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "rates are non-negative and far below f64 integer precision"
)]
fn per_second(delta: u64, elapsed_secs: f64) -> u64 {
    (delta as f64 / elapsed_secs).round() as u64
}
