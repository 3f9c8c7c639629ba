//! Reconnect backoff policy.
//!
//! Portable, sync-only math; the async driver owns the actual timer.
//! Delay formula: `min(base * 2^attempt, max)`, with the attempt counter
//! itself capped so an unbroken failure streak settles at the maximum
//! delay instead of growing further. Bounds both thundering-herd
//! pressure on reconnect storms and worst-case recovery latency.

use std::time::Duration;

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default cap on the attempt counter.
pub const DEFAULT_MAX_ATTEMPT: u32 = 6;

/// Reconnect timing parameters.
#[derive(Clone, Copy, Debug)]
pub struct BackoffConfig {
    /// Base delay for exponential backoff in ms (default: 1000).
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in ms (default: 30000).
    pub max_delay_ms: u64,
    /// Attempt counter cap (default: 6).
    pub max_attempt: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempt: DEFAULT_MAX_ATTEMPT,
        }
    }
}

impl BackoffConfig {
    /// Attempt number for the next retry after `previous` failures in
    /// the current streak.
    #[must_use]
    pub fn next_attempt(&self, previous: u32) -> u32 {
        previous.saturating_add(1).min(self.max_attempt)
    }

    /// Delay before the given attempt.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(self.max_attempt).min(31));
        Duration::from_millis(exponential.min(self.max_delay_ms))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
