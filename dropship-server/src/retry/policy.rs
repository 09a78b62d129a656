//! Retry scheduling policy
//!
//! Delay before a retry = `base_delay * multiplier[retry_count]`, keyed by the
//! retry count BEFORE the retry increments it. Defaults give
//! 5m, 15m, 1h, 4h, then 8h for every later attempt.

use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay_secs: u64,
    /// Retry cutoff; reaching it makes the next failure permanent
    pub max_retries: u32,
    pub multipliers: BTreeMap<u32, u64>,
    pub default_multiplier: u64,
    /// An order touched more recently than this may still have a submission
    /// on the wire; the sweep leaves it alone
    pub in_flight_grace_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: 300,
            max_retries: 3,
            multipliers: BTreeMap::from([(0, 1), (1, 3), (2, 12), (3, 48)]),
            default_multiplier: 96,
            in_flight_grace_secs: 120,
        }
    }
}

impl RetryPolicy {
    pub fn multiplier(&self, retry_count: u32) -> u64 {
        self.multipliers
            .get(&retry_count)
            .copied()
            .unwrap_or(self.default_multiplier)
    }

    /// Delay before the retry attempted at `retry_count` (pre-increment)
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        Duration::from_secs(self.base_delay_secs.saturating_mul(self.multiplier(retry_count)))
    }

    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }

    /// Whether a row last updated at `updated_at` is still inside the
    /// in-flight window at `now` (both epoch millis)
    pub fn may_be_in_flight(&self, updated_at: i64, now: i64) -> bool {
        let grace = i64::try_from(self.in_flight_grace_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        now.saturating_sub(updated_at) < grace
    }
}
