//! Jittered pacing between dispatch iterations.

use rand::Rng;
use std::time::Duration;

/// Pause configuration in milliseconds: every delay is drawn from
/// `[base, base + spread)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pause {
    pub base: u64,
    pub spread: u64,
}

impl Pause {
    /// Derives the pause from a target pause time `P`: `base = P / 2`,
    /// `spread = base * 3`, or `1` when `base` is zero so the random range
    /// is never empty.
    pub fn from_pause_time(pause_time_ms: u64) -> Self {
        let base = pause_time_ms / 2;
        let spread = if base > 0 { base.saturating_mul(3) } else { 1 };
        Pause { base, spread }
    }

    pub fn next_delay_ms(&self) -> u64 {
        let jitter = rand::rng().random_range(0..self.spread.max(1));
        self.base.saturating_add(jitter)
    }

    pub fn next_delay(&self) -> Duration {
        Duration::from_millis(self.next_delay_ms())
    }
}
