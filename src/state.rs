//! Module for tracking the lifecycle state of a crawler.
//!
//! A crawler moves through `Idle → Running → Draining → Stopped` exactly
//! once. The state lives in an atomic so that `Crawler::state()` can be read
//! from any task while `run()` is in progress.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle phase of a crawler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CrawlerState {
    /// Built but not yet running.
    Idle = 0,
    /// The dispatch loop is pulling and spawning work.
    Running = 1,
    /// The dispatch loop has exited and drained; the sink is being stopped.
    Draining = 2,
    /// The sink has been stopped. Terminal.
    Stopped = 3,
}

impl CrawlerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => CrawlerState::Idle,
            1 => CrawlerState::Running,
            2 => CrawlerState::Draining,
            _ => CrawlerState::Stopped,
        }
    }
}

impl fmt::Display for CrawlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrawlerState::Idle => "idle",
            CrawlerState::Running => "running",
            CrawlerState::Draining => "draining",
            CrawlerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Atomic holder for an [`CrawlerState`].
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: CrawlerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> CrawlerState {
        CrawlerState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: CrawlerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Moves from `from` to `to`, returning the observed state on mismatch.
    pub fn transition(&self, from: CrawlerState, to: CrawlerState) -> Result<(), CrawlerState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(CrawlerState::from_u8)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(CrawlerState::Idle)
    }
}
