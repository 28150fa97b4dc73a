//! Admission-control utilities.
//!
//! [`SlotBudget`] is a counting permit system split into separate
//! `acquire`/`release` calls, so a permit can be taken on the dispatch task
//! and given back from whatever task finishes the work. It also tracks how
//! many slots are outstanding and lets a caller wait until that reaches zero.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore};
use tracing::{trace, warn};

/// Bounded pool of in-flight slots with a drain barrier.
#[derive(Debug)]
pub struct SlotBudget {
    semaphore: Semaphore,
    capacity: usize,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl SlotBudget {
    /// Creates a budget of `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Semaphore::new(capacity),
            capacity,
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Waits for a free slot and takes it.
    pub async fn acquire(&self) {
        match self.semaphore.acquire().await {
            Ok(permit) => permit.forget(),
            // Never closed.
            Err(_) => warn!("Slot semaphore closed, admitting without a permit"),
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("Slot acquired, {} of {} in flight", now, self.capacity);
    }

    /// Returns one slot. Unmatched releases are ignored.
    pub fn release(&self) {
        let prev = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match prev {
            Ok(prev) => {
                self.semaphore.add_permits(1);
                trace!("Slot released, {} in flight", prev - 1);
                if prev == 1 {
                    self.drained.notify_waiters();
                }
            }
            Err(_) => warn!("Slot released without a matching acquire"),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Resolves once no slots are outstanding.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}
