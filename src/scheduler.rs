//! # Scheduler Module
//!
//! Reference [`RequestSource`]: a FIFO frontier with duplicate detection, a
//! retry budget, a slot budget and a stop flag.
//!
//! ## Overview
//!
//! The `Scheduler` owns every policy the engine delegates to its request
//! source:
//!
//! - **Frontier**: a lock-free queue of pending requests, seeded on `start`
//!   and extended with follow-up requests found while parsing.
//! - **Duplicate detection**: fingerprints of every accepted request are kept
//!   in a bounded cache; a request seen before is silently skipped.
//! - **Retries**: a failed request is pushed back until it has failed
//!   `max_retries` times, after which it is reported as exhausted.
//! - **Admission**: a [`SlotBudget`] caps how many requests are in flight.
//! - **Stop**: `trigger_stop` empties the tap. `pull` returns nothing,
//!   `can_stop` answers yes, and parses observe the cancelled signal.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::{Request, Scheduler, SchedulerConfig};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default())
//!     .with_seeds(vec![Request::parse("https://example.com/", "index")?]);
//! ```

use crate::concurrency::SlotBudget;
use crate::error::CrawlerError;
use crate::request::Request;
use crate::source::RequestSource;
use async_trait::async_trait;
use crossbeam::queue::SegQueue;
use moka::sync::Cache;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Policy knobs for the reference scheduler.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of requests in flight at once.
    pub max_concurrency: usize,
    /// Failed attempts allowed before a request is reported as exhausted.
    pub max_retries: u32,
    /// Capacity of the seen-fingerprint cache.
    pub dedup_capacity: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            max_concurrency: num_cpus::get().max(16),
            max_retries: 2,
            dedup_capacity: 100_000,
        }
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    request_queue: SegQueue<Request>,
    pending_requests: AtomicUsize,
    seen: Cache<String, ()>,
    seeds: Mutex<Vec<Request>>,
    slots: SlotBudget,
    seeding_done: AtomicBool,
    is_stopping: AtomicBool,
    stop_signal: CancellationToken,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Scheduler {
            request_queue: SegQueue::new(),
            pending_requests: AtomicUsize::new(0),
            seen: Cache::builder().max_capacity(config.dedup_capacity).build(),
            seeds: Mutex::new(Vec::new()),
            slots: SlotBudget::new(config.max_concurrency),
            seeding_done: AtomicBool::new(false),
            is_stopping: AtomicBool::new(false),
            stop_signal: CancellationToken::new(),
            config,
        }
    }

    /// Sets the requests enqueued when the scheduler is started.
    pub fn with_seeds(self, seeds: Vec<Request>) -> Self {
        *self.seeds.lock() = seeds;
        self
    }

    /// Enqueues a new request unless it has been seen before.
    pub fn enqueue_request(&self, request: Request) -> Result<(), CrawlerError> {
        if self.is_stopping() {
            return Err(CrawlerError::GeneralError(format!(
                "Scheduler is stopping, request dropped: {}",
                request.url
            )));
        }

        let fingerprint = request.fingerprint();
        if self.seen.contains_key(&fingerprint) {
            trace!("Request already seen, skipping: {}", request.url);
            return Ok(());
        }
        self.seen.insert(fingerprint, ());

        trace!("Enqueuing request: {}", request.url);
        self.push(request);
        Ok(())
    }

    fn push(&self, request: Request) {
        self.pending_requests.fetch_add(1, Ordering::SeqCst);
        self.request_queue.push(request);
    }

    /// Cancelled once `trigger_stop` has been called.
    pub fn stop_signal(&self) -> CancellationToken {
        self.stop_signal.clone()
    }

    pub fn is_stopping(&self) -> bool {
        self.is_stopping.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Returns the number of queued requests.
    #[inline]
    pub fn len(&self) -> usize {
        self.pending_requests.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of admitted requests that have not released their slot.
    pub fn in_flight(&self) -> usize {
        self.slots.in_flight()
    }
}

#[async_trait]
impl RequestSource for Scheduler {
    async fn pull(&self) -> Option<Request> {
        if self.is_stopping() {
            return None;
        }
        let request = self.request_queue.pop()?;
        self.pending_requests.fetch_sub(1, Ordering::SeqCst);
        trace!("Pulled request: {}", request.url);
        Some(request)
    }

    async fn acquire_slot(&self) {
        self.slots.acquire().await;
    }

    fn release_slot(&self) {
        self.slots.release();
    }

    async fn record_outcome(&self, request: &Request, success: bool) -> bool {
        if success {
            trace!("Recorded success for {}", request.url);
            return false;
        }

        if self.is_stopping() {
            debug!("Scheduler stopping, not retrying {}", request.url);
            return true;
        }

        if request.retries < self.config.max_retries {
            let mut retry = request.clone();
            retry.retries += 1;
            debug!(
                "Retrying {} (attempt {} of {})",
                retry.url,
                retry.retries,
                self.config.max_retries
            );
            self.push(retry);
            false
        } else {
            warn!(
                "Retry budget exhausted for {} after {} retries",
                request.url, request.retries
            );
            true
        }
    }

    async fn enqueue(&self, request: Request) -> Result<(), CrawlerError> {
        self.enqueue_request(request)
    }

    async fn can_stop(&self) -> bool {
        if self.is_stopping() {
            return true;
        }
        self.seeding_done.load(Ordering::SeqCst) && self.is_empty() && self.in_flight() == 0
    }

    async fn start(&self) {
        let seeds = std::mem::take(&mut *self.seeds.lock());
        let total = seeds.len();
        let mut accepted = 0;
        for seed in seeds {
            match self.enqueue_request(seed) {
                Ok(()) => accepted += 1,
                Err(e) => warn!("Failed to enqueue seed request: {}", e),
            }
        }
        self.seeding_done.store(true, Ordering::SeqCst);
        info!("Scheduler started with {} of {} seed requests", accepted, total);
    }

    fn trigger_stop(&self) {
        if !self.is_stopping.swap(true, Ordering::SeqCst) {
            info!(
                "Scheduler stopping with {} queued and {} in flight",
                self.len(),
                self.in_flight()
            );
            self.stop_signal.cancel();
        }
    }

    async fn await_drain(&self) {
        self.slots.wait_drained().await;
        debug!("Scheduler drained");
    }
}
