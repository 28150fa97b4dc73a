//! The dispatch loop: pull, admit, spawn, pace, and finally drain.
//!
//! The loop exits only when a pull comes back empty *and* the source
//! confirms it can stop. An empty pull on its own just means nothing is
//! ready yet (retries pending, seeds still being produced, follow-ups about
//! to be enqueued by in-flight tasks), so the loop sleeps and polls again.

use super::core::CrawlerCore;
use super::processor::process_request;
use crate::source::RequestSource;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, trace};

/// Returns an acquired slot to the source when dropped.
///
/// Owned by each processing task, so the slot is released whether the task
/// finishes, panics, or is aborted.
struct SlotGuard {
    source: Arc<dyn RequestSource>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.source.release_slot();
    }
}

pub(crate) async fn run_dispatch_loop(core: Arc<CrawlerCore>) {
    let crawler_id = core.id();
    trace!(
        "Crawler {} dispatch loop started, pause base={}ms spread={}ms",
        crawler_id, core.pause.base, core.pause.spread
    );
    let mut tasks = JoinSet::new();

    loop {
        match core.source.pull().await {
            None => {
                if core.source.can_stop().await {
                    debug!("Crawler {} has no more work, leaving dispatch loop", crawler_id);
                    break;
                }
            }
            Some(request) => {
                core.source.acquire_slot().await;
                let slot = SlotGuard {
                    source: Arc::clone(&core.source),
                };
                core.stats.increment_dispatched();

                let task_core = Arc::clone(&core);
                tasks.spawn(async move {
                    let _slot = slot;
                    debug!(" *     Start: {}", request.url);
                    process_request(&task_core, request).await
                });
            }
        }

        while let Some(result) = tasks.try_join_next() {
            log_task_result(result);
        }

        tokio::time::sleep(core.pause.next_delay()).await;
    }

    trace!("Waiting for {} processing tasks to complete", tasks.len());
    while let Some(result) = tasks.join_next().await {
        log_task_result(result);
    }
    core.source.await_drain().await;
    info!("Crawler {} dispatch loop drained", crawler_id);
}

fn log_task_result<T: std::fmt::Debug>(result: Result<T, JoinError>) {
    match result {
        Ok(outcome) => trace!("Processing task finished: {:?}", outcome),
        Err(e) => error!("A processing task failed: {}", e),
    }
}
