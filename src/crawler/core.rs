//! The core Crawler implementation for the `spider-engine` crate.
//!
//! This module defines the `Crawler` handle and the lifecycle that drives a
//! crawl: start the output pipeline, launch the dispatch loop on its own
//! task, start the request source, wait for the loop to drain, then stop the
//! pipeline. `Crawler` is cheap to clone, so one clone can sit in `run()`
//! while another calls `stop()` from elsewhere.

use super::dispatch::run_dispatch_loop;
use super::pause::Pause;
use crate::builder::CrawlerConfig;
use crate::context::ContextPool;
use crate::downloader::Downloader;
use crate::error::CrawlerError;
use crate::pipeline::Pipeline;
use crate::source::RequestSource;
use crate::spider::RuleTree;
use crate::state::{CrawlerState, StateCell};
use crate::stats::Stats;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// State shared between the lifecycle, the dispatch loop and processing tasks.
pub(crate) struct CrawlerCore {
    id: AtomicUsize,
    pub(crate) config: CrawlerConfig,
    pub(crate) pause: Pause,
    pub(crate) source: Arc<dyn RequestSource>,
    pub(crate) downloader: Arc<dyn Downloader>,
    pub(crate) pipeline: Box<dyn Pipeline>,
    pub(crate) rules: Arc<RuleTree>,
    pub(crate) stats: Arc<dyn Stats>,
    pub(crate) context_pool: Arc<ContextPool>,
    pub(crate) stop_signal: CancellationToken,
    state: StateCell,
}

impl CrawlerCore {
    pub(crate) fn id(&self) -> usize {
        self.id.load(Ordering::SeqCst)
    }
}

/// The execution engine for one spider.
#[derive(Clone)]
pub struct Crawler {
    core: Arc<CrawlerCore>,
}

impl Crawler {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: CrawlerConfig,
        pause: Pause,
        source: Arc<dyn RequestSource>,
        downloader: Arc<dyn Downloader>,
        pipeline: Box<dyn Pipeline>,
        rules: Arc<RuleTree>,
        stats: Arc<dyn Stats>,
        context_pool: Arc<ContextPool>,
    ) -> Self {
        Crawler {
            core: Arc::new(CrawlerCore {
                id: AtomicUsize::new(config.id),
                config,
                pause,
                source,
                downloader,
                pipeline,
                rules,
                stats,
                context_pool,
                stop_signal: CancellationToken::new(),
                state: StateCell::default(),
            }),
        }
    }

    /// Runs the crawl to completion.
    ///
    /// Returns once every admitted request has finished and the pipeline
    /// has been stopped. Can only be called once per crawler.
    pub async fn run(&self) -> Result<(), CrawlerError> {
        let core = &self.core;
        core.state
            .transition(CrawlerState::Idle, CrawlerState::Running)
            .map_err(|actual| CrawlerError::InvalidState {
                expected: CrawlerState::Idle,
                actual,
            })?;

        info!(
            "Crawler {} starting spider '{}' (pause base={}ms spread={}ms, pipeline={})",
            core.id(),
            core.rules.name(),
            core.pause.base,
            core.pause.spread,
            core.pipeline.name()
        );

        if let Err(e) = core.pipeline.start().await {
            error!("Crawler {} failed to start pipeline: {}", core.id(), e);
            core.state.set(CrawlerState::Stopped);
            return Err(e);
        }

        let dispatch = tokio::spawn(run_dispatch_loop(Arc::clone(core)));
        core.source.start().await;

        if let Err(e) = dispatch.await {
            error!("Crawler {} dispatch loop failed: {}", core.id(), e);
        }

        core.state.set(CrawlerState::Draining);
        debug!("Crawler {} drained, stopping pipeline", core.id());
        let result = core.pipeline.stop().await;
        core.state.set(CrawlerState::Stopped);

        if let Some(summary) = core.stats.summary() {
            info!("Crawler {} finished.{}", core.id(), summary);
        } else {
            info!("Crawler {} finished", core.id());
        }
        result
    }

    /// Asks the crawl to stop.
    ///
    /// In-flight parses observe the stop through their context and end as
    /// cancelled; the dispatch loop notices through the source and drains.
    pub fn stop(&self) {
        if !self.core.stop_signal.is_cancelled() {
            info!("Crawler {} stop requested", self.core.id());
        }
        self.core.stop_signal.cancel();
        self.core.source.trigger_stop();
    }

    pub fn id(&self) -> usize {
        self.core.id()
    }

    pub fn set_id(&self, id: usize) {
        self.core.id.store(id, Ordering::SeqCst);
    }

    pub fn state(&self) -> CrawlerState {
        self.core.state.get()
    }

    pub fn pause(&self) -> Pause {
        self.core.pause
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.core.config
    }

    pub fn is_stopping(&self) -> bool {
        self.core.stop_signal.is_cancelled()
    }

    /// Returns the stats collaborator this crawler reports to.
    pub fn get_stats(&self) -> Arc<dyn Stats> {
        Arc::clone(&self.core.stats)
    }
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("id", &self.id())
            .field("spider", &self.core.rules.name())
            .field("state", &self.state())
            .field("pause", &self.core.pause)
            .finish()
    }
}
