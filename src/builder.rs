//! # Builder Module
//!
//! Provides the `CrawlerBuilder`, a fluent API for assembling a `Crawler`
//! from its collaborators.
//!
//! ## Overview
//!
//! A crawler needs a request source and a rule tree; everything else has a
//! default:
//!
//! - **Downloader**: a shared [`ReqwestDownloader`]
//! - **Pipeline**: a [`ConsolePipeline`]
//! - **Stats**: a fresh [`StatCollector`]
//! - **Context pool**: a private [`ContextPool`]
//!
//! The pause between dispatch iterations is derived once, in [`build`],
//! from [`CrawlerConfig::pause_time_ms`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::{CrawlerBuilder, RuleTree, Scheduler, SchedulerConfig};
//! use std::sync::Arc;
//!
//! async fn crawl(rules: RuleTree, scheduler: Scheduler) -> Result<(), CrawlerError> {
//!     let crawler = CrawlerBuilder::new(1)
//!         .pause_time_ms(300)
//!         .source(Arc::new(scheduler))
//!         .rules(rules)
//!         .build()?;
//!
//!     crawler.run().await
//! }
//! ```
//!
//! [`build`]: CrawlerBuilder::build

use crate::context::ContextPool;
use crate::crawler::{Crawler, Pause};
use crate::downloader::{Downloader, ReqwestDownloader};
use crate::error::CrawlerError;
use crate::pipeline::{ConsolePipeline, Pipeline};
use crate::source::RequestSource;
use crate::spider::RuleTree;
use crate::stats::{StatCollector, Stats};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Settings read once when a crawler is built.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Identifier of the crawler within its process.
    pub id: usize,
    pub name: String,
    /// Target pause between dispatch iterations, in milliseconds.
    pub pause_time_ms: u64,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        CrawlerConfig {
            id: 0,
            name: "spider".to_string(),
            pause_time_ms: 300,
            user_agent: concat!("spider-engine/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct CrawlerBuilder {
    config: CrawlerConfig,
    source: Option<Arc<dyn RequestSource>>,
    downloader: Option<Arc<dyn Downloader>>,
    pipeline: Option<Box<dyn Pipeline>>,
    rules: Option<RuleTree>,
    stats: Option<Arc<dyn Stats>>,
    context_pool: Option<Arc<ContextPool>>,
}

impl CrawlerBuilder {
    /// Creates a builder for the crawler with the given id.
    pub fn new(id: usize) -> Self {
        Self::from_config(CrawlerConfig {
            id,
            ..CrawlerConfig::default()
        })
    }

    pub fn from_config(config: CrawlerConfig) -> Self {
        Self {
            config,
            source: None,
            downloader: None,
            pipeline: None,
            rules: None,
            stats: None,
            context_pool: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets the target pause between dispatch iterations.
    pub fn pause_time_ms(mut self, millis: u64) -> Self {
        self.config.pause_time_ms = millis;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn source(mut self, source: Arc<dyn RequestSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets a downloader, possibly shared with other crawlers.
    pub fn downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn pipeline<P: Pipeline>(mut self, pipeline: P) -> Self {
        self.pipeline = Some(Box::new(pipeline));
        self
    }

    pub fn rules(mut self, rules: RuleTree) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn stats(mut self, stats: Arc<dyn Stats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Shares a context pool with other crawlers.
    pub fn context_pool(mut self, pool: Arc<ContextPool>) -> Self {
        self.context_pool = Some(pool);
        self
    }

    /// Validates the configuration and builds the `Crawler`.
    pub fn build(self) -> Result<Crawler, CrawlerError> {
        let source = self.source.ok_or_else(|| {
            CrawlerError::ConfigurationError("Crawler must have a request source.".to_string())
        })?;
        let rules = self.rules.ok_or_else(|| {
            CrawlerError::ConfigurationError("Crawler must have a rule tree.".to_string())
        })?;
        if rules.is_empty() {
            return Err(CrawlerError::ConfigurationError(format!(
                "Rule tree '{}' has no rules.",
                rules.name()
            )));
        }

        let pause = Pause::from_pause_time(self.config.pause_time_ms);
        let downloader = self
            .downloader
            .unwrap_or_else(|| Arc::new(ReqwestDownloader::default()));
        let pipeline = self
            .pipeline
            .unwrap_or_else(|| Box::new(ConsolePipeline::new()));
        let stats = self
            .stats
            .unwrap_or_else(|| Arc::new(StatCollector::new()));
        let context_pool = self.context_pool.unwrap_or_default();

        Ok(Crawler::new(
            self.config,
            pause,
            source,
            downloader,
            pipeline,
            Arc::new(rules),
            stats,
            context_pool,
        ))
    }
}
