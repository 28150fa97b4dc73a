//! # spider-engine
//!
//! Execution engine for a rule-driven web crawler.
//!
//! A [`Crawler`] pulls [`Request`]s from a [`RequestSource`], admits each
//! one through the source's slot budget, downloads it with a
//! [`Downloader`], runs the named [`Rule`] from the spider's [`RuleTree`]
//! and forwards extracted items and files to a [`Pipeline`]. The loop
//! sleeps a randomized pause between iterations and, on exit, waits for
//! every admitted request to finish before the pipeline is stopped.
//!
//! [`Scheduler`] is the bundled request source: a deduplicating FIFO
//! frontier with retries and a concurrency cap.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::prelude::*;
//! use serde_json::{Map, json};
//! use std::sync::Arc;
//!
//! async fn crawl() -> Result<(), CrawlerError> {
//!     let rules = RuleTree::new("example").rule_fn("page", |ctx| {
//!         ctx.check_running()?;
//!         let mut fields = Map::new();
//!         fields.insert("bytes".into(), json!(ctx.text().len()));
//!         ctx.add_item(fields);
//!         Ok(())
//!     });
//!
//!     let scheduler = Scheduler::new(SchedulerConfig::default())
//!         .with_seeds(vec![Request::parse("https://example.com/", "page").unwrap()]);
//!
//!     let crawler = CrawlerBuilder::new(1)
//!         .pause_time_ms(300)
//!         .source(Arc::new(scheduler))
//!         .rules(rules)
//!         .build()?;
//!
//!     crawler.run().await
//! }
//! ```

pub mod builder;
pub mod concurrency;
pub mod context;
pub mod crawler;
pub mod downloader;
pub mod error;
pub mod pipeline;
pub mod prelude;
pub mod request;
pub mod scheduler;
pub mod source;
pub mod spider;
pub mod state;
pub mod stats;

pub use builder::{CrawlerBuilder, CrawlerConfig};
pub use concurrency::SlotBudget;
pub use context::{Context, ContextPool, FileRecord, Item, Response};
pub use crawler::{Crawler, Outcome, Pause};
pub use downloader::{Downloader, ReqwestDownloader};
pub use error::{CrawlerError, FetchError, ParseError};
pub use pipeline::{ConsolePipeline, Pipeline};
pub use request::Request;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use source::RequestSource;
pub use spider::{FnRule, Rule, RuleTree};
pub use state::CrawlerState;
pub use stats::{StatCollector, Stats};

pub use async_trait::async_trait;
pub use tokio;
