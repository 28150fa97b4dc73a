//! A "prelude" for users of the `spider-engine` crate.
//!
//! This prelude re-exports the most commonly used traits, structs, and macros
//! so that they can be easily imported.
//!
//! # Example
//!
//! ```
//! use spider_engine::prelude::*;
//! ```

pub use crate::{
    // Core structs
    Context,
    Crawler,
    CrawlerBuilder,
    CrawlerConfig,
    Request,
    RuleTree,
    Scheduler,
    SchedulerConfig,
    StatCollector,
    // Core traits
    Downloader,
    Pipeline,
    RequestSource,
    Rule,
    Stats,
    // Errors
    CrawlerError,
    FetchError,
    ParseError,
    // Essential re-exports for trait implementation
    async_trait,
};
