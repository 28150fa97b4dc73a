//! Per-request processing: download, parse, bookkeeping, forwarding.
//!
//! [`process_request`] always runs to one terminal outcome and never lets a
//! fault escape to the dispatch loop:
//!
//! - a download error or a parse fault (including a panic inside a rule)
//!   is reported to the source, which decides whether to retry; the failure
//!   counter only moves once the source says the retry budget is exhausted;
//! - a parse cancelled by an active stop is dropped silently;
//! - everything else is a success, and the extracted items and files are
//!   forwarded to the pipeline in extraction order.

use super::core::CrawlerCore;
use crate::error::ParseError;
use crate::request::Request;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{error, info, trace, warn};

/// Terminal outcome of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// `exhausted` is false when the source scheduled a retry.
    Failed { exhausted: bool },
    Cancelled,
}

pub(crate) async fn process_request(core: &CrawlerCore, request: Request) -> Outcome {
    let rule = request.rule.clone();
    let mut ctx = core.context_pool.get(request, core.stop_signal.clone());

    core.downloader.download(&core.config, &mut ctx).await;

    if let Some(err) = ctx.error() {
        let reason = err.to_string();
        let outcome = record_failure(core, ctx.request(), "download", &reason).await;
        core.context_pool.release(ctx);
        return outcome;
    }

    let parsed = AssertUnwindSafe(ctx.parse(&core.rules, &rule))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(ParseError::fault(panic_message(panic.as_ref()))));

    match parsed {
        Err(ParseError::Cancelled) => {
            trace!("Parse of {} cancelled by stop", ctx.request().url);
            core.context_pool.release(ctx);
            Outcome::Cancelled
        }
        Err(fault) => {
            let reason = fault.to_string();
            let outcome = record_failure(core, ctx.request(), "process", &reason).await;
            core.context_pool.release(ctx);
            outcome
        }
        Ok(()) => {
            core.source.record_outcome(ctx.request(), true).await;
            core.stats.increment_success();
            core.stats.record_rule_success(&rule);
            info!(" *     Success: {}", ctx.request().url);

            for follow_up in ctx.take_requests() {
                let url = follow_up.url.clone();
                if let Err(e) = core.source.enqueue(follow_up).await {
                    warn!("Failed to enqueue follow-up request {}: {}", url, e);
                }
            }

            let items = ctx.take_items();
            let files = ctx.take_files();
            core.stats.increment_items(items.len());
            core.stats.increment_files(files.len());
            for item in items {
                core.pipeline.collect_data(item).await;
            }
            for file in files {
                core.pipeline.collect_file(file).await;
            }

            core.context_pool.release(ctx);
            Outcome::Succeeded
        }
    }
}

async fn record_failure(core: &CrawlerCore, request: &Request, stage: &str, reason: &str) -> Outcome {
    let exhausted = core.source.record_outcome(request, false).await;
    if exhausted {
        core.stats.increment_failure();
    }
    error!(" *     Fail  [{}][{}]: {}", stage, request.url, reason);
    Outcome::Failed { exhausted }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("rule panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("rule panicked: {}", msg)
    } else {
        "rule panicked".to_string()
    }
}
