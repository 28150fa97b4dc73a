//! # Statistics Module
//!
//! Counters describing what an engine did.
//!
//! ## Overview
//!
//! The engine reports every terminal outcome through the [`Stats`] trait and
//! never reads the values back. [`StatCollector`] is the default
//! implementation: lock-free atomic counters plus a per-rule success map,
//! exportable as JSON, Markdown, or a plain-text summary.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::StatCollector;
//!
//! let stats = StatCollector::new();
//! stats.increment_success();
//! println!("{}", stats.to_json_string_pretty().unwrap());
//! println!("{}", stats);
//! ```

use crate::error::CrawlerError;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Write-only counter sink used by the engine.
pub trait Stats: Send + Sync + 'static {
    fn increment_success(&self);

    fn increment_failure(&self);

    fn increment_dispatched(&self) {}

    fn increment_items(&self, _count: usize) {}

    fn increment_files(&self, _count: usize) {}

    fn record_rule_success(&self, _rule: &str) {}

    /// Human-readable summary logged when a crawl finishes.
    fn summary(&self) -> Option<String> {
        None
    }
}

// A point-in-time copy of the counters, shared by the export methods.
struct StatsSnapshot {
    requests_dispatched: usize,
    requests_succeeded: usize,
    requests_failed: usize,
    items_collected: usize,
    files_collected: usize,
    rule_successes: BTreeMap<String, usize>,
    elapsed_duration: Duration,
}

impl StatsSnapshot {
    fn formatted_duration(&self) -> String {
        format!("{:?}", self.elapsed_duration)
    }

    fn pages_per_second(&self) -> f64 {
        let total_seconds = self.elapsed_duration.as_secs_f64();
        if total_seconds > 0.0 {
            self.requests_succeeded as f64 / total_seconds
        } else {
            0.0
        }
    }
}

/// Collects and stores counters about an engine's operation.
#[derive(Debug, serde::Serialize)]
pub struct StatCollector {
    #[serde(skip)]
    pub start_time: Instant,

    pub requests_dispatched: AtomicUsize,
    pub requests_succeeded: AtomicUsize,
    pub requests_failed: AtomicUsize,

    pub items_collected: AtomicUsize,
    pub files_collected: AtomicUsize,

    pub rule_successes: DashMap<String, usize>,
}

impl StatCollector {
    /// Creates a new `StatCollector` with all counters initialized to zero.
    pub fn new() -> Self {
        StatCollector {
            start_time: Instant::now(),
            requests_dispatched: AtomicUsize::new(0),
            requests_succeeded: AtomicUsize::new(0),
            requests_failed: AtomicUsize::new(0),
            items_collected: AtomicUsize::new(0),
            files_collected: AtomicUsize::new(0),
            rule_successes: DashMap::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.requests_succeeded.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.requests_failed.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> StatsSnapshot {
        let rule_successes = self
            .rule_successes
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        StatsSnapshot {
            requests_dispatched: self.requests_dispatched.load(Ordering::SeqCst),
            requests_succeeded: self.requests_succeeded.load(Ordering::SeqCst),
            requests_failed: self.requests_failed.load(Ordering::SeqCst),
            items_collected: self.items_collected.load(Ordering::SeqCst),
            files_collected: self.files_collected.load(Ordering::SeqCst),
            rule_successes,
            elapsed_duration: self.start_time.elapsed(),
        }
    }

    pub fn to_json_string(&self) -> Result<String, CrawlerError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String, CrawlerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Exports the current statistics to a Markdown formatted string.
    pub fn to_markdown_string(&self) -> String {
        let snapshot = self.snapshot();

        let rules_list = snapshot
            .rule_successes
            .iter()
            .map(|(rule, count)| format!("- **{}**: {}", rule, count))
            .collect::<Vec<String>>()
            .join("\n");
        let rules_output = if rules_list.is_empty() {
            "N/A".to_string()
        } else {
            rules_list
        };

        format!(
            r#"# Crawl Statistics Report

- **Duration**: {}
- **Average Speed**: {:.2} pages/s

## Requests
| Metric     | Count |
|------------|-------|
| Dispatched | {}     |
| Succeeded  | {}     |
| Failed     | {}     |

## Output
| Metric     | Count |
|------------|-------|
| Items      | {}     |
| Files      | {}     |

## Successes by Rule
{}
"#,
            snapshot.formatted_duration(),
            snapshot.pages_per_second(),
            snapshot.requests_dispatched,
            snapshot.requests_succeeded,
            snapshot.requests_failed,
            snapshot.items_collected,
            snapshot.files_collected,
            rules_output
        )
    }
}

impl Default for StatCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats for StatCollector {
    fn increment_success(&self) {
        self.requests_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_dispatched(&self) {
        self.requests_dispatched.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_items(&self, count: usize) {
        self.items_collected.fetch_add(count, Ordering::SeqCst);
    }

    fn increment_files(&self, count: usize) {
        self.files_collected.fetch_add(count, Ordering::SeqCst);
    }

    fn record_rule_success(&self, rule: &str) {
        *self.rule_successes.entry(rule.to_string()).or_insert(0) += 1;
    }

    fn summary(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl std::fmt::Display for StatCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();

        writeln!(f, "\nCrawl Statistics")?;
        writeln!(f, "----------------")?;
        writeln!(f, "  duration : {}", snapshot.formatted_duration())?;
        writeln!(f, "  speed    : pages/s: {:.2}", snapshot.pages_per_second())?;
        writeln!(
            f,
            "  requests : dispatched: {}, ok: {}, fail: {}",
            snapshot.requests_dispatched, snapshot.requests_succeeded, snapshot.requests_failed
        )?;
        writeln!(
            f,
            "  output   : items: {}, files: {}",
            snapshot.items_collected, snapshot.files_collected
        )?;

        let rules_string = if snapshot.rule_successes.is_empty() {
            "none".to_string()
        } else {
            snapshot
                .rule_successes
                .iter()
                .map(|(rule, count)| format!("{}: {}", rule, count))
                .collect::<Vec<String>>()
                .join(", ")
        };

        writeln!(f, "  rules    : {}\n", rules_string)
    }
}
