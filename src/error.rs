//! Error types for the engine and its collaborators.
//!
//! Three families live here:
//!
//! - [`CrawlerError`]: construction and lifecycle misuse (missing
//!   collaborators, calling `run` twice, a sink that refuses to start).
//! - [`FetchError`]: transport failures recorded inside a
//!   [`Context`](crate::context::Context) by a downloader.
//! - [`ParseError`]: the outcome of running a rule, separating cooperative
//!   cancellation from genuine faults.

use crate::state::CrawlerState;

/// Errors surfaced by the engine itself.
#[derive(Debug, thiserror::Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Crawler is {actual}, expected {expected}")]
    InvalidState {
        expected: CrawlerState,
        actual: CrawlerState,
    },

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error("{0}")]
    GeneralError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A transport failure reported by a downloader.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status code {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,
}

/// Outcome of a failed parse.
///
/// `Cancelled` is the stop marker: it means the engine was asked to stop
/// while the rule was running and is never counted as a failure.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("parse cancelled by active stop")]
    Cancelled,

    #[error("no rule named '{0}'")]
    UnknownRule(String),

    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

impl ParseError {
    /// Wraps any displayable message as a fault.
    pub fn fault(msg: impl std::fmt::Display) -> Self {
        ParseError::Fault(anyhow::anyhow!("{}", msg))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ParseError::Cancelled)
    }
}
