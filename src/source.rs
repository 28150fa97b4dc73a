//! The `RequestSource` trait: the queue, admission and retry collaborator
//! the dispatch loop talks to.

use crate::error::CrawlerError;
use crate::request::Request;
use async_trait::async_trait;

/// Supplies requests to an engine and owns the policies around them.
///
/// The engine relies on these guarantees:
///
/// - `pull` returns promptly (never blocks indefinitely) and returns `None`
///   when nothing is available *right now*, which is not the same as done.
/// - `release_slot` is called exactly once per completed `acquire_slot`,
///   on every path including failure, cancellation and panics.
/// - `can_stop` accounts for queued work, in-flight work, scheduled retries
///   and whether seed production is still running.
#[async_trait]
pub trait RequestSource: Send + Sync + 'static {
    /// Takes the next request, if one is available.
    async fn pull(&self) -> Option<Request>;

    /// Takes one admission slot, waiting if the budget is exhausted.
    async fn acquire_slot(&self);

    /// Returns one admission slot.
    fn release_slot(&self);

    /// Records the result of processing `request`.
    ///
    /// For a failure, returns `true` when the request will not be retried
    /// again (retry budget exhausted). The return value is not meaningful
    /// for successes.
    async fn record_outcome(&self, request: &Request, success: bool) -> bool;

    /// Queues a follow-up request discovered while parsing.
    ///
    /// Called before the discovering task releases its slot, so the new work
    /// is visible to `can_stop` before the parent stops counting as in flight.
    async fn enqueue(&self, request: Request) -> Result<(), CrawlerError>;

    /// Whether the dispatch loop may exit after an empty pull.
    async fn can_stop(&self) -> bool;

    /// Begins producing work (e.g. enqueuing seeds).
    async fn start(&self);

    /// Asks the source to stop producing and interrupt its waits.
    fn trigger_stop(&self);

    /// Resolves once every acquired slot has been released.
    async fn await_drain(&self);
}
