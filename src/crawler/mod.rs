//! # Crawler Module
//!
//! Implements the engine that turns queued requests into parsed output.
//!
//! ## Overview
//!
//! - **Crawler**: the lifecycle handle (`run` / `stop`)
//! - **Dispatch loop**: a single control task that pulls requests from the
//!   source, takes an admission slot for each, spawns a processing task and
//!   sleeps a jittered pause between iterations
//! - **Processor**: runs one request through download, parse, bookkeeping
//!   and pipeline forwarding, isolating every failure
//! - **Pause**: the randomized delay applied by the dispatch loop
//!
//! ## Architecture
//!
//! Every admitted request runs in its own Tokio task with no ordering
//! relative to the others. The number in flight is bounded only by the
//! source's slot policy. Each task owns a guard that hands its slot back
//! when the task ends, however it ends. Shutdown never abandons work: the
//! loop joins its tasks and waits for the source to drain before the
//! pipeline is stopped.

mod core;
mod dispatch;
mod pause;
mod processor;

pub use core::Crawler;
pub use pause::Pause;
pub use processor::Outcome;
