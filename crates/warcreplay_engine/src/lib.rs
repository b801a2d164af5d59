//! warcreplay Replay Engine
//!
//! Re-issues the requests captured in WARC archives against live servers.
//! Archives are replayed concurrently; within one archive, requests are
//! dispatched in record order with a bounded number in flight.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod limiter;
pub mod materialize;
pub mod orchestrator;
pub mod outcome;
pub mod request;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use client::{ClientError, ReplayClient, ReplayResponse, Transport, TransportError};
pub use error::ReplayError;
pub use limiter::{ConcurrencyLimiter, InFlightPermit, LimiterClosed};
pub use materialize::{MaterializeError, materialize};
pub use orchestrator::{ReplayRun, RunReport, open_archives};
pub use outcome::{ArchiveReport, ArchiveSummary, OutcomeStatus, ReplayOutcome};
pub use request::ReplayableRequest;
pub use scheduler::{ArchiveScheduler, SchedulerState};
