//! Per-request outcomes and per-archive summaries.
//!
//! Outcomes exist for observability only: each one produces a log line and
//! is counted into the archive summary. Nothing is written to disk.

use crate::client::{ReplayResponse, TransportError};
use crate::error::ReplayError;
use http::{Method, StatusCode};
use reqwest::Url;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// How a replayed request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// A response was received and its body drained
    Response(StatusCode),
    /// No response was received
    RequestFailed(String),
    /// A response was received but its body could not be drained
    DownloadFailed {
        /// Response status
        status: StatusCode,
        /// What went wrong
        reason: String,
    },
    /// The dispatch task itself died
    Aborted(String),
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Response(status) => write!(f, "{}", status),
            Self::RequestFailed(reason) => write!(f, "request failed: {}", reason),
            Self::DownloadFailed { status, reason } => {
                write!(f, "{} download failed: {}", status, reason)
            }
            Self::Aborted(reason) => write!(f, "dispatch aborted: {}", reason),
        }
    }
}

/// Terminal result of one dispatched request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Archive the request came from
    pub archive: Arc<str>,
    /// Dispatch position within the archive, starting at 1
    pub sequence: u64,
    /// Request method
    pub method: Method,
    /// Resolved target
    pub url: Url,
    /// How it ended
    pub status: OutcomeStatus,
    /// Body bytes downloaded
    pub bytes: u64,
}

impl ReplayOutcome {
    /// Build an outcome from the transport result
    #[must_use]
    pub fn from_result(
        archive: Arc<str>,
        sequence: u64,
        method: Method,
        url: Url,
        result: Result<ReplayResponse, TransportError>,
    ) -> Self {
        let (status, bytes) = match result {
            Ok(response) => (OutcomeStatus::Response(response.status), response.bytes),
            Err(TransportError::Request(reason)) => (OutcomeStatus::RequestFailed(reason), 0),
            Err(TransportError::Download {
                status,
                bytes,
                reason,
            }) => (OutcomeStatus::DownloadFailed { status, reason }, bytes),
        };

        Self {
            archive,
            sequence,
            method,
            url,
            status,
            bytes,
        }
    }

    /// Response status, if a response was received
    #[must_use]
    pub fn response_status(&self) -> Option<StatusCode> {
        match &self.status {
            OutcomeStatus::Response(status) | OutcomeStatus::DownloadFailed { status, .. } => {
                Some(*status)
            }
            OutcomeStatus::RequestFailed(_) | OutcomeStatus::Aborted(_) => None,
        }
    }

    /// Fully drained 2xx or 3xx response
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(&self.status, OutcomeStatus::Response(status)
            if status.is_success() || status.is_redirection())
    }

    /// Emit the per-request log line
    pub fn log(&self) {
        if self.is_success() {
            tracing::info!(
                archive = %self.archive,
                sequence = self.sequence,
                method = %self.method,
                url = %self.url,
                status = %self.status,
                http_status = self.response_status().map(|status| status.as_u16()),
                bytes = self.bytes,
                "{}",
                self
            );
        } else {
            tracing::warn!(
                archive = %self.archive,
                sequence = self.sequence,
                method = %self.method,
                url = %self.url,
                status = %self.status,
                http_status = self.response_status().map(|status| status.as_u16()),
                bytes = self.bytes,
                "{}",
                self
            );
        }
    }
}

impl fmt::Display for ReplayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} bytes) {} {} {}",
            self.status, self.bytes, self.method, self.url, self.archive
        )
    }
}

/// Counters for one archive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    /// Records read, of any type
    pub records: u64,
    /// Non-request records skipped
    pub skipped_records: u64,
    /// Requests dispatched
    pub dispatched: u64,
    /// Terminal outcomes observed
    pub completed: u64,
    /// Outcomes with a drained 2xx/3xx response
    pub succeeded: u64,
    /// All other outcomes
    pub failed: u64,
    /// Body bytes downloaded
    pub bytes: u64,
}

impl ArchiveSummary {
    /// Create empty counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add what the record reader saw
    pub fn record_reads(&mut self, records: u64, skipped: u64) {
        self.records += records;
        self.skipped_records += skipped;
    }

    /// Record a dispatched request
    pub fn record_dispatch(&mut self) {
        self.dispatched += 1;
    }

    /// Record a terminal outcome
    pub fn record_outcome(&mut self, outcome: &ReplayOutcome) {
        self.completed += 1;
        self.bytes += outcome.bytes;
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Everything known about one archive once its scheduler is done
#[derive(Debug)]
pub struct ArchiveReport {
    /// Archive name
    pub archive: Arc<str>,
    /// Counters
    pub summary: ArchiveSummary,
    /// Outcomes in completion order
    pub outcomes: Vec<ReplayOutcome>,
    /// Fatal error that ended the archive early
    pub error: Option<ReplayError>,
}

impl ArchiveReport {
    /// Create an empty report
    #[must_use]
    pub fn new(archive: Arc<str>) -> Self {
        Self {
            archive,
            summary: ArchiveSummary::new(),
            outcomes: Vec::new(),
            error: None,
        }
    }

    /// Add an outcome
    pub fn push(&mut self, outcome: ReplayOutcome) {
        self.summary.record_outcome(&outcome);
        self.outcomes.push(outcome);
    }

    /// Whether the archive was read to its end
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}
