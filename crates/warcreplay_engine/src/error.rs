//! Archive-level replay errors.
//!
//! Anything in here ends the archive that raised it. Per-request failures
//! are [`TransportError`](crate::client::TransportError)s and never get here.

use crate::materialize::MaterializeError;
use warcreplay_archive::ArchiveError;
use warcreplay_core::CoreError;

/// Fatal error for a single archive
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// The record stream can no longer be read
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// A request record could not be turned into a request
    #[error("Record {record}: {source}")]
    Materialize {
        /// Record id, or `#n` when the record has none
        record: String,
        /// Underlying error
        #[source]
        source: MaterializeError,
    },

    /// The scheduler task itself failed
    #[error("Scheduler failed: {0}")]
    Scheduler(String),
}

impl ReplayError {
    /// Convert into a [`CoreError`] naming the archive
    #[must_use]
    pub fn into_core(self, archive: &str) -> CoreError {
        match self {
            Self::Archive(err) => err.into_core(archive),
            Self::Scheduler(message) => CoreError::Internal { message },
            other => CoreError::Archive {
                archive: archive.to_string(),
                reason: other.to_string(),
            },
        }
    }
}
