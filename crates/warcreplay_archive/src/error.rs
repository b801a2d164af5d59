//! Archive errors.
//!
//! Every variant is fatal for the archive that produced it: a sequential
//! reader has no way to resynchronize on the next record once framing is lost.

use warcreplay_core::CoreError;

/// Archive result type
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors raised while opening or reading an archive
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The archive file could not be opened
    #[error("Failed to open {path}: {source}")]
    Open {
        /// Path that was opened
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Read failure from the underlying stream
    #[error("Read error at offset {offset}: {source}")]
    Io {
        /// Offset of the record being read
        offset: u64,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Record framing or header is invalid
    #[error("Malformed record at offset {offset}: {reason}")]
    Malformed {
        /// Offset of the record being read
        offset: u64,
        /// What was wrong
        reason: String,
    },

    /// Stream ended in the middle of a record
    #[error("Truncated record at offset {offset}: {reason}")]
    Truncated {
        /// Offset of the record being read
        offset: u64,
        /// Which part of the record was cut short
        reason: String,
    },
}

impl ArchiveError {
    /// Convert into a [`CoreError`] naming the archive
    #[must_use]
    pub fn into_core(self, archive: &str) -> CoreError {
        match self {
            Self::Open { path, source } => CoreError::Io {
                path,
                reason: source.to_string(),
            },
            other => CoreError::Archive {
                archive: archive.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Offset of the failing record, when known
    #[must_use]
    pub const fn offset(&self) -> Option<u64> {
        match self {
            Self::Open { .. } => None,
            Self::Io { offset, .. } | Self::Malformed { offset, .. } | Self::Truncated { offset, .. } => {
                Some(*offset)
            }
        }
    }
}
