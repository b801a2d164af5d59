//! Core error types for warcreplay.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
///
/// Crate-local errors convert into this type when they cross a crate
/// boundary, so the binary only has to deal with one error shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// File could not be opened or read
    Io {
        /// Path of the file
        path: String,
        /// Underlying error message
        reason: String,
    },

    /// Invalid configuration value
    InvalidConfig {
        /// Name of the offending setting
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Archive cannot be trusted for further sequential reads
    Archive {
        /// Archive name
        archive: String,
        /// What went wrong
        reason: String,
    },

    /// Internal error (for unexpected errors)
    Internal {
        /// Error message
        message: String,
    },
}

impl CoreError {
    /// Build an invalid configuration error
    #[must_use]
    pub fn invalid_config(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, reason } => write!(f, "I/O error on {}: {}", path, reason),
            Self::InvalidConfig { field, reason } => {
                write!(f, "Invalid configuration for {}: {}", field, reason)
            }
            Self::Archive { archive, reason } => {
                write!(f, "Archive {} aborted: {}", archive, reason)
            }
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for CoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::Io {
            path: "crawl.warc.gz".to_string(),
            reason: "No such file or directory".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "I/O error on crawl.warc.gz: No such file or directory"
        );

        let err = CoreError::invalid_config("proxy", "missing host");
        assert_eq!(format!("{}", err), "Invalid configuration for proxy: missing host");
    }

    #[test]
    fn test_archive_error_names_archive() {
        let err = CoreError::Archive {
            archive: "a.warc".to_string(),
            reason: "truncated record".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("a.warc"));
        assert!(s.contains("truncated record"));
    }
}
