//! warcreplay Core Types
//!
//! Errors and run configuration shared by the archive reader, the replay
//! engine and the command-line front end. No I/O happens in this crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;

// Re-exports
pub use config::{ClientConfig, DEFAULT_CONCURRENCY, ReplayConfig};
pub use error::{CoreError, CoreResult};
