//! warcreplay Archive Reader
//!
//! Forward-only access to the records of a WARC file. Records are yielded one
//! at a time and their content borrows the reader, so a record has to be
//! consumed (or dropped) before the next one can be requested.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod archive;
pub mod error;
pub mod header;
pub mod reader;
pub mod record;

pub use archive::{Archive, ArchiveReader};
pub use error::{ArchiveError, ArchiveResult};
pub use header::{HeaderParseError, RecordHeader, RecordType};
pub use reader::{RecordContent, WarcReader};
pub use record::{Record, RecordSource};
