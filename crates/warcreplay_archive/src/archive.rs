//! Archive files.
//!
//! An [`Archive`] pairs a display name with the record source it exclusively
//! owns. Gzip-compressed archives (`.warc.gz`, one member per record) are
//! detected by their magic bytes and decompressed transparently.

use crate::error::{ArchiveError, ArchiveResult};
use crate::reader::WarcReader;
use flate2::bufread::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Reader type used for archives opened from files or byte streams
pub type ArchiveReader = WarcReader<Box<dyn BufRead + Send>>;

/// One input archive and its record source
#[derive(Debug)]
pub struct Archive<S> {
    name: String,
    source: S,
}

impl<S> Archive<S> {
    /// Wrap an existing record source
    #[must_use]
    pub fn new(name: impl Into<String>, source: S) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    /// Archive name used in log lines
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Split into name and source
    #[must_use]
    pub fn into_parts(self) -> (String, S) {
        (self.name, self.source)
    }
}

impl Archive<ArchiveReader> {
    /// Open an archive file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or its first bytes cannot
    /// be read
    pub fn open(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = File::open(path).map_err(|source| ArchiveError::Open {
            path: name.clone(),
            source,
        })?;

        let archive = Self::from_reader(name.clone(), file).map_err(|err| match err {
            ArchiveError::Io { source, .. } => ArchiveError::Open { path: name, source },
            other => other,
        })?;
        tracing::debug!(archive = %archive.name, "opened archive");
        Ok(archive)
    }

    /// Build an archive over any byte stream, detecting gzip compression
    ///
    /// # Errors
    ///
    /// Returns error if the first bytes cannot be read
    pub fn from_reader(
        name: impl Into<String>,
        reader: impl Read + Send + 'static,
    ) -> ArchiveResult<Self> {
        let mut buffered = BufReader::new(reader);
        let compressed = buffered
            .fill_buf()
            .map_err(|source| ArchiveError::Io { offset: 0, source })?
            .starts_with(&GZIP_MAGIC);

        let inner: Box<dyn BufRead + Send> = if compressed {
            Box::new(BufReader::new(MultiGzDecoder::new(buffered)))
        } else {
            Box::new(buffered)
        };

        Ok(Self::new(name, WarcReader::new(inner)))
    }
}
