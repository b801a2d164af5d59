//! Records and the source trait that yields them.

use crate::error::ArchiveResult;
use crate::header::{RecordHeader, RecordType};
use std::io::{self, Read};

/// One archive record: header plus a content reader
#[derive(Debug)]
pub struct Record<C> {
    header: RecordHeader,
    content: C,
}

impl<C> Record<C> {
    /// Create a record
    #[must_use]
    pub fn new(header: RecordHeader, content: C) -> Self {
        Self { header, content }
    }

    /// Record header
    #[must_use]
    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    /// Record type, if the header carries one
    #[must_use]
    pub fn record_type(&self) -> Option<RecordType> {
        self.header.record_type()
    }

    /// Whether this is a `request` record
    #[must_use]
    pub fn is_request(&self) -> bool {
        self.header.is_request()
    }

    /// Mutable access to the content reader
    pub fn content_mut(&mut self) -> &mut C {
        &mut self.content
    }

    /// Split into header and content
    #[must_use]
    pub fn into_parts(self) -> (RecordHeader, C) {
        (self.header, self.content)
    }
}

impl<C: Read> Record<C> {
    /// Read the whole content into an owned buffer.
    ///
    /// # Errors
    ///
    /// Returns error if the content cannot be read to completion
    pub fn read_content(&mut self) -> io::Result<Vec<u8>> {
        let capacity = self
            .header
            .content_length()
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(0)
            .min(MAX_PREALLOCATION);
        let mut buf = Vec::with_capacity(capacity);
        self.content.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

// Content-Length is untrusted input
const MAX_PREALLOCATION: usize = 16 * 1024 * 1024;

/// Forward-only producer of records.
///
/// The content of a yielded record borrows the source, so `next_record`
/// cannot be called again while that content is still open. Implementations
/// skip whatever the caller left unread.
pub trait RecordSource {
    /// Content reader for one record
    type Content<'a>: Read
    where
        Self: 'a;

    /// Next record, or `None` at end of stream
    ///
    /// # Errors
    ///
    /// Any error means the stream can no longer be trusted
    fn next_record(&mut self) -> ArchiveResult<Option<Record<Self::Content<'_>>>>;
}
