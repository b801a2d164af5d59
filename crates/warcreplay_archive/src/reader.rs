//! Sequential WARC reader.
//!
//! Record layout:
//!
//! ```text
//! WARC/1.1 CRLF
//! Name: value CRLF
//! ... CRLF
//! CRLF
//! <Content-Length bytes of content>
//! CRLF CRLF
//! ```

use crate::error::{ArchiveError, ArchiveResult};
use crate::header::RecordHeader;
use crate::record::{Record, RecordSource};
use std::borrow::Cow;
use std::fmt::{self, Write as _};
use std::io::{self, BufRead, Read};

/// Upper bound on one header block
const MAX_HEADER_BYTES: u64 = 1024 * 1024;

/// Header text with every byte that is not valid UTF-8 written as `%XX`.
/// Archived target URIs keep the exact bytes the crawler captured.
fn escape_non_utf8(block: &[u8]) -> Cow<'_, str> {
    if let Ok(text) = std::str::from_utf8(block) {
        return Cow::Borrowed(text);
    }
    let mut text = String::with_capacity(block.len() + 8);
    for chunk in block.utf8_chunks() {
        text.push_str(chunk.valid());
        for byte in chunk.invalid() {
            let _ = write!(text, "%{:02X}", byte);
        }
    }
    Cow::Owned(text)
}

/// Reads records one after another from a buffered stream
pub struct WarcReader<R> {
    inner: R,
    /// Bytes consumed from `inner` so far
    position: u64,
    /// Offset of the current record
    record_offset: u64,
    /// Content bytes of the current record not yet read by the caller
    pending: u64,
    /// Whether the current record's trailer still has to be consumed
    in_record: bool,
}

impl<R: BufRead> WarcReader<R> {
    /// Create a reader over a buffered stream
    #[must_use]
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            position: 0,
            record_offset: 0,
            pending: 0,
            in_record: false,
        }
    }

    /// Read the next record
    ///
    /// # Errors
    ///
    /// Returns error on I/O failure, malformed framing or truncation
    pub fn read_record(&mut self) -> ArchiveResult<Option<Record<RecordContent<'_, R>>>> {
        self.finish_record()?;

        let Some(block) = self.read_header_block()? else {
            return Ok(None);
        };

        let offset = self.record_offset;
        let text = escape_non_utf8(&block);
        let header = RecordHeader::parse(&text).map_err(|err| ArchiveError::Malformed {
            offset,
            reason: err.to_string(),
        })?;

        let length = match header.get("Content-Length") {
            None => {
                return Err(ArchiveError::Malformed {
                    offset,
                    reason: "missing Content-Length".to_string(),
                });
            }
            Some(value) => value.trim().parse::<u64>().map_err(|_| ArchiveError::Malformed {
                offset,
                reason: format!("invalid Content-Length {:?}", value),
            })?,
        };

        self.pending = length;
        self.in_record = true;

        Ok(Some(Record::new(
            header,
            RecordContent {
                inner: &mut self.inner,
                remaining: &mut self.pending,
                position: &mut self.position,
                offset,
            },
        )))
    }

    /// Skip unread content of the previous record and its trailer
    fn finish_record(&mut self) -> ArchiveResult<()> {
        if !self.in_record {
            return Ok(());
        }
        let offset = self.record_offset;

        if self.pending > 0 {
            let skipped = io::copy(&mut (&mut self.inner).take(self.pending), &mut io::sink())
                .map_err(|source| ArchiveError::Io { offset, source })?;
            self.position += skipped;
            if skipped < self.pending {
                return Err(ArchiveError::Truncated {
                    offset,
                    reason: format!("content ends {} bytes early", self.pending - skipped),
                });
            }
            self.pending = 0;
        }

        for _ in 0..2 {
            let mut line = Vec::new();
            let n = self.read_line(&mut line, offset)?;
            if n == 0 {
                return Err(ArchiveError::Truncated {
                    offset,
                    reason: "missing record trailer".to_string(),
                });
            }
            if line != b"\r\n" && line != b"\n" {
                return Err(ArchiveError::Malformed {
                    offset,
                    reason: "record content longer than Content-Length".to_string(),
                });
            }
        }

        self.in_record = false;
        Ok(())
    }

    /// Read the version line and fields up to the blank separator line.
    /// `None` means clean end of stream.
    fn read_header_block(&mut self) -> ArchiveResult<Option<Vec<u8>>> {
        let mut block = Vec::new();

        // blank lines between records are tolerated
        loop {
            self.record_offset = self.position;
            block.clear();
            if self.read_line(&mut block, self.record_offset)? == 0 {
                return Ok(None);
            }
            if block != b"\r\n" && block != b"\n" {
                break;
            }
        }

        let offset = self.record_offset;
        loop {
            let start = block.len();
            if self.read_line(&mut block, offset)? == 0 {
                return Err(ArchiveError::Truncated {
                    offset,
                    reason: "header block".to_string(),
                });
            }
            let line = &block[start..];
            if line == b"\r\n" || line == b"\n" {
                return Ok(Some(block));
            }
            if block.len() as u64 > MAX_HEADER_BYTES {
                return Err(ArchiveError::Malformed {
                    offset,
                    reason: format!("header block exceeds {} bytes", MAX_HEADER_BYTES),
                });
            }
        }
    }

    fn read_line(&mut self, buf: &mut Vec<u8>, offset: u64) -> ArchiveResult<usize> {
        let n = (&mut self.inner)
            .take(MAX_HEADER_BYTES)
            .read_until(b'\n', buf)
            .map_err(|source| ArchiveError::Io { offset, source })?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R> fmt::Debug for WarcReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarcReader")
            .field("position", &self.position)
            .field("record_offset", &self.record_offset)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl<R: BufRead> RecordSource for WarcReader<R> {
    type Content<'a>
        = RecordContent<'a, R>
    where
        Self: 'a;

    fn next_record(&mut self) -> ArchiveResult<Option<Record<Self::Content<'_>>>> {
        self.read_record()
    }
}

/// Content of the current record, limited to its `Content-Length`
pub struct RecordContent<'a, R> {
    inner: &'a mut R,
    remaining: &'a mut u64,
    position: &'a mut u64,
    offset: u64,
}

impl<R> fmt::Debug for RecordContent<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordContent")
            .field("offset", &self.offset)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

impl<R: Read> Read for RecordContent<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if *self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = usize::try_from(*self.remaining).unwrap_or(usize::MAX).min(buf.len());
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "record at offset {} truncated with {} content bytes left",
                    self.offset, self.remaining
                ),
            ));
        }
        *self.remaining -= n as u64;
        *self.position += n as u64;
        Ok(n)
    }
}
