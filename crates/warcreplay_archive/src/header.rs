//! WARC record headers.
//!
//! Field names are matched ASCII-case-insensitively. Insertion order is kept
//! so headers print back the way they were captured.

use indexmap::IndexMap;
use std::fmt;

/// WARC record type, from the `WARC-Type` field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// Archive-level metadata
    Warcinfo,
    /// Captured response
    Response,
    /// Resource captured without a protocol exchange
    Resource,
    /// Captured request
    Request,
    /// Free-form metadata about another record
    Metadata,
    /// Response deduplicated against an earlier capture
    Revisit,
    /// Alternate version of another record's content
    Conversion,
    /// Continuation of a segmented record
    Continuation,
    /// Anything else
    Other(String),
}

impl RecordType {
    /// Parse a `WARC-Type` value
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        match value.to_ascii_lowercase().as_str() {
            "warcinfo" => Self::Warcinfo,
            "response" => Self::Response,
            "resource" => Self::Resource,
            "request" => Self::Request,
            "metadata" => Self::Metadata,
            "revisit" => Self::Revisit,
            "conversion" => Self::Conversion,
            "continuation" => Self::Continuation,
            _ => Self::Other(value.to_string()),
        }
    }

    /// Canonical field value
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Warcinfo => "warcinfo",
            Self::Response => "response",
            Self::Resource => "resource",
            Self::Request => "request",
            Self::Metadata => "metadata",
            Self::Revisit => "revisit",
            Self::Conversion => "conversion",
            Self::Continuation => "continuation",
            Self::Other(value) => value,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header block parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderParseError {
    /// Block is empty
    #[error("Missing WARC version line")]
    MissingVersion,

    /// First line is not `WARC/x.y`
    #[error("Invalid WARC version line: {0:?}")]
    InvalidVersion(String),

    /// Line without a `name: value` shape
    #[error("Invalid header field: {0:?}")]
    InvalidField(String),

    /// Folded line before any field
    #[error("Continuation line without a preceding field")]
    OrphanContinuation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    name: String,
    values: Vec<String>,
}

/// Header map of one record
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordHeader {
    version: String,
    fields: IndexMap<String, Field>,
}

impl RecordHeader {
    /// Create an empty header with the given version (e.g. `WARC/1.1`)
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            fields: IndexMap::new(),
        }
    }

    /// Parse a header block: the version line followed by field lines.
    ///
    /// Lines may end in CRLF or LF; the terminating blank line is optional.
    ///
    /// # Errors
    ///
    /// Returns error if the version line or a field line is invalid
    pub fn parse(block: &str) -> Result<Self, HeaderParseError> {
        let mut lines = block.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));

        let version = lines.next().filter(|line| !line.is_empty()).ok_or(HeaderParseError::MissingVersion)?;
        if !is_version_line(version) {
            return Err(HeaderParseError::InvalidVersion(version.to_string()));
        }

        let mut header = Self::new(version.trim_end());
        let mut last: Option<String> = None;

        for line in lines {
            if line.is_empty() {
                continue;
            }

            if line.starts_with([' ', '\t']) {
                let key = last.as_ref().ok_or(HeaderParseError::OrphanContinuation)?;
                if let Some(value) = header.fields.get_mut(key).and_then(|f| f.values.last_mut()) {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            let (name, value) = line
                .split_once(':')
                .filter(|(name, _)| is_token(name))
                .ok_or_else(|| HeaderParseError::InvalidField(line.to_string()))?;

            header.insert(name, value.trim());
            last = Some(name.to_ascii_lowercase());
        }

        Ok(header)
    }

    /// WARC version line
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Append a field; repeated names keep every value
    pub fn insert(&mut self, name: &str, value: &str) {
        self.fields
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| Field {
                name: name.to_string(),
                values: Vec::new(),
            })
            .values
            .push(value.to_string());
    }

    /// First value of a field
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .and_then(|field| field.values.first())
            .map(String::as_str)
    }

    /// Every value of a field, in capture order
    pub fn get_all(&self, name: &str) -> impl Iterator<Item = &str> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .into_iter()
            .flat_map(|field| field.values.iter().map(String::as_str))
    }

    /// Whether a field is present
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(&name.to_ascii_lowercase())
    }

    /// Number of distinct field names
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields are present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields as captured, as `(name, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .values()
            .flat_map(|field| field.values.iter().map(move |v| (field.name.as_str(), v.as_str())))
    }

    /// `WARC-Type`
    #[must_use]
    pub fn record_type(&self) -> Option<RecordType> {
        self.get("WARC-Type").map(RecordType::parse)
    }

    /// Whether this is a `request` record
    #[must_use]
    pub fn is_request(&self) -> bool {
        self.record_type() == Some(RecordType::Request)
    }

    /// `WARC-Target-URI`, without the angle brackets some WARC/1.0 writers add
    #[must_use]
    pub fn target_uri(&self) -> Option<&str> {
        self.get("WARC-Target-URI").map(|uri| {
            let uri = uri.trim();
            uri.strip_prefix('<')
                .and_then(|inner| inner.strip_suffix('>'))
                .unwrap_or(uri)
        })
    }

    /// `WARC-Record-ID`
    #[must_use]
    pub fn record_id(&self) -> Option<&str> {
        self.get("WARC-Record-ID")
    }

    /// `Content-Length`, if present and numeric
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.get("Content-Length").and_then(|v| v.trim().parse().ok())
    }
}

impl fmt::Display for RecordHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\r\n", self.version)?;
        for (name, value) in self.iter() {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        f.write_str("\r\n")
    }
}

fn is_version_line(line: &str) -> bool {
    line.strip_prefix("WARC/")
        .map(str::trim_end)
        .is_some_and(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit() || c == '.'))
}

// RFC 7230 token characters
fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}
