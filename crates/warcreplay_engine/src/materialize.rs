//! Turning stored request records into executable requests.
//!
//! The record content is buffered in full before anything else happens: the
//! content reader is backed by the archive stream, which moves on as soon as
//! the next record is requested.

use crate::request::ReplayableRequest;
use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use reqwest::Url;
use std::io::Read;
use warcreplay_archive::Record;

/// Most header lines accepted in a captured request
const MAX_HEADERS: usize = 128;

/// Fields that only make sense on the connection the request was captured
/// from. The client recomputes `Content-Length` from the buffered body.
const TRANSPORT_ONLY: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::CONTENT_LENGTH,
];

/// Errors that make a request record unusable.
///
/// All of them mean the archive itself is damaged.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    /// Record content could not be read to completion
    #[error("Failed to read record content: {0}")]
    Content(#[source] std::io::Error),

    /// Stored bytes are not a well-formed HTTP request
    #[error("Invalid HTTP request: {0}")]
    Request(String),

    /// Record has no `WARC-Target-URI`
    #[error("Missing WARC-Target-URI")]
    MissingTarget,

    /// `WARC-Target-URI` is not an absolute URI
    #[error("Invalid WARC-Target-URI {value:?}: {reason}")]
    InvalidTarget {
        /// Header value as captured
        value: String,
        /// Parser message
        reason: String,
    },
}

/// Build a [`ReplayableRequest`] from a `request` record.
///
/// # Errors
///
/// Returns error if the content cannot be read, the stored request does not
/// parse, or the target URI header is missing or not absolute
pub fn materialize<C: Read>(record: &mut Record<C>) -> Result<ReplayableRequest, MaterializeError> {
    let buf = record.read_content().map_err(MaterializeError::Content)?;

    let parsed = parse_request(&buf)?;

    let value = record.header().target_uri().ok_or(MaterializeError::MissingTarget)?;
    let url = Url::parse(value).map_err(|err| MaterializeError::InvalidTarget {
        value: value.to_string(),
        reason: err.to_string(),
    })?;

    tracing::trace!(captured = %parsed.target, url = %url, "resolved request target");

    Ok(ReplayableRequest::new(parsed.method, url)
        .with_headers(parsed.headers)
        .with_body(parsed.body))
}

/// A stored request before its target is resolved
#[derive(Debug)]
struct ParsedRequest {
    method: Method,
    /// Request-line target as captured; dropped after parsing
    target: String,
    headers: HeaderMap,
    body: Bytes,
}

fn parse_request(buf: &[u8]) -> Result<ParsedRequest, MaterializeError> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut slots);

    let head_len = match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => {
            return Err(MaterializeError::Request("incomplete request head".to_string()));
        }
        Err(err) => return Err(MaterializeError::Request(err.to_string())),
    };

    let method = req
        .method
        .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
        .ok_or_else(|| MaterializeError::Request("invalid method".to_string()))?;
    let target = req.path.unwrap_or_default().to_string();

    let mut headers = HeaderMap::with_capacity(req.headers.len());
    let mut chunked = false;
    let mut content_length = None;

    for field in req.headers.iter() {
        let name = HeaderName::from_bytes(field.name.as_bytes())
            .map_err(|_| MaterializeError::Request(format!("invalid header name {:?}", field.name)))?;

        if name == header::TRANSFER_ENCODING {
            chunked |= String::from_utf8_lossy(field.value)
                .split(',')
                .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
        } else if name == header::CONTENT_LENGTH {
            content_length = std::str::from_utf8(field.value)
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok());
        }

        if TRANSPORT_ONLY.contains(&name) {
            continue;
        }

        let value = HeaderValue::from_bytes(field.value)
            .map_err(|_| MaterializeError::Request(format!("invalid value for header {}", name)))?;
        headers.append(name, value);
    }

    let rest = &buf[head_len..];
    let body = if chunked {
        decode_chunked(rest)?
    } else {
        let len = content_length.map_or(rest.len(), |len| len.min(rest.len()));
        if content_length.is_some_and(|len| len > rest.len()) {
            tracing::debug!(
                declared = content_length,
                captured = rest.len(),
                "request body shorter than Content-Length"
            );
        }
        Bytes::copy_from_slice(&rest[..len])
    };

    Ok(ParsedRequest {
        method,
        target,
        headers,
        body,
    })
}

/// Decode a chunked body. A capture that stops before the last chunk keeps
/// whatever was complete.
fn decode_chunked(mut data: &[u8]) -> Result<Bytes, MaterializeError> {
    let mut body = Vec::with_capacity(data.len());

    while let Some(eol) = data.windows(2).position(|w| w == b"\r\n") {
        let line = std::str::from_utf8(&data[..eol])
            .map_err(|_| MaterializeError::Request("invalid chunk size line".to_string()))?;
        let size_str = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| MaterializeError::Request(format!("invalid chunk size {:?}", size_str)))?;
        data = &data[eol + 2..];

        if size == 0 {
            break;
        }
        if data.len() < size {
            body.extend_from_slice(data);
            break;
        }
        body.extend_from_slice(&data[..size]);
        data = data[size..].strip_prefix(b"\r\n").unwrap_or(&data[size..]);
    }

    Ok(Bytes::from(body))
}
