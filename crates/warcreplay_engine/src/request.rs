//! Executable outbound requests.

use bytes::Bytes;
use http::{HeaderMap, Method};
use reqwest::Url;

/// A captured request, ready to be sent to a live server.
///
/// The target is always the absolute URI from the record header; the
/// origin-form target of the captured request line is not carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayableRequest {
    /// Request method
    pub method: Method,
    /// Absolute target URI
    pub url: Url,
    /// Captured headers, without hop-by-hop fields
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
}

impl ReplayableRequest {
    /// Create a request with no headers and an empty body
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Set the headers
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Whether there is a body to send
    #[must_use]
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }
}
