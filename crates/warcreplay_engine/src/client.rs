//! Replay client.
//!
//! One client is built per run and shared by every archive and every
//! in-flight request. Redirects are returned as-is rather than followed: the
//! archive holds its own capture of the redirect target when it was crawled.

use crate::request::ReplayableRequest;
use async_trait::async_trait;
use http::header::{self, HeaderValue};
use http::StatusCode;
use reqwest::{Proxy, redirect};
use std::error::Error as StdError;
use warcreplay_core::{ClientConfig, CoreError};

/// Result of one executed request after its body was drained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayResponse {
    /// Response status
    pub status: StatusCode,
    /// Body bytes downloaded
    pub bytes: u64,
}

/// Per-request failures. Never fatal for the archive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connecting or sending failed, no response was received
    #[error("{0}")]
    Request(String),

    /// A response arrived but its body could not be read to the end
    #[error("{reason} (status {status}, {bytes} bytes read)")]
    Download {
        /// Response status
        status: StatusCode,
        /// Bytes read before the failure
        bytes: u64,
        /// What went wrong
        reason: String,
    },
}

/// Client construction errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Configuration rejected before building
    #[error(transparent)]
    Config(#[from] CoreError),

    /// Proxy URL refused by the HTTP stack
    #[error("Invalid proxy {proxy}: {reason}")]
    InvalidProxy {
        /// Proxy as configured
        proxy: String,
        /// Why it was refused
        reason: String,
    },

    /// User agent is not a valid header value
    #[error("Invalid user agent {0:?}")]
    InvalidUserAgent(String),

    /// HTTP stack failed to initialize
    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

impl From<ClientError> for CoreError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Config(core) => core,
            ClientError::InvalidProxy { proxy, reason } => {
                CoreError::invalid_config("proxy", format!("{}: {}", proxy, reason))
            }
            ClientError::InvalidUserAgent(agent) => {
                CoreError::invalid_config("user_agent", format!("{:?}", agent))
            }
            ClientError::Build(message) => CoreError::Internal { message },
        }
    }
}

/// Executes replayable requests.
///
/// Implementations must be safe for concurrent use without external
/// locking; the scheduler calls `execute` from many tasks at once.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send the request and drain the response body
    async fn execute(&self, request: ReplayableRequest) -> Result<ReplayResponse, TransportError>;
}

/// reqwest-backed [`Transport`]
#[derive(Debug, Clone)]
pub struct ReplayClient {
    client: reqwest::Client,
    user_agent: Option<HeaderValue>,
}

impl ReplayClient {
    /// Build the client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the HTTP stack
    /// cannot be initialized
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .redirect(redirect::Policy::none());

        builder = match config.proxy() {
            Some(proxy) => builder.proxy(Proxy::all(proxy).map_err(|err| ClientError::InvalidProxy {
                proxy: proxy.to_string(),
                reason: err.to_string(),
            })?),
            // environment proxies are not consulted either
            None => builder.no_proxy(),
        };

        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }

        let user_agent = config
            .user_agent
            .as_deref()
            .map(|agent| {
                HeaderValue::from_str(agent).map_err(|_| ClientError::InvalidUserAgent(agent.to_string()))
            })
            .transpose()?;

        let client = builder.build().map_err(|err| ClientError::Build(describe(&err)))?;

        tracing::debug!(
            proxy = config.proxy().unwrap_or("none"),
            timeout_ms = config.request_timeout_ms,
            verify_tls = !config.accept_invalid_certs,
            "replay client ready"
        );

        Ok(Self { client, user_agent })
    }
}

#[async_trait]
impl Transport for ReplayClient {
    async fn execute(&self, request: ReplayableRequest) -> Result<ReplayResponse, TransportError> {
        let send_body = request.has_body();
        let ReplayableRequest {
            method,
            url,
            mut headers,
            body,
        } = request;

        if let Some(agent) = &self.user_agent {
            headers.insert(header::USER_AGENT, agent.clone());
        }

        let mut builder = self.client.request(method, url).headers(headers);
        if send_body {
            builder = builder.body(body);
        }

        let mut response = builder
            .send()
            .await
            .map_err(|err| TransportError::Request(describe(&err)))?;

        let status = response.status();
        let mut bytes = 0u64;

        // Drain so the connection goes back to the pool
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => bytes += chunk.len() as u64,
                Ok(None) => break,
                Err(err) => {
                    return Err(TransportError::Download {
                        status,
                        bytes,
                        reason: describe(&err),
                    });
                }
            }
        }

        Ok(ReplayResponse { status, bytes })
    }
}

/// Error message including its source chain
fn describe(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.contains(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}
