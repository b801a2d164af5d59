//! Run configuration.
//!
//! Built once at startup from command-line flags and never mutated while
//! archives are being replayed.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of in-flight requests per archive
pub const DEFAULT_CONCURRENCY: usize = 6;

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Forward proxy URL; `None` or an empty string means a direct connection
    pub proxy: Option<String>,
    /// Per-request deadline in milliseconds (`None` = transport defaults)
    pub request_timeout_ms: Option<u64>,
    /// Skip TLS certificate verification
    pub accept_invalid_certs: bool,
    /// Replace the captured `User-Agent` with this value
    pub user_agent: Option<String>,
}

impl ClientConfig {
    /// Create a config with the replay defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            proxy: None,
            request_timeout_ms: None,
            accept_invalid_certs: true,
            user_agent: None,
        }
    }

    /// Set the forward proxy
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = Some(timeout_ms);
        self
    }

    /// Enable/disable TLS certificate verification bypass
    #[must_use]
    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Override the user agent sent with every request
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Proxy URL, if one is configured
    #[must_use]
    pub fn proxy(&self) -> Option<&str> {
        self.proxy
            .as_deref()
            .map(str::trim)
            .filter(|proxy| !proxy.is_empty())
    }

    /// Per-request timeout, if one is configured
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Validate the client settings
    ///
    /// # Errors
    ///
    /// Returns error if the proxy is not an absolute URL with a host, or the
    /// timeout is zero
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(proxy) = self.proxy() {
            let uri: http::Uri = proxy
                .parse()
                .map_err(|err| CoreError::invalid_config("proxy", format!("{}: {}", proxy, err)))?;
            if uri.scheme().is_none() || uri.host().is_none() {
                return Err(CoreError::invalid_config(
                    "proxy",
                    format!("{}: expected scheme://host[:port]", proxy),
                ));
            }
        }

        if self.request_timeout_ms == Some(0) {
            return Err(CoreError::invalid_config(
                "request_timeout_ms",
                "must be greater than zero",
            ));
        }

        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for one replay run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Maximum in-flight requests per archive
    pub concurrency: usize,
    /// HTTP client settings
    pub client: ClientConfig,
}

impl ReplayConfig {
    /// Create a config with the default cap
    #[must_use]
    pub fn new() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            client: ClientConfig::default(),
        }
    }

    /// Set the per-archive concurrency cap
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the client settings
    #[must_use]
    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    /// Validate the whole configuration
    ///
    /// # Errors
    ///
    /// Returns error if the cap is zero or the client settings are invalid
    pub fn validate(&self) -> CoreResult<()> {
        if self.concurrency == 0 {
            return Err(CoreError::invalid_config("concurrency", "must be at least 1"));
        }
        self.client.validate()
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self::new()
    }
}
