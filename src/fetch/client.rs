//! reqwest-backed [`Fetcher`] implementation.
//!
//! Centralizes networking defaults so every extractor shares the same
//! timeout, user-agent and compression policy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, instrument};

use super::{FetchError, FetchResponse, Fetcher};
use crate::user_agent;

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP read timeout (30 seconds).
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Network settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Total request timeout in seconds.
    pub read_timeout_secs: u64,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            user_agent: user_agent::default_user_agent(),
        }
    }
}

/// HTTP fetcher with connection pooling.
///
/// Create once and share (it is cheap to clone).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the underlying client cannot be built.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(&FetchConfig::default())
    }

    /// Creates a fetcher with custom timeouts and user agent.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the underlying client cannot be built.
    pub fn with_config(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .user_agent(config.user_agent.clone())
            .gzip(true)
            .build()
            .map_err(|e| FetchError::network("client-builder", e))?;

        debug!(
            connect_timeout_secs = config.connect_timeout_secs,
            read_timeout_secs = config.read_timeout_secs,
            "created HTTP fetcher"
        );
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self, headers), fields(url = %url))]
    async fn fetch(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<FetchResponse, FetchError> {
        let parsed = url::Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;
        let header_map = build_header_map(url, headers)?;

        let response = self
            .client
            .get(parsed)
            .headers(header_map)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::timeout(url)
                } else {
                    FetchError::network(url, e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "non-success response");
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::body(url, e.to_string())
            }
        })?;

        debug!(status = status.as_u16(), bytes = body.len(), "fetched");
        Ok(FetchResponse {
            status: status.as_u16(),
            body,
        })
    }
}

fn build_header_map(url: &str, headers: &[(&str, &str)]) -> Result<HeaderMap, FetchError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| FetchError::transport(url, format!("invalid header name '{name}'")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| FetchError::transport(url, format!("invalid header value for '{name}'")))?;
        map.insert(name, value);
    }
    Ok(map)
}
