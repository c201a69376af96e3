//! Fetch capability consumed by extractors and reference strategies.
//!
//! The crate never talks to the network directly; it goes through a
//! [`Fetcher`], which surfaces transport failures as [`FetchError`] values
//! that [`with_retry`] can classify and re-run.
//!
//! # Example
//!
//! ```no_run
//! use media_resolver::fetch::{Fetcher, HttpFetcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = HttpFetcher::new()?;
//! let response = fetcher.fetch("https://example.com/", &[]).await?;
//! println!("{} bytes", response.body.len());
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
pub mod retry;

pub use client::{CONNECT_TIMEOUT_SECS, FetchConfig, HttpFetcher, READ_TIMEOUT_SECS};
pub use error::FetchError;
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, Retryable,
    classify_fetch_error, with_retry,
};

use async_trait::async_trait;

/// A successful fetch: status plus decoded text body.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code (always a success code for [`HttpFetcher`]).
    pub status: u16,
    /// Response body decoded as text.
    pub body: String,
}

impl FetchResponse {
    /// Creates a response with status 200.
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// The fetch capability: `fetch(url, headers) -> (status, body)`.
///
/// Implementations must report non-success responses and transport failures
/// as errors. No caching is assumed.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url` with the given extra request headers.
    async fn fetch(&self, url: &str, headers: &[(&str, &str)])
    -> Result<FetchResponse, FetchError>;
}
