//! Source extraction: identifier in, metadata record plus lazy media items out.
//!
//! # Architecture
//!
//! - [`Extractor`] - Async trait each source kind implements
//! - [`ExtractorKind`] - Closed set of supported source kinds
//! - [`ExtractorRegistry`] - Ordered collection dispatching inputs to extractors
//! - [`GalleryExtractor`] - Paginated gallery; items resolve by pure templating
//! - [`ManifestStreamExtractor`] - Manifest-described stream with format ranking
//! - [`ManifestFeedExtractor`] - Feed entry aggregating several manifests
//! - [`smil`] - Manifest parsing and format selection
//! - [`signer`] - Signed manifest URLs
//!
//! Discovery is sequential per source. Every network step goes through
//! [`fetch_with_retry`], and an extraction either returns a complete
//! [`Extraction`] or exactly one [`ExtractError`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use media_resolver::extractor::{ExtractorConfig, build_default_extractor_registry};
//! use media_resolver::fetch::HttpFetcher;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = build_default_extractor_registry(
//!     Arc::new(HttpFetcher::new()?),
//!     ExtractorConfig::default(),
//! );
//! let extraction = registry.extract("177013").await?;
//! println!("{} has {} pages", extraction.record.title(), extraction.record.page_count());
//! # Ok(())
//! # }
//! ```

mod error;
mod feed;
mod gallery;
mod record;
mod registry;
pub mod signer;
pub mod smil;
mod stream;
mod utils;

pub use error::ExtractError;
pub use feed::ManifestFeedExtractor;
pub use gallery::GalleryExtractor;
pub use record::{
    NOT_AVAILABLE, SourceRecord, SourceRecordBuilder, StreamDetails, SubtitleTrack, Thumbnail,
};
pub use registry::{ExtractorRegistry, build_default_extractor_registry};
pub use signer::{SigningKey, UrlSigner};
pub use smil::FormatCandidate;
pub use stream::ManifestStreamExtractor;

use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use crate::fetch::{Fetcher, RetryPolicy, with_retry};
use crate::media::MediaItem;

/// Default gallery site.
pub const DEFAULT_GALLERY_BASE_URL: &str = "https://nhentai.net";

/// Default manifest link service.
pub const DEFAULT_LINK_BASE_URL: &str = "http://link.theplatform.com";

/// Default embeddable player host.
pub const DEFAULT_PLAYER_BASE_URL: &str = "http://player.theplatform.com";

/// Default feed service.
pub const DEFAULT_FEED_BASE_URL: &str = "http://feed.theplatform.com";

/// Closed set of source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtractorKind {
    /// Paginated gallery with one item per page.
    Gallery,
    /// Single manifest-described stream with one item per encoding.
    ManifestStream,
    /// Feed entry whose encodings span several manifests.
    ManifestFeed,
}

impl ExtractorKind {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gallery => "gallery",
            Self::ManifestStream => "manifest-stream",
            Self::ManifestFeed => "manifest-feed",
        }
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one successful extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Immutable metadata.
    pub record: SourceRecord,
    /// Items ordered by ordinal, 1..=`record.page_count()`.
    pub items: Vec<MediaItem>,
}

/// Settings shared by the built-in extractors.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Retry policy wrapping every network step.
    pub retry_policy: RetryPolicy,
    /// Gallery site base URL.
    pub gallery_base_url: String,
    /// Manifest link service base URL.
    pub link_base_url: String,
    /// Player host base URL.
    pub player_base_url: String,
    /// Feed service base URL.
    pub feed_base_url: String,
    /// Key used to sign manifest URLs, when the provider requires it.
    pub signing_key: Option<SigningKey>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            gallery_base_url: DEFAULT_GALLERY_BASE_URL.to_string(),
            link_base_url: DEFAULT_LINK_BASE_URL.to_string(),
            player_base_url: DEFAULT_PLAYER_BASE_URL.to_string(),
            feed_base_url: DEFAULT_FEED_BASE_URL.to_string(),
            signing_key: None,
        }
    }
}

impl ExtractorConfig {
    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Points every base URL at one origin (for tests against a mock server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        self.gallery_base_url.clone_from(&base);
        self.link_base_url.clone_from(&base);
        self.player_base_url.clone_from(&base);
        self.feed_base_url = base;
        self
    }

    /// Sets the manifest signing key.
    #[must_use]
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }
}

/// Trait that all extractors implement.
///
/// # Object Safety
///
/// Uses `async_trait` so registries can hold `Box<dyn Extractor>`.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Returns the source kind this extractor handles.
    fn kind(&self) -> ExtractorKind;

    /// Returns true if this extractor recognizes the identifier.
    fn can_handle(&self, input: &str) -> bool;

    /// Fetches and parses the source.
    async fn extract(&self, input: &str) -> Result<Extraction, ExtractError>;
}

/// Fetches `url` as text under `policy`.
///
/// Transient failures are retried; once the budget is spent they surface as
/// [`ExtractError::Discovery`]. HTTP 451 surfaces as
/// [`ExtractError::RestrictedContent`].
///
/// # Errors
///
/// Returns the mapped failure of the last attempt.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    policy: &RetryPolicy,
    input: &str,
    url: &str,
    headers: &[(&str, &str)],
) -> Result<String, ExtractError> {
    debug!(url, "fetching");
    with_retry(policy, move || async move {
        fetcher
            .fetch(url, headers)
            .await
            .map(|response| response.body)
            .map_err(|e| ExtractError::from_fetch(input, e))
    })
    .await
    .map_err(|e| e.promote_transient(policy.max_attempts()))
}

/// Fetches `url` and parses the body as JSON.
///
/// # Errors
///
/// As [`fetch_with_retry`], plus [`ExtractError::Discovery`] for invalid JSON.
pub async fn fetch_json_with_retry(
    fetcher: &dyn Fetcher,
    policy: &RetryPolicy,
    input: &str,
    url: &str,
) -> Result<serde_json::Value, ExtractError> {
    let body = fetch_with_retry(fetcher, policy, input, url, &[]).await?;
    serde_json::from_str(&body)
        .map_err(|e| ExtractError::discovery(input, format!("invalid JSON from {url}: {e}")))
}
