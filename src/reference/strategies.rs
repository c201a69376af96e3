//! Built-in reference strategies.
//!
//! Both are pure derivations: once discovery has produced the seed, no
//! network call is needed to turn it into a URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::{ReferenceStrategy, ResolveError};
use crate::media::MediaFormat;

/// Kind tag for gallery pages derived from host + media group + page + format.
pub const DERIVED_URL_KIND: &str = "derived-url";

/// Kind tag for URLs already known at discovery time.
pub const DIRECT_URL_KIND: &str = "direct-url";

/// Seed of a `derived-url` reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedUrlSeed {
    /// Media host base URL (e.g. `https://i.example.net`).
    pub host: String,
    /// Media group id the page files live under.
    pub media_group_id: u64,
    /// 1-based page number.
    pub page: u32,
    /// Container of this page.
    pub format: MediaFormat,
}

impl DerivedUrlSeed {
    /// Builds the final URL: `{host}/galleries/{media_group_id}/{page}.{ext}`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidSeed`] when `host` is not an absolute URL.
    pub fn to_url(&self) -> Result<String, ResolveError> {
        let host = Url::parse(&self.host).map_err(|e| {
            ResolveError::invalid_seed(DERIVED_URL_KIND, format!("bad host '{}': {e}", self.host))
        })?;
        let path = format!(
            "/galleries/{}/{}.{}",
            self.media_group_id,
            self.page,
            self.format.extension()
        );
        host.join(&path)
            .map(String::from)
            .map_err(|e| ResolveError::invalid_seed(DERIVED_URL_KIND, e.to_string()))
    }

    fn from_value(seed: &Value) -> Result<Self, ResolveError> {
        let parsed: Self = serde_json::from_value(seed.clone())
            .map_err(|e| ResolveError::invalid_seed(DERIVED_URL_KIND, e.to_string()))?;
        if parsed.page == 0 {
            return Err(ResolveError::invalid_seed(
                DERIVED_URL_KIND,
                "page numbers start at 1",
            ));
        }
        Ok(parsed)
    }
}

/// Seed of a `direct-url` reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectUrlSeed {
    /// The final URL.
    pub url: String,
}

impl DirectUrlSeed {
    fn from_value(seed: &Value) -> Result<Self, ResolveError> {
        let parsed: Self = serde_json::from_value(seed.clone())
            .map_err(|e| ResolveError::invalid_seed(DIRECT_URL_KIND, e.to_string()))?;
        Url::parse(&parsed.url).map_err(|e| {
            ResolveError::invalid_seed(DIRECT_URL_KIND, format!("bad url '{}': {e}", parsed.url))
        })?;
        Ok(parsed)
    }
}

/// Strategy for [`DERIVED_URL_KIND`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivedUrlStrategy;

#[async_trait]
impl ReferenceStrategy for DerivedUrlStrategy {
    fn kind(&self) -> &str {
        DERIVED_URL_KIND
    }

    fn validate(&self, seed: &Value) -> Result<(), ResolveError> {
        DerivedUrlSeed::from_value(seed)?.to_url().map(|_| ())
    }

    async fn resolve(&self, seed: &Value) -> Result<String, ResolveError> {
        DerivedUrlSeed::from_value(seed)?.to_url()
    }
}

/// Strategy for [`DIRECT_URL_KIND`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectUrlStrategy;

#[async_trait]
impl ReferenceStrategy for DirectUrlStrategy {
    fn kind(&self) -> &str {
        DIRECT_URL_KIND
    }

    fn validate(&self, seed: &Value) -> Result<(), ResolveError> {
        DirectUrlSeed::from_value(seed).map(|_| ())
    }

    async fn resolve(&self, seed: &Value) -> Result<String, ResolveError> {
        DirectUrlSeed::from_value(seed).map(|seed| seed.url)
    }
}
