//! Extractor registry dispatching inputs to the first extractor that accepts them.

use std::sync::Arc;

use tracing::{debug, info};

use crate::fetch::Fetcher;

use super::{
    ExtractError, Extraction, Extractor, ExtractorConfig, ExtractorKind, GalleryExtractor,
    ManifestFeedExtractor, ManifestStreamExtractor,
};

/// An ordered collection of extractors.
///
/// Inputs are offered to extractors in registration order; the first whose
/// [`Extractor::can_handle`] accepts the input performs the extraction.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Registers an extractor.
    #[tracing::instrument(skip(self, extractor), fields(kind = %extractor.kind()))]
    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        debug!("Registering extractor");
        self.extractors.push(extractor);
    }

    /// Returns the number of registered extractors.
    #[must_use]
    pub fn extractor_count(&self) -> usize {
        self.extractors.len()
    }

    /// Returns true if no extractors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Returns the first extractor that accepts `input`.
    #[must_use]
    pub fn find(&self, input: &str) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.can_handle(input))
            .map(AsRef::as_ref)
    }

    /// Returns the first registered extractor of `kind`.
    #[must_use]
    pub fn by_kind(&self, kind: ExtractorKind) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.kind() == kind)
            .map(AsRef::as_ref)
    }

    /// Extracts `input` with the first extractor that accepts it.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Discovery`] when no extractor recognizes the
    /// input, or the selected extractor's error.
    #[tracing::instrument(skip(self))]
    pub async fn extract(&self, input: &str) -> Result<Extraction, ExtractError> {
        let Some(extractor) = self.find(input) else {
            return Err(ExtractError::Discovery {
                input: input.to_string(),
                reason: "no extractor recognizes this input".to_string(),
                suggestion: "Pass a gallery id, a gallery URL, a stream URL or a feed entry URL"
                    .to_string(),
            });
        };
        info!(kind = %extractor.kind(), "Extracting");
        extractor.extract(input).await
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<ExtractorKind> = self.extractors.iter().map(|e| e.kind()).collect();
        f.debug_struct("ExtractorRegistry")
            .field("extractor_count", &self.extractors.len())
            .field("extractors", &kinds)
            .finish()
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the registry of built-in extractors sharing one fetcher.
#[must_use]
pub fn build_default_extractor_registry(
    fetcher: Arc<dyn Fetcher>,
    config: ExtractorConfig,
) -> ExtractorRegistry {
    let mut registry = ExtractorRegistry::new();
    registry.register(Box::new(GalleryExtractor::with_base_url(
        Arc::clone(&fetcher),
        config.retry_policy.clone(),
        config.gallery_base_url.clone(),
    )));
    registry.register(Box::new(ManifestStreamExtractor::new(
        Arc::clone(&fetcher),
        &config,
    )));
    registry.register(Box::new(ManifestFeedExtractor::new(fetcher, &config)));
    registry
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::fetch::{FetchError, FetchResponse};

    struct Offline;

    #[async_trait]
    impl Fetcher for Offline {
        async fn fetch(
            &self,
            url: &str,
            _headers: &[(&str, &str)],
        ) -> Result<FetchResponse, FetchError> {
            Err(FetchError::http_status(url, 404))
        }
    }

    fn registry() -> ExtractorRegistry {
        build_default_extractor_registry(Arc::new(Offline), ExtractorConfig::default())
    }

    #[test]
    fn test_default_registry_has_all_kinds() {
        let registry = registry();
        assert_eq!(registry.extractor_count(), 3);
        for kind in [
            ExtractorKind::Gallery,
            ExtractorKind::ManifestStream,
            ExtractorKind::ManifestFeed,
        ] {
            assert_eq!(registry.by_kind(kind).unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_find_dispatches_by_input() {
        let registry = registry();
        assert_eq!(registry.find("177013").unwrap().kind(), ExtractorKind::Gallery);
        assert_eq!(
            registry.find("theplatform:abc").unwrap().kind(),
            ExtractorKind::ManifestStream
        );
        assert_eq!(
            registry
                .find("http://feed.theplatform.com/f/p/feed?byGuid=abc")
                .unwrap()
                .kind(),
            ExtractorKind::ManifestFeed
        );
        assert!(registry.find("ftp://nowhere").is_none());
    }

    #[tokio::test]
    async fn test_extract_unrecognized_input() {
        let err = registry().extract("ftp://nowhere").await.unwrap_err();
        assert!(matches!(err, ExtractError::Discovery { .. }));
    }

    #[test]
    fn test_empty_registry() {
        let registry = ExtractorRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.by_kind(ExtractorKind::Gallery).is_none());
    }
}
