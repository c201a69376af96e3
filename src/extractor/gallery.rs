//! Paginated gallery extractor.
//!
//! One page fetch yields the whole gallery description; page URLs are then
//! derived from the media host, media group id and per-page format code, so
//! resolution needs no further network access.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use crate::fetch::{Fetcher, RetryPolicy};
use crate::media::{MediaFormat, MediaItem};
use crate::reference::{DERIVED_URL_KIND, DerivedUrlSeed, ReferenceRegistry};

use super::record::SourceRecordBuilder;
use super::utils::{compile_static_regex, url_has_host, value_as_u64};
use super::{
    DEFAULT_GALLERY_BASE_URL, ExtractError, Extraction, Extractor, ExtractorKind,
    fetch_with_retry,
};

const PAYLOAD_START: &str = "JSON.parse(";
const PAYLOAD_END: &str = ");";

static GALLERY_PATH_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"/g/([0-9]+)"));
static PREFIXED_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"^nhentai_([0-9]+)$"));
static MEDIA_HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"media_url:\s*['"]([^'"]+)"#));

/// Extractor for galleries addressed by numeric id or gallery URL.
pub struct GalleryExtractor {
    fetcher: Arc<dyn Fetcher>,
    retry_policy: RetryPolicy,
    base_url: String,
    references: &'static ReferenceRegistry,
}

impl GalleryExtractor {
    /// Creates an extractor against the public gallery site.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, retry_policy: RetryPolicy) -> Self {
        Self::with_base_url(fetcher, retry_policy, DEFAULT_GALLERY_BASE_URL)
    }

    /// Creates an extractor with a custom site origin for tests.
    #[must_use]
    pub fn with_base_url(
        fetcher: Arc<dyn Fetcher>,
        retry_policy: RetryPolicy,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            retry_policy,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            references: ReferenceRegistry::global(),
        }
    }

    /// Extracts the numeric gallery id from any accepted input form.
    fn gallery_id(&self, input: &str) -> Option<u64> {
        let input = input.trim();
        if let Ok(id) = input.parse::<u64>() {
            return Some(id);
        }
        if let Some(caps) = PREFIXED_ID_RE.captures(input) {
            return caps[1].parse().ok();
        }
        if url_has_host(input, &self.base_url) {
            return GALLERY_PATH_RE
                .captures(input)
                .and_then(|caps| caps[1].parse().ok());
        }
        None
    }

    fn page_url(&self, id: u64, page: u32) -> String {
        format!("{}/g/{id}/{page}/", self.base_url)
    }
}

impl std::fmt::Debug for GalleryExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GalleryExtractor")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Extractor for GalleryExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Gallery
    }

    fn can_handle(&self, input: &str) -> bool {
        self.gallery_id(input).is_some()
    }

    #[tracing::instrument(skip(self), fields(extractor = "gallery"))]
    async fn extract(&self, input: &str) -> Result<Extraction, ExtractError> {
        let id = self
            .gallery_id(input)
            .ok_or_else(|| ExtractError::discovery(input, "not a gallery id or gallery URL"))?;

        let url = self.page_url(id, 1);
        let referer = format!("{}/g/{id}/", self.base_url);
        let html = fetch_with_retry(
            self.fetcher.as_ref(),
            &self.retry_policy,
            input,
            &url,
            &[("Referer", referer.as_str())],
        )
        .await?;

        let gallery = parse_payload(input, &html)?;
        let host = MEDIA_HOST_RE
            .captures(&html)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| ExtractError::discovery(input, "page has no media host marker"))?;

        let media_group_id = gallery
            .get("media_id")
            .and_then(value_as_u64)
            .ok_or_else(|| ExtractError::discovery(input, "gallery payload has no media_id"))?;
        let gallery_id = gallery
            .get("id")
            .and_then(value_as_u64)
            .unwrap_or(id);

        let mut builder = SourceRecordBuilder::new(host.clone(), gallery_id.to_string())
            .media_group_id(media_group_id.to_string());
        if let Some(title) = gallery.pointer("/title/english").and_then(Value::as_str) {
            builder = builder.title(title);
        }
        builder = classify_tags(builder, &gallery);

        let formats = page_formats(input, &gallery)?;
        let mut items = Vec::with_capacity(formats.len());
        for (page, format) in (1u32..).zip(&formats) {
            let seed = DerivedUrlSeed {
                host: host.clone(),
                media_group_id,
                page,
                format: format.clone(),
            };
            let seed = serde_json::to_value(&seed)
                .map_err(|e| ExtractError::discovery(input, e.to_string()))?;
            let reference = self
                .references
                .create(DERIVED_URL_KIND, seed)
                .map_err(|e| ExtractError::discovery(input, e.to_string()))?;
            items.push(MediaItem::new(page, self.page_url(gallery_id, page), reference));
        }

        let record = builder.per_page_format(formats).build();
        info!(
            id = record.id(),
            pages = record.page_count(),
            title = record.title(),
            "gallery extracted"
        );
        Ok(Extraction { record, items })
    }
}

/// Locates and decodes the embedded gallery description.
///
/// The payload is a JSON string literal whose contents are JSON, so it is
/// decoded twice. A payload that is already an object is accepted as is.
fn parse_payload(input: &str, html: &str) -> Result<Value, ExtractError> {
    let raw = html
        .split_once(PAYLOAD_START)
        .and_then(|(_, rest)| rest.split_once(PAYLOAD_END))
        .map(|(payload, _)| payload.trim())
        .ok_or_else(|| ExtractError::discovery(input, "page has no embedded gallery payload"))?;

    let outer: Value = serde_json::from_str(raw)
        .map_err(|e| ExtractError::discovery(input, format!("gallery payload is not JSON: {e}")))?;
    let gallery = match outer {
        Value::String(inner) => serde_json::from_str(&inner).map_err(|e| {
            ExtractError::discovery(input, format!("gallery payload is not JSON: {e}"))
        })?,
        other => other,
    };

    if !gallery.is_object() {
        return Err(ExtractError::discovery(input, "gallery payload is not an object"));
    }
    debug!("decoded gallery payload");
    Ok(gallery)
}

/// Applies tags by exact type; unrecognized types are ignored.
fn classify_tags(mut builder: SourceRecordBuilder, gallery: &Value) -> SourceRecordBuilder {
    let Some(tags) = gallery.get("tags").and_then(Value::as_array) else {
        return builder;
    };
    for tag in tags {
        let (Some(kind), Some(name)) = (
            tag.get("type").and_then(Value::as_str),
            tag.get("name").and_then(Value::as_str),
        ) else {
            continue;
        };
        builder = match kind {
            "artist" => builder.artist(name),
            "group" => builder.group(name),
            "parody" if name != "original" => builder.series(name),
            "language" => builder.language(name),
            "category" => builder.category(name),
            _ => builder,
        };
    }
    builder
}

/// Maps each page's format code through the closed lookup.
fn page_formats(input: &str, gallery: &Value) -> Result<Vec<MediaFormat>, ExtractError> {
    let pages = gallery
        .pointer("/images/pages")
        .and_then(Value::as_array)
        .ok_or_else(|| ExtractError::discovery(input, "gallery payload has no page list"))?;
    if pages.is_empty() {
        return Err(ExtractError::discovery(input, "gallery has no pages"));
    }

    (1u32..)
        .zip(pages)
        .map(|(page, entry)| {
            let code = entry.get("t").and_then(Value::as_str).unwrap_or_default();
            MediaFormat::from_page_code(code)
                .ok_or_else(|| ExtractError::unknown_format_code(input, code, page))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fetch::{FetchError, FetchResponse};

    struct NoFetch;

    #[async_trait]
    impl Fetcher for NoFetch {
        async fn fetch(
            &self,
            url: &str,
            _headers: &[(&str, &str)],
        ) -> Result<FetchResponse, FetchError> {
            Err(FetchError::transport(url, "offline"))
        }
    }

    fn extractor() -> GalleryExtractor {
        GalleryExtractor::with_base_url(
            Arc::new(NoFetch),
            RetryPolicy::immediate(1),
            "https://gallery.example.net/",
        )
    }

    #[test]
    fn test_accepted_inputs() {
        let e = extractor();
        assert_eq!(e.gallery_id("177013"), Some(177_013));
        assert_eq!(e.gallery_id("nhentai_42"), Some(42));
        assert_eq!(e.gallery_id("https://gallery.example.net/g/99/"), Some(99));
        assert_eq!(e.gallery_id("https://gallery.example.net/g/99/3/"), Some(99));
        assert_eq!(e.gallery_id("https://other.example.com/g/99/"), None);
        assert_eq!(e.gallery_id("theplatform:abc"), None);
    }

    #[test]
    fn test_parse_payload_double_decodes() {
        let inner = json!({"id": 5, "media_id": "77"}).to_string();
        let html = format!(
            "<script>var gallery = JSON.parse({});\nmedia_url: 'https://i.example.net/'</script>",
            serde_json::to_string(&inner).unwrap()
        );
        let value = parse_payload("5", &html).unwrap();
        assert_eq!(value["media_id"], "77");
    }

    #[test]
    fn test_parse_payload_missing_is_discovery() {
        let err = parse_payload("5", "<html></html>").unwrap_err();
        assert!(matches!(err, ExtractError::Discovery { .. }));
    }

    #[test]
    fn test_classify_tags_by_exact_type() {
        let gallery = json!({"tags": [
            {"type": "artist", "name": "b"},
            {"type": "artist", "name": "a"},
            {"type": "group", "name": "circle"},
            {"type": "parody", "name": "original"},
            {"type": "parody", "name": "some series"},
            {"type": "language", "name": "english"},
            {"type": "category", "name": "doujinshi"},
            {"type": "tag", "name": "ignored"},
        ]});
        let record = classify_tags(SourceRecordBuilder::new("h", "1"), &gallery).build();
        assert_eq!(record.artists().len(), 2);
        assert!(record.groups().contains("circle"));
        assert_eq!(record.series().iter().collect::<Vec<_>>(), vec!["some series"]);
        assert_eq!(record.language(), "english");
        assert_eq!(record.category(), "doujinshi");
    }

    #[test]
    fn test_unknown_page_code_is_fatal() {
        let gallery = json!({"images": {"pages": [{"t": "j"}, {"t": "w"}]}});
        let err = page_formats("1", &gallery).unwrap_err();
        match err {
            ExtractError::UnknownFormatCode { code, page, .. } => {
                assert_eq!(code, "w");
                assert_eq!(page, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_gallery_is_discovery() {
        let gallery = json!({"images": {"pages": []}});
        assert!(matches!(
            page_formats("1", &gallery).unwrap_err(),
            ExtractError::Discovery { .. }
        ));
    }

    #[tokio::test]
    async fn test_unreachable_site_is_discovery() {
        let err = extractor().extract("1").await.unwrap_err();
        assert!(matches!(err, ExtractError::Discovery { .. }), "got {err:?}");
    }
}
