//! Feed entry extractor.
//!
//! A feed entry lists several content files, each with its own manifest.
//! Formats from every manifest are merged and ranked together.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::info;

use crate::fetch::Fetcher;
use crate::reference::ReferenceRegistry;

use super::record::{SourceRecordBuilder, StreamDetails, Thumbnail};
use super::smil::rank_formats;
use super::stream::{ManifestSession, format_items};
use super::utils::{
    compile_static_regex, parse_host_or_fallback, url_basename, url_has_host, value_as_f64,
    value_as_u64,
};
use super::{
    ExtractError, Extraction, Extractor, ExtractorConfig, ExtractorKind, fetch_json_with_retry,
};

const MANIFEST_SUFFIX: &str = "&format=SMIL&Tracking=true&Embedded=true&formats=MPEG4,F4M";

static FEED_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r"^https?://[^/]+/f/(?P<provider>[^/]+)/(?P<feed>[^?/]+)\?(?:[^&]+&)*byGuid=(?P<id>[a-zA-Z0-9_]+)",
    )
});

#[derive(Debug, Clone, PartialEq, Eq)]
struct FeedTarget {
    provider: String,
    feed: String,
    guid: String,
}

/// Extractor for single entries of a provider feed.
pub struct ManifestFeedExtractor {
    session: ManifestSession,
    feed_base_url: String,
    references: &'static ReferenceRegistry,
}

impl ManifestFeedExtractor {
    /// Creates an extractor from shared configuration.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &ExtractorConfig) -> Self {
        Self {
            session: ManifestSession::new(
                fetcher,
                config.retry_policy.clone(),
                &config.link_base_url,
            ),
            feed_base_url: config.feed_base_url.trim_end_matches('/').to_string(),
            references: ReferenceRegistry::global(),
        }
    }

    fn target(&self, input: &str) -> Option<FeedTarget> {
        let input = input.trim();
        if !url_has_host(input, &self.feed_base_url) {
            return None;
        }
        let caps = FEED_URL_RE.captures(input)?;
        Some(FeedTarget {
            provider: caps["provider"].to_string(),
            feed: caps["feed"].to_string(),
            guid: caps["id"].to_string(),
        })
    }
}

impl std::fmt::Debug for ManifestFeedExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestFeedExtractor")
            .field("feed_base_url", &self.feed_base_url)
            .field("link_base_url", &self.session.link_base_url())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Extractor for ManifestFeedExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::ManifestFeed
    }

    fn can_handle(&self, input: &str) -> bool {
        self.target(input).is_some()
    }

    #[tracing::instrument(skip(self), fields(extractor = "manifest-feed"))]
    async fn extract(&self, input: &str) -> Result<Extraction, ExtractError> {
        let target = self
            .target(input)
            .ok_or_else(|| ExtractError::discovery(input, "not a feed entry URL"))?;

        let feed_url = format!(
            "{}/f/{}/{}?form=json&byGuid={}",
            self.feed_base_url, target.provider, target.feed, target.guid
        );
        let feed = fetch_json_with_retry(
            self.session.fetcher(),
            self.session.retry_policy(),
            input,
            &feed_url,
        )
        .await?;
        let entry = feed
            .pointer("/entries/0")
            .ok_or_else(|| ExtractError::discovery(input, "feed has no entries"))?;

        let contents = entry
            .get("media$content")
            .and_then(Value::as_array)
            .filter(|contents| !contents.is_empty())
            .ok_or_else(|| ExtractError::discovery(input, "feed entry lists no content"))?;

        let mut formats = Vec::new();
        let mut first: Option<(String, Option<f64>)> = None;
        for content in contents {
            let file_url = content
                .get("plfile$url")
                .and_then(Value::as_str)
                .ok_or_else(|| ExtractError::discovery(input, "content entry has no file URL"))?;
            let manifest_url = format!("{file_url}{MANIFEST_SUFFIX}");
            if first.is_none() {
                let manifest_id = url_basename(&manifest_url).ok_or_else(|| {
                    ExtractError::discovery(input, format!("cannot name manifest {manifest_url}"))
                })?;
                first = Some((manifest_id, content.get("plfile$duration").and_then(value_as_f64)));
            }
            formats.extend(self.session.formats(input, &manifest_url).await?);
        }
        rank_formats(&mut formats);

        let (first_id, duration_secs) = first
            .ok_or_else(|| ExtractError::discovery(input, "feed entry lists no content"))?;
        let metadata_path = format!("{}/{first_id}", target.provider);
        let metadata = self.session.metadata(input, &metadata_path).await?;
        let items = format_items(input, &formats, self.references)?;

        let details = StreamDetails {
            description: metadata.description,
            thumbnail: metadata.thumbnail,
            thumbnails: thumbnails(entry),
            duration_secs: duration_secs.or(metadata.duration_secs),
            subtitles: metadata.subtitles,
            timestamp: entry
                .get("media$availableDate")
                .and_then(value_as_u64)
                .and_then(|millis| i64::try_from(millis / 1000).ok()),
            categories: entry
                .get("media$categories")
                .and_then(Value::as_array)
                .map(|categories| {
                    categories
                        .iter()
                        .filter_map(|c| c.get("media$name").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            formats: Vec::new(),
        };

        let record = SourceRecordBuilder::new(
            parse_host_or_fallback(self.session.link_base_url()),
            target.guid.clone(),
        )
        .media_group_id(metadata_path)
        .title(metadata.title)
        .per_page_format(formats.iter().map(|f| f.container.clone()).collect())
        .stream(StreamDetails { formats, ..details })
        .build();

        info!(
            id = record.id(),
            formats = record.page_count(),
            manifests = contents.len(),
            "feed entry extracted"
        );
        Ok(Extraction { record, items })
    }
}

fn thumbnails(entry: &Value) -> Vec<Thumbnail> {
    entry
        .get("media$thumbnails")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|thumb| {
                    let url = thumb.get("plfile$url").and_then(Value::as_str)?;
                    let dimension = |key: &str| {
                        thumb
                            .get(key)
                            .and_then(value_as_u64)
                            .and_then(|v| u32::try_from(v).ok())
                    };
                    Some(Thumbnail {
                        url: url.to_string(),
                        width: dimension("plfile$width"),
                        height: dimension("plfile$height"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
