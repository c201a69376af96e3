//! Manifest-described stream extractor.
//!
//! Discovery walks input URL, optional player config, SMIL manifest and
//! preview metadata. Each ranked encoding becomes one item whose URL is
//! already known, so items resolve without further network access.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use crate::fetch::{Fetcher, RetryPolicy};
use crate::media::MediaItem;
use crate::reference::{DIRECT_URL_KIND, DirectUrlSeed, ReferenceRegistry};

use super::record::{SourceRecordBuilder, StreamDetails, SubtitleTrack};
use super::signer::{DEFAULT_LIFETIME_SECS, SigningKey, UrlSigner};
use super::smil::{FormatCandidate, parse_smil, select_formats};
use super::utils::{compile_static_regex, parse_host_or_fallback, url_has_host, value_as_u64};
use super::{
    ExtractError, Extraction, Extractor, ExtractorConfig, ExtractorKind, fetch_json_with_retry,
    fetch_with_retry,
};

/// Provider used by the short `theplatform:<id>` form.
pub const DEFAULT_PROVIDER: &str = "dJ5BDC";

const RELEASE_SUFFIX: &str = "&format=SMIL&formats=MPEG4&manifest=f4m";

static STREAM_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r"^https?://[^/]+/[sp]/(?P<provider>[^/]+)/(?:(?P<media>(?:[^/]+/)+select/media/)|(?P<config>(?:[^/?]+/(?:swf|config)|onsite)/select/))?(?P<id>[^/?&]+)",
    )
});
static SHORT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"^theplatform:(?P<id>[^/?&]+)"));

/// Parsed stream input.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StreamTarget {
    provider: String,
    id: String,
    media: bool,
    config: bool,
}

impl StreamTarget {
    /// `provider[/media]/id`, the path used by the link service.
    fn path(&self) -> String {
        if self.media {
            format!("{}/media/{}", self.provider, self.id)
        } else {
            format!("{}/{}", self.provider, self.id)
        }
    }
}

/// Metadata served by the link service's preview endpoint.
#[derive(Debug, Clone, Default)]
pub(super) struct PreviewMetadata {
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub duration_secs: Option<f64>,
    pub subtitles: BTreeMap<String, Vec<SubtitleTrack>>,
}

/// Shared manifest plumbing used by the stream and feed extractors.
pub(super) struct ManifestSession {
    fetcher: Arc<dyn Fetcher>,
    retry_policy: RetryPolicy,
    link_base_url: String,
}

impl ManifestSession {
    pub(super) fn new(
        fetcher: Arc<dyn Fetcher>,
        retry_policy: RetryPolicy,
        link_base_url: &str,
    ) -> Self {
        Self {
            fetcher,
            retry_policy,
            link_base_url: link_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub(super) fn link_base_url(&self) -> &str {
        &self.link_base_url
    }

    pub(super) fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    pub(super) fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Fetches one manifest and returns its ranked formats.
    pub(super) async fn formats(
        &self,
        input: &str,
        manifest_url: &str,
    ) -> Result<Vec<FormatCandidate>, ExtractError> {
        let text = fetch_with_retry(
            self.fetcher.as_ref(),
            &self.retry_policy,
            input,
            manifest_url,
            &[],
        )
        .await?;
        select_formats(&parse_smil(&text), manifest_url)
    }

    /// Fetches `{link}/s/{path}?format=preview`.
    pub(super) async fn metadata(
        &self,
        input: &str,
        path: &str,
    ) -> Result<PreviewMetadata, ExtractError> {
        let url = format!("{}/s/{path}?format=preview", self.link_base_url);
        let info =
            fetch_json_with_retry(self.fetcher.as_ref(), &self.retry_policy, input, &url).await?;
        parse_metadata(input, &info)
    }
}

/// Reads preview metadata. The title is the only required field.
pub(super) fn parse_metadata(input: &str, info: &Value) -> Result<PreviewMetadata, ExtractError> {
    let title = info
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| ExtractError::discovery(input, "metadata has no title"))?
        .to_string();

    let mut subtitles: BTreeMap<String, Vec<SubtitleTrack>> = BTreeMap::new();
    if let Some(captions) = info.get("captions").and_then(Value::as_array) {
        for caption in captions {
            let Some(src) = caption.get("src").and_then(Value::as_str) else {
                continue;
            };
            let lang = caption.get("lang").and_then(Value::as_str).unwrap_or("en");
            let ext = if caption.get("type").and_then(Value::as_str) == Some("text/srt") {
                "srt"
            } else {
                "ttml"
            };
            // One track per language; later captions replace earlier ones.
            subtitles.insert(
                lang.to_string(),
                vec![SubtitleTrack {
                    ext: ext.to_string(),
                    url: src.to_string(),
                }],
            );
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let duration_secs = info
        .get("duration")
        .and_then(value_as_u64)
        .map(|millis| (millis / 1000) as f64);

    Ok(PreviewMetadata {
        title,
        description: info
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        thumbnail: info
            .get("defaultThumbnailUrl")
            .and_then(Value::as_str)
            .map(str::to_string),
        duration_secs,
        subtitles,
    })
}

/// Builds one `direct-url` item per ranked format; ordinal is the rank.
pub(super) fn format_items(
    input: &str,
    formats: &[FormatCandidate],
    references: &ReferenceRegistry,
) -> Result<Vec<MediaItem>, ExtractError> {
    (1u32..)
        .zip(formats)
        .map(|(rank, format)| {
            let seed = serde_json::to_value(DirectUrlSeed {
                url: format.fetch_url(),
            })
            .map_err(|e| ExtractError::discovery(input, e.to_string()))?;
            let reference = references
                .create(DIRECT_URL_KIND, seed)
                .map_err(|e| ExtractError::discovery(input, e.to_string()))?;
            Ok::<_, ExtractError>(MediaItem::new(rank, input, reference))
        })
        .collect()
}

/// Extractor for single streams on the link or player service.
pub struct ManifestStreamExtractor {
    session: ManifestSession,
    player_base_url: String,
    signing_key: Option<SigningKey>,
    references: &'static ReferenceRegistry,
}

impl ManifestStreamExtractor {
    /// Creates an extractor from shared configuration.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &ExtractorConfig) -> Self {
        Self {
            session: ManifestSession::new(
                fetcher,
                config.retry_policy.clone(),
                &config.link_base_url,
            ),
            player_base_url: config.player_base_url.trim_end_matches('/').to_string(),
            signing_key: config.signing_key.clone(),
            references: ReferenceRegistry::global(),
        }
    }

    fn target(&self, input: &str) -> Option<StreamTarget> {
        let input = input.trim();
        if let Some(caps) = SHORT_ID_RE.captures(input) {
            return Some(StreamTarget {
                provider: DEFAULT_PROVIDER.to_string(),
                id: caps["id"].to_string(),
                media: false,
                config: false,
            });
        }

        if !url_has_host(input, self.session.link_base_url())
            && !url_has_host(input, &self.player_base_url)
        {
            return None;
        }
        let caps = STREAM_URL_RE.captures(input)?;
        Some(StreamTarget {
            provider: caps["provider"].to_string(),
            id: caps["id"].to_string(),
            media: caps.name("media").is_some(),
            config: caps.name("config").is_some(),
        })
    }

    /// Chooses the manifest URL, following the player config when present.
    async fn manifest_url(&self, input: &str, target: &StreamTarget) -> Result<String, ExtractError> {
        let link = self.session.link_base_url();
        let path = target.path();

        let url = if target.config {
            let separator = if input.contains('?') { '&' } else { '?' };
            let config_url = format!("{input}{separator}form=json")
                .replace("swf/", "config/")
                .replace("onsite/", "onsite/config/");
            let config = fetch_json_with_retry(
                self.session.fetcher(),
                self.session.retry_policy(),
                input,
                &config_url,
            )
            .await?;
            let release_url = config
                .get("releaseUrl")
                .and_then(Value::as_str)
                .map_or_else(|| format!("{link}/s/{path}?mbr=true"), str::to_string);
            debug!(%release_url, "followed player config");
            format!("{release_url}{RELEASE_SUFFIX}")
        } else {
            format!("{link}/s/{path}/meta.smil?format=smil&mbr=true")
        };

        match &self.signing_key {
            Some(key) => UrlSigner::new(format!("{link}/s/"))
                .sign(&url, key, DEFAULT_LIFETIME_SECS, false)
                .map_err(|e| ExtractError::discovery(input, e.to_string())),
            None => Ok(url),
        }
    }
}

impl std::fmt::Debug for ManifestStreamExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestStreamExtractor")
            .field("link_base_url", &self.session.link_base_url())
            .field("player_base_url", &self.player_base_url)
            .field("signed", &self.signing_key.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Extractor for ManifestStreamExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::ManifestStream
    }

    fn can_handle(&self, input: &str) -> bool {
        self.target(input).is_some()
    }

    #[tracing::instrument(skip(self), fields(extractor = "manifest-stream"))]
    async fn extract(&self, input: &str) -> Result<Extraction, ExtractError> {
        let target = self
            .target(input)
            .ok_or_else(|| ExtractError::discovery(input, "not a stream URL"))?;

        let manifest_url = self.manifest_url(input, &target).await?;
        let formats = self.session.formats(input, &manifest_url).await?;
        let metadata = self.session.metadata(input, &target.path()).await?;
        let items = format_items(input, &formats, self.references)?;

        let record = SourceRecordBuilder::new(
            parse_host_or_fallback(self.session.link_base_url()),
            target.id.clone(),
        )
        .media_group_id(target.path())
        .title(metadata.title)
        .per_page_format(formats.iter().map(|f| f.container.clone()).collect())
        .stream(StreamDetails {
            description: metadata.description,
            thumbnail: metadata.thumbnail,
            duration_secs: metadata.duration_secs,
            subtitles: metadata.subtitles,
            formats,
            ..StreamDetails::default()
        })
        .build();

        info!(
            id = record.id(),
            formats = record.page_count(),
            title = record.title(),
            "stream extracted"
        );
        Ok(Extraction { record, items })
    }
}
