//! Immutable metadata snapshot produced by one successful extraction.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::media::MediaFormat;

use super::smil::FormatCandidate;

/// Sentinel for metadata the source did not provide.
pub const NOT_AVAILABLE: &str = "N/A";

/// Metadata for one piece of content.
///
/// Built once by an extractor and never mutated; fields are read through
/// accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRecord {
    source_host: String,
    id: String,
    media_group_id: String,
    title: String,
    page_count: u32,
    artists: BTreeSet<String>,
    groups: BTreeSet<String>,
    series: BTreeSet<String>,
    language: String,
    category: String,
    per_page_format: Vec<MediaFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<StreamDetails>,
}

/// Extra metadata carried by manifest-based sources.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct StreamDetails {
    /// Long-form description (empty when absent).
    pub description: String,
    /// Default thumbnail URL.
    pub thumbnail: Option<String>,
    /// Additional thumbnails (feeds).
    pub thumbnails: Vec<Thumbnail>,
    /// Duration in seconds.
    pub duration_secs: Option<f64>,
    /// Subtitle tracks keyed by language.
    pub subtitles: BTreeMap<String, Vec<SubtitleTrack>>,
    /// Ranked format candidates, best first.
    pub formats: Vec<FormatCandidate>,
    /// Publication time, seconds since the Unix epoch.
    pub timestamp: Option<i64>,
    /// Source-assigned categories.
    pub categories: Vec<String>,
}

/// One subtitle file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtitleTrack {
    /// File extension (`srt` or `ttml`).
    pub ext: String,
    /// Download URL.
    pub url: String,
}

/// One thumbnail image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thumbnail {
    /// Image URL.
    pub url: String,
    /// Width in pixels.
    pub width: Option<u32>,
    /// Height in pixels.
    pub height: Option<u32>,
}

/// Builder used by extractors; the only way to assemble a [`SourceRecord`].
#[derive(Debug, Default)]
pub struct SourceRecordBuilder {
    source_host: String,
    id: String,
    media_group_id: Option<String>,
    title: Option<String>,
    artists: BTreeSet<String>,
    groups: BTreeSet<String>,
    series: BTreeSet<String>,
    language: Option<String>,
    category: Option<String>,
    per_page_format: Vec<MediaFormat>,
    stream: Option<StreamDetails>,
}

impl SourceRecordBuilder {
    /// Starts a record for `id` served from `source_host`.
    #[must_use]
    pub fn new(source_host: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            source_host: source_host.into(),
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the media group id.
    #[must_use]
    pub fn media_group_id(mut self, value: impl Into<String>) -> Self {
        self.media_group_id = Some(value.into());
        self
    }

    /// Sets the title; blank titles fall back to the sentinel.
    #[must_use]
    pub fn title(mut self, value: impl Into<String>) -> Self {
        self.title = non_blank(value.into());
        self
    }

    /// Adds an artist.
    #[must_use]
    pub fn artist(mut self, value: impl Into<String>) -> Self {
        self.artists.insert(value.into());
        self
    }

    /// Adds a group.
    #[must_use]
    pub fn group(mut self, value: impl Into<String>) -> Self {
        self.groups.insert(value.into());
        self
    }

    /// Adds a series.
    #[must_use]
    pub fn series(mut self, value: impl Into<String>) -> Self {
        self.series.insert(value.into());
        self
    }

    /// Sets the language (last value wins).
    #[must_use]
    pub fn language(mut self, value: impl Into<String>) -> Self {
        self.language = non_blank(value.into());
        self
    }

    /// Sets the category (last value wins).
    #[must_use]
    pub fn category(mut self, value: impl Into<String>) -> Self {
        self.category = non_blank(value.into());
        self
    }

    /// Sets the per-page formats; also fixes the page count.
    #[must_use]
    pub fn per_page_format(mut self, formats: Vec<MediaFormat>) -> Self {
        self.per_page_format = formats;
        self
    }

    /// Attaches stream details.
    #[must_use]
    pub fn stream(mut self, details: StreamDetails) -> Self {
        self.stream = Some(details);
        self
    }

    /// Finishes the record, filling absent fields with [`NOT_AVAILABLE`].
    #[must_use]
    pub fn build(self) -> SourceRecord {
        let na = || NOT_AVAILABLE.to_string();
        SourceRecord {
            source_host: self.source_host,
            id: self.id,
            media_group_id: self.media_group_id.unwrap_or_else(na),
            title: self.title.unwrap_or_else(na),
            page_count: u32::try_from(self.per_page_format.len()).unwrap_or(u32::MAX),
            artists: self.artists,
            groups: self.groups,
            series: self.series,
            language: self.language.unwrap_or_else(na),
            category: self.category.unwrap_or_else(na),
            per_page_format: self.per_page_format,
            stream: self.stream,
        }
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl SourceRecord {
    /// Host the media is served from.
    #[must_use]
    pub fn source_host(&self) -> &str {
        &self.source_host
    }

    /// Source-level identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identifier of the media group the items live under.
    #[must_use]
    pub fn media_group_id(&self) -> &str {
        &self.media_group_id
    }

    /// Title, or [`NOT_AVAILABLE`].
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Number of items (pages or encodings).
    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Artists, sorted.
    #[must_use]
    pub fn artists(&self) -> &BTreeSet<String> {
        &self.artists
    }

    /// Groups, sorted.
    #[must_use]
    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    /// Series, sorted.
    #[must_use]
    pub fn series(&self) -> &BTreeSet<String> {
        &self.series
    }

    /// Language, or [`NOT_AVAILABLE`].
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Category, or [`NOT_AVAILABLE`].
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Format of each item, indexed by `ordinal - 1`.
    #[must_use]
    pub fn per_page_format(&self) -> &[MediaFormat] {
        &self.per_page_format
    }

    /// Stream details for manifest-based sources.
    #[must_use]
    pub fn stream(&self) -> Option<&StreamDetails> {
        self.stream.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_fills_sentinels() {
        let record = SourceRecordBuilder::new("https://i.example.net", "1").build();
        assert_eq!(record.title(), NOT_AVAILABLE);
        assert_eq!(record.language(), NOT_AVAILABLE);
        assert_eq!(record.category(), NOT_AVAILABLE);
        assert_eq!(record.media_group_id(), NOT_AVAILABLE);
        assert_eq!(record.page_count(), 0);
        assert!(record.stream().is_none());
    }

    #[test]
    fn test_page_count_follows_formats_and_sets_dedupe() {
        let record = SourceRecordBuilder::new("h", "7")
            .title("  A Title ")
            .artist("b")
            .artist("a")
            .artist("b")
            .language("")
            .per_page_format(vec![MediaFormat::Jpg, MediaFormat::Png])
            .build();
        assert_eq!(record.title(), "A Title");
        assert_eq!(record.page_count(), 2);
        assert_eq!(
            record.artists().iter().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(record.language(), NOT_AVAILABLE);
    }
}
