//! Media items, their container formats and their persisted form.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::reference::{LazyReference, ReferenceRegistry, ResolveError, SerializedSeed};

/// Container format of one media item.
///
/// Serialized as its file extension (`"jpg"`, `"mp4"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaFormat {
    /// JPEG image.
    Jpg,
    /// PNG image.
    Png,
    /// GIF image.
    Gif,
    /// MPEG-4 video.
    Mp4,
    /// Flash video (RTMP streams).
    Flv,
    /// WebM video.
    Webm,
    /// HLS playlist.
    M3u8,
    /// Adobe HDS manifest.
    F4m,
    /// Any other extension, lower-cased.
    Other(String),
}

impl MediaFormat {
    /// Maps a gallery page code through the closed lookup `j/p/g`.
    ///
    /// Returns `None` for anything else; callers must treat that as fatal.
    #[must_use]
    pub fn from_page_code(code: &str) -> Option<Self> {
        match code {
            "j" => Some(Self::Jpg),
            "p" => Some(Self::Png),
            "g" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Maps a file extension to a format. `once` is the legacy name for MP4.
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpg,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "mp4" | "m4v" | "once" => Self::Mp4,
            "flv" => Self::Flv,
            "webm" => Self::Webm,
            "m3u8" => Self::M3u8,
            "f4m" => Self::F4m,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the file extension for this format.
    #[must_use]
    pub fn extension(&self) -> &str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Mp4 => "mp4",
            Self::Flv => "flv",
            Self::Webm => "webm",
            Self::M3u8 => "m3u8",
            Self::F4m => "f4m",
            Self::Other(ext) => ext,
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl From<String> for MediaFormat {
    fn from(value: String) -> Self {
        Self::from_extension(&value)
    }
}

impl From<MediaFormat> for String {
    fn from(value: MediaFormat) -> Self {
        value.extension().to_string()
    }
}

/// One page or encoding of a source, with its URL resolved lazily.
#[derive(Debug, Clone)]
pub struct MediaItem {
    ordinal: u32,
    referring_page: String,
    reference: LazyReference,
}

impl MediaItem {
    /// Creates an item. `ordinal` is 1-based.
    #[must_use]
    pub fn new(ordinal: u32, referring_page: impl Into<String>, reference: LazyReference) -> Self {
        Self {
            ordinal,
            referring_page: referring_page.into(),
            reference,
        }
    }

    /// 1-based position within the source.
    #[must_use]
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    /// Human-navigable page backing this item.
    #[must_use]
    pub fn referring_page(&self) -> &str {
        &self.referring_page
    }

    /// Lazy handle to the final fetch URL.
    #[must_use]
    pub fn reference(&self) -> &LazyReference {
        &self.reference
    }

    /// Produces the persisted form of this item.
    #[must_use]
    pub fn dump(&self) -> PersistedItem {
        PersistedItem {
            ordinal: self.ordinal,
            referring_page: self.referring_page.clone(),
            reference: self.reference.dump(),
        }
    }

    /// Rebuilds an item from its persisted form.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the reference kind is unknown or its seed is invalid.
    pub fn load(persisted: &PersistedItem, registry: &ReferenceRegistry) -> Result<Self, ResolveError> {
        Ok(Self {
            ordinal: persisted.ordinal,
            referring_page: persisted.referring_page.clone(),
            reference: persisted.reference.load(registry)?,
        })
    }
}

/// Serializable record of a [`MediaItem`] (one JSON object per item).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedItem {
    /// 1-based position within the source.
    pub ordinal: u32,
    /// Human-navigable page backing this item.
    pub referring_page: String,
    /// Dumped reference.
    pub reference: SerializedSeed,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::reference::DIRECT_URL_KIND;

    #[test]
    fn test_page_code_lookup_is_closed() {
        assert_eq!(MediaFormat::from_page_code("j"), Some(MediaFormat::Jpg));
        assert_eq!(MediaFormat::from_page_code("p"), Some(MediaFormat::Png));
        assert_eq!(MediaFormat::from_page_code("g"), Some(MediaFormat::Gif));
        assert_eq!(MediaFormat::from_page_code("w"), None);
        assert_eq!(MediaFormat::from_page_code("J"), None);
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(MediaFormat::from_extension("once"), MediaFormat::Mp4);
        assert_eq!(MediaFormat::from_extension("MP4"), MediaFormat::Mp4);
        assert_eq!(
            MediaFormat::from_extension("ismv"),
            MediaFormat::Other("ismv".to_string())
        );
        assert_eq!(MediaFormat::Other("ismv".to_string()).to_string(), "ismv");
    }

    #[test]
    fn test_media_format_serde_as_extension() {
        assert_eq!(serde_json::to_value(MediaFormat::Webm).unwrap(), json!("webm"));
        let parsed: MediaFormat = serde_json::from_value(json!("gif")).unwrap();
        assert_eq!(parsed, MediaFormat::Gif);
    }

    #[tokio::test]
    async fn test_item_dump_load_round_trip() {
        let registry = ReferenceRegistry::builtin();
        let reference = registry
            .create(DIRECT_URL_KIND, json!({"url": "https://cdn.example.com/1.mp4"}))
            .unwrap();
        let item = MediaItem::new(1, "https://example.com/watch/1", reference);

        let line = serde_json::to_string(&item.dump()).unwrap();
        let persisted: PersistedItem = serde_json::from_str(&line).unwrap();
        let restored = MediaItem::load(&persisted, &registry).unwrap();

        assert_eq!(restored.ordinal(), 1);
        assert_eq!(restored.referring_page(), "https://example.com/watch/1");
        assert_eq!(
            restored.reference().resolve().await.unwrap(),
            item.reference().resolve().await.unwrap()
        );
    }
}
