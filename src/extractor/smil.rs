//! Manifest format selection for SMIL-style format-description documents.
//!
//! [`parse_smil`] turns the manifest text into a flat list of nodes;
//! [`select_formats`] filters and ranks them. Restricted entries abort the
//! whole selection rather than being dropped.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::ExtractError;
use super::utils::compile_static_regex;
use crate::media::MediaFormat;

/// Query appended to HDS manifests so the origin serves them.
const F4M_PARAMS: &str = "hdcore=3.0.3&g=UXWGVKRWHFSP";

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<\s*(meta|ref|video|audio)\b([^>]*?)/?\s*>"));
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
});

/// Why a manifest entry is withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RestrictionKind {
    /// Not available in the requester's region.
    Geographic,
    /// Availability window has passed.
    Expired,
}

impl RestrictionKind {
    fn from_title(title: &str) -> Option<Self> {
        match title {
            "Geographic Restriction" => Some(Self::Geographic),
            "Expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// One element of a parsed manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmilNode {
    /// Lower-cased tag name.
    pub tag: String,
    /// Attributes with entities decoded.
    pub attributes: BTreeMap<String, String>,
}

impl SmilNode {
    /// Returns an attribute value.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// A parsed manifest: optional `<meta base>` and the format reference nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmilDocument {
    /// Base URL declared by the manifest head.
    pub base: Option<String>,
    /// `ref`, `video` and `audio` nodes in document order.
    pub nodes: Vec<SmilNode>,
}

/// One candidate encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatCandidate {
    /// Fetch URL (the streamer for RTMP).
    pub url: String,
    /// RTMP play path, when the base is an RTMP streamer.
    pub play_path: Option<String>,
    /// Container derived from the URL extension.
    pub container: MediaFormat,
    /// Bitrate in bits per second.
    pub bitrate: Option<u64>,
    /// Frame width in pixels.
    pub width: Option<u32>,
    /// Frame height in pixels.
    pub height: Option<u32>,
    /// Whether the source withholds this entry.
    pub restricted: bool,
    /// The source's restriction message.
    pub restriction_reason: Option<String>,
}

impl FormatCandidate {
    /// URL a consumer should fetch: the plain URL, or `streamer/play_path` for RTMP.
    #[must_use]
    pub fn fetch_url(&self) -> String {
        match &self.play_path {
            Some(play_path) => format!("{}/{play_path}", self.url.trim_end_matches('/')),
            None => self.url.clone(),
        }
    }
}

/// Parses manifest text into a [`SmilDocument`].
///
/// Unknown elements are skipped; only `meta`, `ref`, `video` and `audio`
/// carry information the selector needs.
#[must_use]
pub fn parse_smil(text: &str) -> SmilDocument {
    let mut document = SmilDocument::default();
    for caps in TAG_RE.captures_iter(text) {
        let tag = caps[1].to_ascii_lowercase();
        let attributes = parse_attributes(caps.get(2).map_or("", |m| m.as_str()));
        if tag == "meta" {
            if document.base.is_none()
                && let Some(base) = attributes.get("base")
            {
                document.base = Some(base.clone());
            }
            continue;
        }
        document.nodes.push(SmilNode { tag, attributes });
    }
    document
}

fn parse_attributes(raw: &str) -> BTreeMap<String, String> {
    ATTR_RE
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            (caps[1].to_string(), decode_entities(value))
        })
        .collect()
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Enumerates every format reference node, restricted ones included.
#[must_use]
pub fn candidates(document: &SmilDocument, manifest_url: &str) -> Vec<FormatCandidate> {
    document
        .nodes
        .iter()
        .filter_map(|node| candidate_from_node(node, document.base.as_deref(), manifest_url))
        .collect()
}

fn candidate_from_node(
    node: &SmilNode,
    base: Option<&str>,
    manifest_url: &str,
) -> Option<FormatCandidate> {
    let restriction = node.attr("title").and_then(RestrictionKind::from_title);
    let src = node.attr("src").map(str::trim).filter(|s| !s.is_empty());

    // A restricted node is kept even when its src cannot be located.
    let located = src.and_then(|src| locate(src, base, manifest_url));
    let (url, play_path, container) = match (located, restriction) {
        (Some(located), _) => located,
        (None, Some(_)) => (String::new(), None, MediaFormat::Other(String::new())),
        (None, None) => return None,
    };

    Some(FormatCandidate {
        url,
        play_path,
        container,
        bitrate: ["system-bitrate", "systemBitrate", "bitrate"]
            .iter()
            .find_map(|name| node.attr(name).and_then(|v| v.trim().parse().ok())),
        width: node.attr("width").and_then(|v| v.trim().parse().ok()),
        height: node.attr("height").and_then(|v| v.trim().parse().ok()),
        restricted: restriction.is_some(),
        restriction_reason: restriction.map(|_| {
            node.attr("abstract")
                .or_else(|| node.attr("title"))
                .unwrap_or_default()
                .to_string()
        }),
    })
}

/// Resolves a node `src` to `(url, play_path, container)`.
fn locate(
    src: &str,
    base: Option<&str>,
    manifest_url: &str,
) -> Option<(String, Option<String>, MediaFormat)> {
    if let Some(base) = base
        && base.starts_with("rtmp")
        && !src.contains("://")
    {
        return Some((base.to_string(), Some(format!("mp4:{src}")), MediaFormat::Flv));
    }

    let absolute = if src.contains("://") {
        src.to_string()
    } else {
        let anchor = base.filter(|b| b.starts_with("http")).unwrap_or(manifest_url);
        Url::parse(anchor).ok()?.join(src).ok()?.to_string()
    };

    let container = container_of(&absolute);
    let url = if container == MediaFormat::F4m {
        append_query(&absolute, F4M_PARAMS)
    } else {
        absolute
    };
    Some((url, None, container))
}

/// Determines the container from the URL's trailing path extension.
#[must_use]
pub fn container_of(url: &str) -> MediaFormat {
    let path = Url::parse(url).map_or_else(
        |_| url.split(['?', '#']).next().unwrap_or(url).to_string(),
        |parsed| parsed.path().to_string(),
    );
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => MediaFormat::from_extension(ext),
        _ => MediaFormat::Other(String::new()),
    }
}

fn append_query(url: &str, query: &str) -> String {
    if url.contains('?') {
        format!("{url}&{query}")
    } else {
        format!("{url}?{query}")
    }
}

/// Lower ranks are preferred.
fn container_rank(format: &MediaFormat) -> u8 {
    match format {
        MediaFormat::Mp4 => 0,
        MediaFormat::Webm => 1,
        MediaFormat::M3u8 => 2,
        MediaFormat::F4m => 3,
        MediaFormat::Flv => 4,
        _ => 5,
    }
}

/// Total order used to rank candidates, best first.
///
/// Bitrate descending (unknown last), then height descending, then container
/// preference `mp4 > webm > m3u8 > f4m > flv > other`, then URL and play
/// path ascending.
#[must_use]
pub fn compare_candidates(a: &FormatCandidate, b: &FormatCandidate) -> Ordering {
    b.bitrate
        .cmp(&a.bitrate)
        .then_with(|| b.height.cmp(&a.height))
        .then_with(|| container_rank(&a.container).cmp(&container_rank(&b.container)))
        .then_with(|| a.url.cmp(&b.url))
        .then_with(|| a.play_path.cmp(&b.play_path))
}

/// Sorts candidates with [`compare_candidates`].
pub fn rank_formats(formats: &mut [FormatCandidate]) {
    formats.sort_by(compare_candidates);
}

/// Selects and ranks the usable formats of a manifest.
///
/// # Errors
///
/// Returns [`ExtractError::RestrictedContent`] carrying the source's message
/// when any entry is geographically restricted or expired, and
/// [`ExtractError::Discovery`] when no usable format remains.
pub fn select_formats(
    document: &SmilDocument,
    manifest_url: &str,
) -> Result<Vec<FormatCandidate>, ExtractError> {
    let all = candidates(document, manifest_url);

    if let Some(restricted) = all.iter().find(|c| c.restricted) {
        return Err(ExtractError::restricted(
            manifest_url,
            restricted.restriction_reason.clone().unwrap_or_default(),
        ));
    }

    let mut formats = all;
    if formats.is_empty() {
        return Err(ExtractError::discovery(manifest_url, "manifest lists no formats"));
    }
    rank_formats(&mut formats);
    debug!(count = formats.len(), best = %formats[0].fetch_url(), "selected formats");
    Ok(formats)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"<smil xmlns="http://www.w3.org/2005/SMIL21/Language">
  <head><meta base="http://cdn.example.com/media/"/></head>
  <body><seq><switch>
    <video src="clip_500.mp4" system-bitrate="500000" width="640" height="360"/>
    <video src="clip_1500.mp4" system-bitrate="1500000" width="1280" height="720"/>
    <video src="clip_1500.webm" system-bitrate="1500000" width="1280" height="720"/>
    <ref src="http://hds.example.com/z/clip.f4m" title="hds"/>
    <video src="legacy.once?a=1&amp;b=2" system-bitrate="800000"/>
  </switch></seq></body>
</smil>"#;

    #[test]
    fn test_parse_smil_reads_base_and_nodes() {
        let doc = parse_smil(MANIFEST);
        assert_eq!(doc.base.as_deref(), Some("http://cdn.example.com/media/"));
        assert_eq!(doc.nodes.len(), 5);
        assert_eq!(doc.nodes[4].attr("src"), Some("legacy.once?a=1&b=2"));
    }

    #[test]
    fn test_select_formats_ranking_is_deterministic() {
        let formats = select_formats(&parse_smil(MANIFEST), "http://link.example.com/s/p/id").unwrap();
        let urls: Vec<String> = formats.iter().map(FormatCandidate::fetch_url).collect();
        assert_eq!(
            urls,
            vec![
                "http://cdn.example.com/media/clip_1500.mp4",
                "http://cdn.example.com/media/clip_1500.webm",
                "http://cdn.example.com/media/legacy.once?a=1&b=2",
                "http://cdn.example.com/media/clip_500.mp4",
                "http://hds.example.com/z/clip.f4m?hdcore=3.0.3&g=UXWGVKRWHFSP",
            ]
        );
        assert_eq!(formats[2].container, MediaFormat::Mp4, "once maps to mp4");
        assert_eq!(formats[4].container, MediaFormat::F4m);
    }

    #[test]
    fn test_select_formats_independent_of_input_order() {
        let mut doc = parse_smil(MANIFEST);
        let forward = select_formats(&doc, "http://x/").unwrap();
        doc.nodes.reverse();
        let backward = select_formats(&doc, "http://x/").unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_expired_entry_fails_whole_selection() {
        let text = r#"<smil><body>
            <video src="http://cdn.example.com/ok.mp4" system-bitrate="1000"/>
            <ref src="http://cdn.example.com/expired.mp4" title="Expired" abstract="This video has expired." />
        </body></smil>"#;
        let err = select_formats(&parse_smil(text), "http://x/").unwrap_err();
        match err {
            ExtractError::RestrictedContent { message, .. } => {
                assert_eq!(message, "This video has expired.");
            }
            other => panic!("expected RestrictedContent, got {other:?}"),
        }
    }

    #[test]
    fn test_geographic_restriction_without_src_still_fails() {
        let text = r#"<smil><ref title="Geographic Restriction" abstract="Not available in your region"/></smil>"#;
        let all = candidates(&parse_smil(text), "http://x/");
        assert_eq!(all.len(), 1);
        assert!(all[0].restricted);
        assert!(matches!(
            select_formats(&parse_smil(text), "http://x/"),
            Err(ExtractError::RestrictedContent { .. })
        ));
    }

    #[test]
    fn test_expired_entry_with_unresolvable_src_still_fails() {
        let text = r#"<smil><head><meta base="http://[bad"/></head><body>
            <ref src="gone.mp4" title="Expired" abstract="This video has expired."/>
            <video src="http://cdn.example.com/ok.mp4" system-bitrate="1000"/>
        </body></smil>"#;
        match select_formats(&parse_smil(text), "http://x/") {
            Err(ExtractError::RestrictedContent { message, .. }) => {
                assert_eq!(message, "This video has expired.");
            }
            other => panic!("expected restricted content, got {other:?}"),
        }
    }

    #[test]
    fn test_unresolvable_src_on_plain_entry_is_skipped() {
        let text = r#"<smil><head><meta base="http://[bad"/></head><body>
            <video src="gone.mp4" system-bitrate="500"/>
            <video src="http://cdn.example.com/ok.mp4" system-bitrate="1000"/>
        </body></smil>"#;
        let formats = select_formats(&parse_smil(text), "http://x/").unwrap();
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].url, "http://cdn.example.com/ok.mp4");
    }

    #[test]
    fn test_rtmp_base_produces_play_path() {
        let text = r#"<smil><head><meta base="rtmp://stream.example.com/ondemand"/></head>
            <body><video src="videos/a_700.mp4" system-bitrate="700000"/></body></smil>"#;
        let formats = select_formats(&parse_smil(text), "http://x/").unwrap();
        assert_eq!(formats[0].container, MediaFormat::Flv);
        assert_eq!(formats[0].play_path.as_deref(), Some("mp4:videos/a_700.mp4"));
        assert_eq!(
            formats[0].fetch_url(),
            "rtmp://stream.example.com/ondemand/mp4:videos/a_700.mp4"
        );
    }

    #[test]
    fn test_empty_manifest_is_discovery_error() {
        assert!(matches!(
            select_formats(&parse_smil("<smil></smil>"), "http://x/"),
            Err(ExtractError::Discovery { .. })
        ));
    }

    #[test]
    fn test_container_of_ignores_query() {
        assert_eq!(container_of("http://a/b/c.m3u8?x=y.mp4"), MediaFormat::M3u8);
        assert_eq!(container_of("http://a/b/noext"), MediaFormat::Other(String::new()));
    }
}
