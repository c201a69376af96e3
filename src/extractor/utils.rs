//! Shared helpers for extractor modules: static regexes, host checks and lenient JSON readers.

use regex::Regex;
use serde_json::Value;
use url::Url;

/// Compiles a regex at static init; panics on invalid pattern.
pub fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Normalizes a host string: trim, strip leading "www.", trailing '.', and lowercases.
#[must_use]
pub fn canonical_host(host: &str) -> String {
    host.trim()
        .trim_start_matches("www.")
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

/// Parses `url_or_host` as a URL and returns `host[:port]`, or normalizes it as a bare host string.
#[must_use]
pub fn parse_host_or_fallback(url_or_host: &str) -> String {
    Url::parse(url_or_host)
        .ok()
        .and_then(|url| {
            url.host_str().map(|host| match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            })
        })
        .unwrap_or_else(|| canonical_host(url_or_host))
}

/// Returns true if `url` is an absolute URL whose host matches `expected`
/// (a bare host or a base URL).
#[must_use]
pub fn url_has_host(url: &str, expected: &str) -> bool {
    if Url::parse(url).is_err() {
        return false;
    }
    canonical_host(&parse_host_or_fallback(url)) == canonical_host(&parse_host_or_fallback(expected))
}

/// Reads a JSON number or numeric string as `u64`.
#[must_use]
pub fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a JSON number or numeric string as `f64`.
#[must_use]
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Returns the last non-empty path segment of a URL (query excluded).
#[must_use]
pub fn url_basename(url: &str) -> Option<String> {
    let path = Url::parse(url).ok()?.path().to_string();
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}
