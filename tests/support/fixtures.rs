use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use media_resolver::fetch::{FetchError, FetchResponse, Fetcher};
use serde_json::json;

pub const MEDIA_HOST: &str = "https://i.example.net";

/// Gallery page embedding the description the way the site does: a JSON
/// string literal passed to `JSON.parse`.
#[must_use]
pub fn gallery_html(id: u64, media_id: u64, codes: &[&str]) -> String {
    let pages: Vec<_> = codes.iter().map(|t| json!({"t": t, "w": 1280, "h": 1810})).collect();
    let gallery = json!({
        "id": id,
        "media_id": media_id.to_string(),
        "title": {"english": "Test Gallery", "japanese": null},
        "images": {"pages": pages},
        "tags": [
            {"type": "artist", "name": "some artist"},
            {"type": "group", "name": "some circle"},
            {"type": "parody", "name": "original"},
            {"type": "language", "name": "translated"},
            {"type": "language", "name": "english"},
            {"type": "category", "name": "doujinshi"},
            {"type": "tag", "name": "ignored"}
        ]
    });
    let literal = serde_json::to_string(&gallery.to_string()).unwrap_or_default();
    format!(
        "<html><head></head><body><script>\n\
         window._gallery = JSON.parse({literal});\n\
         </script><script>window._n_app = {{ media_url: '{MEDIA_HOST}/', }};</script></body></html>"
    )
}

/// Fetcher serving canned bodies by URL and counting every call.
#[derive(Debug, Default)]
pub struct CountingFetcher {
    bodies: Mutex<HashMap<String, String>>,
    calls: AtomicU32,
}

impl CountingFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: impl Into<String>) {
        if let Ok(mut bodies) = self.bodies.lock() {
            bodies.insert(url.to_string(), body.into());
        }
    }

    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self, url: &str, _headers: &[(&str, &str)]) -> Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = self
            .bodies
            .lock()
            .ok()
            .and_then(|bodies| bodies.get(url).cloned());
        body.map(FetchResponse::ok)
            .ok_or_else(|| FetchError::http_status(url, 404))
    }
}
