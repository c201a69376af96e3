//! Integration tests for bounded-concurrency resolution.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use media_resolver::fetch::{Fetcher, HttpFetcher};
use media_resolver::reference::{DERIVED_URL_KIND, ReferenceStrategy, SerializedSeed};
use media_resolver::{
    MediaItem, ReferenceRegistry, ResolutionPool, ResolveError, RetryPolicy,
};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

/// Strategy that records how many resolutions run at once.
#[derive(Default)]
struct InFlightCounter {
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl ReferenceStrategy for InFlightCounter {
    fn kind(&self) -> &str {
        "counted"
    }

    fn validate(&self, seed: &Value) -> Result<(), ResolveError> {
        if seed.get("n").and_then(Value::as_u64).is_some() {
            Ok(())
        } else {
            Err(ResolveError::invalid_seed("counted", "missing n"))
        }
    }

    async fn resolve(&self, seed: &Value) -> Result<String, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let n = seed["n"].as_u64().unwrap_or_default();
        // Staggered delays so completion order differs from submission order.
        tokio::time::sleep(Duration::from_millis((n * 7) % 13 + 1)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        if n % 10 == 0 {
            return Err(ResolveError::invalid_seed("counted", format!("item {n} is poisoned")));
        }
        Ok(format!("https://cdn.example.com/{n}.jpg"))
    }
}

fn counted_items(registry: &ReferenceRegistry, count: u64) -> Vec<MediaItem> {
    (1..=count)
        .rev()
        .map(|n| {
            let reference = registry.create("counted", json!({"n": n})).unwrap();
            MediaItem::new(
                u32::try_from(n).unwrap(),
                format!("https://site.example.com/{n}/"),
                reference,
            )
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_respects_concurrency_cap() {
    let counter = Arc::new(InFlightCounter::default());
    let mut registry = ReferenceRegistry::new();
    registry.register(counter.clone()).unwrap();

    let items = counted_items(&registry, 50);
    let pool = ResolutionPool::new(5, RetryPolicy::immediate(1)).unwrap();
    let report = pool.resolve_all(&items).await.unwrap();

    let peak = counter.peak.load(Ordering::SeqCst);
    assert!(peak <= 5, "peak in-flight {peak} exceeded cap");
    assert!(peak > 1, "items never resolved in parallel");
    assert_eq!(counter.calls.load(Ordering::SeqCst), 50);

    let ordinals: Vec<u32> = report.outcomes.iter().map(|o| o.ordinal).collect();
    assert_eq!(ordinals, (1..=50).collect::<Vec<_>>());

    // Items 10, 20, 30, 40 and 50 fail; their siblings still resolve.
    assert_eq!(report.stats.failed(), 5);
    assert_eq!(report.stats.resolved(), 45);
    assert_eq!(
        report.outcomes[0].result.as_deref().unwrap(),
        "https://cdn.example.com/1.jpg"
    );
    assert!(report.outcomes[9].result.is_err());
}

#[tokio::test]
async fn test_pool_never_re_resolves_memoized_items() {
    let counter = Arc::new(InFlightCounter::default());
    let mut registry = ReferenceRegistry::new();
    registry.register(counter.clone()).unwrap();

    let items = counted_items(&registry, 3);
    let pool = ResolutionPool::new(2, RetryPolicy::immediate(1)).unwrap();
    pool.resolve_all(&items).await.unwrap();
    pool.resolve_all(&items).await.unwrap();

    assert_eq!(counter.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_resolved_value_survives_dump_and_load() {
    let counter = Arc::new(InFlightCounter::default());
    let mut registry = ReferenceRegistry::new();
    registry.register(counter.clone()).unwrap();

    let item = counted_items(&registry, 1).remove(0);
    let url = item.reference().resolve().await.unwrap();

    let line = serde_json::to_string(&item.dump()).unwrap();
    let restored = MediaItem::load(&serde_json::from_str(&line).unwrap(), &registry).unwrap();
    assert!(restored.reference().is_resolved());
    assert_eq!(restored.reference().resolve().await.unwrap(), url);
    assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_kind_fails_on_load() {
    let seed = SerializedSeed {
        kind: "no-such-kind".to_string(),
        seed: json!({}),
        resolved: None,
    };
    let err = seed.load(ReferenceRegistry::global()).unwrap_err();
    assert!(matches!(err, ResolveError::UnknownKind { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_global_registry_loads_builtin_kinds() {
    let seed = SerializedSeed {
        kind: DERIVED_URL_KIND.to_string(),
        seed: json!({"host": "https://i.example.net", "media_group_id": 7, "page": 2, "format": "png"}),
        resolved: None,
    };
    let reference = seed.load(ReferenceRegistry::global()).unwrap();
    assert_eq!(
        reference.resolve().await.unwrap(),
        "https://i.example.net/galleries/7/2.png"
    );
}

/// Strategy whose final URL is read from a lookup endpoint at resolve time.
struct LookupStrategy {
    fetcher: HttpFetcher,
}

#[async_trait]
impl ReferenceStrategy for LookupStrategy {
    fn kind(&self) -> &str {
        "lookup"
    }

    fn validate(&self, seed: &Value) -> Result<(), ResolveError> {
        if seed.get("lookup").and_then(Value::as_str).is_some() {
            Ok(())
        } else {
            Err(ResolveError::invalid_seed("lookup", "missing lookup url"))
        }
    }

    async fn resolve(&self, seed: &Value) -> Result<String, ResolveError> {
        let lookup = seed["lookup"].as_str().unwrap_or_default();
        let response = self
            .fetcher
            .fetch(lookup, &[])
            .await
            .map_err(|e| ResolveError::fetch("lookup", e))?;
        Ok(response.body.trim().to_string())
    }
}

fn lookup_item(registry: &ReferenceRegistry, ordinal: u32, lookup: String) -> MediaItem {
    let reference = registry.create("lookup", json!({"lookup": lookup})).unwrap();
    MediaItem::new(ordinal, format!("https://site.example.com/{ordinal}/"), reference)
}

#[tokio::test]
async fn test_pool_retries_transient_fetch_failures_by_status() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/lookup/1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/lookup/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("https://cdn.example.com/1.mp4\n"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/lookup/2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut registry = ReferenceRegistry::new();
    registry
        .register(Arc::new(LookupStrategy {
            fetcher: HttpFetcher::new().unwrap(),
        }))
        .unwrap();
    let items = vec![
        lookup_item(&registry, 1, format!("{}/lookup/1", server.uri())),
        lookup_item(&registry, 2, format!("{}/lookup/2", server.uri())),
    ];

    let pool = ResolutionPool::new(2, RetryPolicy::immediate(4)).unwrap();
    let report = pool.resolve_all(&items).await.unwrap();

    assert_eq!(
        report.outcomes[0].result.as_deref().unwrap(),
        "https://cdn.example.com/1.mp4"
    );
    assert!(matches!(
        report.outcomes[1].result,
        Err(ResolveError::Fetch { .. })
    ));
    // Two retries for the 503s; the 404 is permanent and is not retried.
    assert_eq!(report.stats.retried(), 2);
    assert_eq!(report.stats.failed(), 1);
}
