//! Bounded-concurrency resolution of many lazy references.
//!
//! The [`ResolutionPool`] resolves every item's reference under a
//! semaphore-limited number of concurrent tasks, each wrapped in the pool's
//! [`RetryPolicy`]. Results come back in ordinal order regardless of
//! completion order, and one item's failure never cancels its siblings.
//!
//! # Example
//!
//! ```no_run
//! use media_resolver::fetch::RetryPolicy;
//! use media_resolver::media::MediaItem;
//! use media_resolver::pool::ResolutionPool;
//!
//! # async fn example(items: Vec<MediaItem>) -> Result<(), Box<dyn std::error::Error>> {
//! let pool = ResolutionPool::new(16, RetryPolicy::default())?;
//! let report = pool.resolve_all(&items).await?;
//! println!("resolved {}, failed {}", report.stats.resolved(), report.stats.failed());
//! let urls = report.into_urls()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::fetch::{RetryPolicy, with_retry};
use crate::media::MediaItem;
use crate::reference::ResolveError;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Error type for pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,

    /// Some items did not resolve.
    #[error("{failed} of {total} item(s) failed to resolve\n  Suggestion: Re-run to retry the failed items")]
    Incomplete {
        /// Number of failed items.
        failed: usize,
        /// Number of items submitted.
        total: usize,
    },
}

/// Counters from one `resolve_all()` run.
#[derive(Debug, Default)]
pub struct ResolutionStats {
    resolved: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
}

impl ResolutionStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of resolved items.
    #[must_use]
    pub fn resolved(&self) -> usize {
        self.resolved.load(Ordering::SeqCst)
    }

    /// Returns the number of failed items.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of retry attempts made across all items.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    fn increment_resolved(&self) {
        self.resolved.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> Self {
        Self {
            resolved: AtomicUsize::new(self.resolved()),
            failed: AtomicUsize::new(self.failed()),
            retried: AtomicUsize::new(self.retried()),
        }
    }
}

/// Result of resolving one item.
#[derive(Debug)]
pub struct ItemOutcome {
    /// Ordinal of the item.
    pub ordinal: u32,
    /// Referring page of the item.
    pub referring_page: String,
    /// Resolved URL or the last error.
    pub result: Result<String, ResolveError>,
}

/// Outcomes of a `resolve_all()` run, sorted by ordinal.
#[derive(Debug)]
pub struct ResolutionReport {
    /// One outcome per submitted item.
    pub outcomes: Vec<ItemOutcome>,
    /// Aggregate counters.
    pub stats: ResolutionStats,
}

impl ResolutionReport {
    /// Returns true when every item resolved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Returns the URLs in ordinal order.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Incomplete`] when any item failed.
    pub fn into_urls(self) -> Result<Vec<String>, PoolError> {
        let total = self.outcomes.len();
        let failed = self.outcomes.iter().filter(|o| o.result.is_err()).count();
        if failed > 0 {
            return Err(PoolError::Incomplete { failed, total });
        }
        Ok(self
            .outcomes
            .into_iter()
            .filter_map(|o| o.result.ok())
            .collect())
    }
}

/// Resolves many items concurrently under a fixed cap.
///
/// # Concurrency Model
///
/// - Each item resolves in its own Tokio task
/// - A semaphore permit is acquired before spawning each task
/// - Permits are released when tasks complete (RAII)
#[derive(Debug)]
pub struct ResolutionPool {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    retry_policy: RetryPolicy,
}

impl ResolutionPool {
    /// Creates a pool with the given concurrency cap (1-100).
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConcurrency`] if the value is outside the valid range.
    #[instrument(level = "debug", skip(retry_policy))]
    pub fn new(concurrency: usize, retry_policy: RetryPolicy) -> Result<Self, PoolError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(PoolError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_attempts = retry_policy.max_attempts(),
            "creating resolution pool"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy,
        })
    }

    /// Returns the configured concurrency cap.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Resolves every item's reference.
    ///
    /// Individual failures do not make this method fail; they are recorded in
    /// the report.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SemaphoreClosed`] if the semaphore is closed.
    #[instrument(skip(self, items), fields(items = items.len(), concurrency = self.concurrency))]
    pub async fn resolve_all(&self, items: &[MediaItem]) -> Result<ResolutionReport, PoolError> {
        let stats = Arc::new(ResolutionStats::new());
        let mut handles = Vec::with_capacity(items.len());

        info!("starting resolution");

        for item in items {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| PoolError::SemaphoreClosed)?;

            let item = item.clone();
            let stats = Arc::clone(&stats);
            let retry_policy = self.retry_policy.clone();

            let ordinal = item.ordinal();
            let referring_page = item.referring_page().to_string();
            let kind = item.reference().kind().to_string();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = resolve_with_retry(&item, &retry_policy, &stats).await;
                match &result {
                    Ok(url) => {
                        debug!(ordinal = item.ordinal(), %url, "item resolved");
                        stats.increment_resolved();
                    }
                    Err(e) => {
                        warn!(ordinal = item.ordinal(), error = %e, "item failed to resolve");
                        stats.increment_failed();
                    }
                }
                result
            });
            handles.push((ordinal, referring_page, kind, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (ordinal, referring_page, kind, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(ordinal, error = %e, "resolution task panicked");
                    stats.increment_failed();
                    Err(ResolveError::failed(&kind, format!("resolution task failed: {e}")))
                }
            };
            outcomes.push(ItemOutcome {
                ordinal,
                referring_page,
                result,
            });
        }
        outcomes.sort_by_key(|o| o.ordinal);

        info!(
            resolved = stats.resolved(),
            failed = stats.failed(),
            retried = stats.retried(),
            "resolution complete"
        );

        let stats = Arc::try_unwrap(stats).unwrap_or_else(|shared| shared.snapshot());
        Ok(ResolutionReport { outcomes, stats })
    }
}

async fn resolve_with_retry(
    item: &MediaItem,
    policy: &RetryPolicy,
    stats: &ResolutionStats,
) -> Result<String, ResolveError> {
    let mut attempts = 0u32;
    with_retry(policy, || {
        attempts += 1;
        if attempts > 1 {
            stats.increment_retried();
        }
        let reference = item.reference().clone();
        async move { reference.resolve().await }
    })
    .await
}
