//! Lazy, memoizing, serializable references to media URLs.
//!
//! A [`LazyReference`] pairs a kind tag with a seed payload. The kind selects
//! a registered [`ReferenceStrategy`]; the seed is everything that strategy
//! needs to derive the value without repeating the discovery fetch that
//! produced it.
//!
//! # Architecture
//!
//! - [`LazyReference`] - Cloneable handle; clones share one memo cell
//! - [`SerializedSeed`] - `{kind, seed, resolved}` record crossing the persistence boundary
//! - [`ReferenceStrategy`] - Async trait implemented per kind
//! - [`ReferenceRegistry`] - Append-only map of kind to strategy
//!
//! # Example
//!
//! ```
//! use media_resolver::reference::{DIRECT_URL_KIND, ReferenceRegistry};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ReferenceRegistry::builtin();
//! let reference = registry.create(DIRECT_URL_KIND, json!({"url": "https://cdn.example.com/a.mp4"}))?;
//! let seed = reference.dump();
//! let restored = seed.load(&registry)?;
//! assert_eq!(restored.resolve().await?, reference.resolve().await?);
//! # Ok(())
//! # }
//! ```

mod error;
mod registry;
mod strategies;

pub use error::ResolveError;
pub use registry::ReferenceRegistry;
pub use strategies::{
    DERIVED_URL_KIND, DIRECT_URL_KIND, DerivedUrlSeed, DerivedUrlStrategy, DirectUrlSeed,
    DirectUrlStrategy,
};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

/// A resolution strategy registered under one kind tag.
///
/// Strategies are stateless with respect to any single reference: all
/// per-reference state lives in the seed.
#[async_trait]
pub trait ReferenceStrategy: Send + Sync {
    /// Returns the kind tag this strategy resolves (e.g. `"derived-url"`).
    fn kind(&self) -> &str;

    /// Checks that `seed` has the shape this strategy expects.
    ///
    /// Called when a reference is created or loaded, so malformed seeds fail
    /// at the persistence boundary rather than at resolution time.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidSeed`] when the seed is unusable.
    fn validate(&self, seed: &Value) -> Result<(), ResolveError>;

    /// Derives the final URL from `seed`.
    async fn resolve(&self, seed: &Value) -> Result<String, ResolveError>;
}

/// Serialized form of a [`LazyReference`].
///
/// Pure data: no strategy objects, sessions or closures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedSeed {
    /// Kind tag selecting the strategy on load.
    pub kind: String,
    /// Strategy-specific payload.
    pub seed: Value,
    /// Value the reference had already resolved to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
}

impl SerializedSeed {
    /// Reconstructs a reference by dispatching on `kind` through `registry`.
    ///
    /// A previously resolved value is restored into the memo, so it is never
    /// recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownKind`] when no strategy is registered
    /// for `kind`, or [`ResolveError::InvalidSeed`] when the seed is rejected.
    pub fn load(&self, registry: &ReferenceRegistry) -> Result<LazyReference, ResolveError> {
        let strategy = registry.get(&self.kind)?;
        let reference = LazyReference::new(strategy, self.seed.clone())?;
        if let Some(value) = &self.resolved {
            // Fresh cell; set cannot race here.
            let _ = reference.inner.memo.set(value.clone());
        }
        Ok(reference)
    }
}

/// A named, memoizing handle to a URL whose derivation is deferred.
///
/// Clones share the same memo cell, so resolving any clone resolves them
/// all. Concurrent callers of [`LazyReference::resolve`] are serialized:
/// the strategy runs at most once per successful resolution.
#[derive(Clone)]
pub struct LazyReference {
    inner: Arc<Inner>,
}

struct Inner {
    kind: String,
    seed: Value,
    strategy: Arc<dyn ReferenceStrategy>,
    memo: OnceCell<String>,
}

impl LazyReference {
    /// Creates an unresolved reference after validating `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidSeed`] when the strategy rejects the seed.
    pub fn new(strategy: Arc<dyn ReferenceStrategy>, seed: Value) -> Result<Self, ResolveError> {
        strategy.validate(&seed)?;
        Ok(Self {
            inner: Arc::new(Inner {
                kind: strategy.kind().to_string(),
                seed,
                strategy,
                memo: OnceCell::new(),
            }),
        })
    }

    /// Returns the kind tag.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    /// Returns the seed payload.
    #[must_use]
    pub fn seed(&self) -> &Value {
        &self.inner.seed
    }

    /// Returns the memoized value, if resolution already happened.
    #[must_use]
    pub fn resolved(&self) -> Option<&str> {
        self.inner.memo.get().map(String::as_str)
    }

    /// Returns true once a value has been memoized.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.inner.memo.initialized()
    }

    /// Resolves the reference, running the strategy only on first success.
    ///
    /// A failed resolution leaves the reference unresolved, so the caller
    /// may retry it.
    ///
    /// # Errors
    ///
    /// Returns whatever the strategy returns on failure.
    #[instrument(level = "debug", skip(self), fields(kind = %self.inner.kind))]
    pub async fn resolve(&self) -> Result<String, ResolveError> {
        let inner = &self.inner;
        let value = inner
            .memo
            .get_or_try_init(|| async {
                debug!("running reference strategy");
                inner.strategy.resolve(&inner.seed).await
            })
            .await?;
        Ok(value.clone())
    }

    /// Produces the serializable `{kind, seed, resolved}` record.
    #[must_use]
    pub fn dump(&self) -> SerializedSeed {
        SerializedSeed {
            kind: self.inner.kind.clone(),
            seed: self.inner.seed.clone(),
            resolved: self.inner.memo.get().cloned(),
        }
    }
}

impl std::fmt::Debug for LazyReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyReference")
            .field("kind", &self.inner.kind)
            .field("seed", &self.inner.seed)
            .field("resolved", &self.inner.memo.get())
            .finish()
    }
}
