//! Append-only registry mapping kind tags to reference strategies.
//!
//! The set of kinds is closed: [`SerializedSeed::load`] only dispatches to
//! strategies that were registered up front.
//!
//! [`SerializedSeed::load`]: super::SerializedSeed::load

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use serde_json::Value;
use tracing::debug;

use super::strategies::{DerivedUrlStrategy, DirectUrlStrategy};
use super::{LazyReference, ReferenceStrategy, ResolveError};

static GLOBAL: LazyLock<ReferenceRegistry> = LazyLock::new(ReferenceRegistry::builtin);

/// Kind-keyed collection of [`ReferenceStrategy`] implementations.
///
/// Registration never replaces an existing kind.
#[derive(Clone, Default)]
pub struct ReferenceRegistry {
    strategies: BTreeMap<String, Arc<dyn ReferenceStrategy>>,
}

impl ReferenceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in `derived-url` and `direct-url` strategies.
    #[must_use]
    pub fn builtin() -> Self {
        let mut strategies: BTreeMap<String, Arc<dyn ReferenceStrategy>> = BTreeMap::new();
        for strategy in [
            Arc::new(DerivedUrlStrategy) as Arc<dyn ReferenceStrategy>,
            Arc::new(DirectUrlStrategy),
        ] {
            strategies.insert(strategy.kind().to_string(), strategy);
        }
        Self { strategies }
    }

    /// Returns the process-wide registry of built-in strategies.
    ///
    /// Initialized on first use and read-only afterwards.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Registers a strategy under its kind.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::DuplicateKind`] when the kind is already taken.
    #[tracing::instrument(skip(self, strategy), fields(kind = strategy.kind()))]
    pub fn register(&mut self, strategy: Arc<dyn ReferenceStrategy>) -> Result<(), ResolveError> {
        let kind = strategy.kind().to_string();
        if self.strategies.contains_key(&kind) {
            return Err(ResolveError::DuplicateKind { kind });
        }
        debug!("registering reference strategy");
        self.strategies.insert(kind, strategy);
        Ok(())
    }

    /// Looks up the strategy for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownKind`] when nothing is registered for `kind`.
    pub fn get(&self, kind: &str) -> Result<Arc<dyn ReferenceStrategy>, ResolveError> {
        self.strategies
            .get(kind)
            .cloned()
            .ok_or_else(|| ResolveError::unknown_kind(kind))
    }

    /// Creates an unresolved reference of `kind` from `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownKind`] or [`ResolveError::InvalidSeed`].
    pub fn create(&self, kind: &str, seed: Value) -> Result<LazyReference, ResolveError> {
        LazyReference::new(self.get(kind)?, seed)
    }

    /// Returns the registered kinds in sorted order.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        self.strategies.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ReferenceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
