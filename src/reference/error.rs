//! Error types for lazy reference construction, loading and resolution.

use thiserror::Error;

use crate::fetch::{FailureType, FetchError, Retryable, classify_fetch_error};

/// Errors that can occur while building, loading or resolving a [`LazyReference`].
///
/// [`LazyReference`]: super::LazyReference
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No strategy is registered under the requested kind.
    #[error("unknown reference kind '{kind}'\n  Suggestion: Register a strategy for this kind before loading")]
    UnknownKind {
        /// The kind tag that had no strategy.
        kind: String,
    },

    /// A strategy with the same kind is already registered.
    #[error("reference kind '{kind}' is already registered")]
    DuplicateKind {
        /// The duplicated kind tag.
        kind: String,
    },

    /// The seed payload does not match the strategy's expected shape.
    #[error("invalid seed for '{kind}': {reason}")]
    InvalidSeed {
        /// The strategy kind.
        kind: String,
        /// Why the seed was rejected.
        reason: String,
    },

    /// A network-backed strategy failed to fetch.
    ///
    /// The built-in kinds are pure. Strategies that fetch during resolution
    /// report their failures here so the pool retries them by HTTP status.
    #[error("resolution of '{kind}' failed: {source}")]
    Fetch {
        /// The strategy kind.
        kind: String,
        /// The underlying fetch failure.
        #[source]
        source: FetchError,
    },

    /// The strategy ran but could not produce a value.
    #[error("resolution of '{kind}' failed: {reason}")]
    Failed {
        /// The strategy kind.
        kind: String,
        /// Why resolution failed.
        reason: String,
    },
}

impl ResolveError {
    /// Creates an `UnknownKind` error.
    #[must_use]
    pub fn unknown_kind(kind: &str) -> Self {
        Self::UnknownKind {
            kind: kind.to_string(),
        }
    }

    /// Creates an `InvalidSeed` error.
    #[must_use]
    pub fn invalid_seed(kind: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSeed {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a `Fetch` error for a strategy that fetches while resolving.
    #[must_use]
    pub fn fetch(kind: &str, source: FetchError) -> Self {
        Self::Fetch {
            kind: kind.to_string(),
            source,
        }
    }

    /// Creates a `Failed` error.
    #[must_use]
    pub fn failed(kind: &str, reason: impl Into<String>) -> Self {
        Self::Failed {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }
}

impl Retryable for ResolveError {
    fn failure_type(&self) -> FailureType {
        match self {
            Self::Fetch { source, .. } => classify_fetch_error(source),
            Self::Failed { .. } => FailureType::Transient,
            Self::UnknownKind { .. } | Self::DuplicateKind { .. } | Self::InvalidSeed { .. } => {
                FailureType::Permanent
            }
        }
    }
}
