//! Media Resolver Library
//!
//! Turns a content identifier into a metadata record plus an ordered list of
//! media items whose final URLs are resolved lazily, exactly once, and can be
//! persisted and resumed without repeating discovery.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - HTTP fetch capability and the bounded retry policy
//! - [`reference`] - Lazy, memoizing, serializable URL references
//! - [`media`] - Media items and formats
//! - [`extractor`] - Source extractors and their registry
//! - [`pool`] - Bounded-concurrency resolution of many items

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod extractor;
pub mod fetch;
pub mod media;
pub mod pool;
pub mod reference;
mod user_agent;

// Re-export commonly used types
pub use extractor::{
    ExtractError, Extraction, Extractor, ExtractorConfig, ExtractorKind, ExtractorRegistry,
    SourceRecord, build_default_extractor_registry,
};
pub use fetch::{
    DEFAULT_MAX_ATTEMPTS, FailureType, FetchConfig, FetchError, Fetcher, HttpFetcher,
    RetryDecision, RetryPolicy, with_retry,
};
pub use media::{MediaFormat, MediaItem, PersistedItem};
pub use pool::{DEFAULT_CONCURRENCY, PoolError, ResolutionPool, ResolutionReport};
pub use reference::{LazyReference, ReferenceRegistry, ResolveError, SerializedSeed};
