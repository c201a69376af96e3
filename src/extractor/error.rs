//! Error types for extraction.
//!
//! Every extraction either yields a complete record and item list or fails
//! with exactly one [`ExtractError`].

use thiserror::Error;

use crate::fetch::{FailureType, FetchError, Retryable, classify_fetch_error};

/// Errors that can occur while extracting a source.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The source payload is missing expected structure, or could not be
    /// fetched within the retry budget.
    #[error("discovery failed for '{input}': {reason}\n  Suggestion: {suggestion}")]
    Discovery {
        /// The source identifier being extracted.
        input: String,
        /// What was missing or failed.
        reason: String,
        /// How to fix the issue.
        suggestion: String,
    },

    /// The source itself reports the content as geographically restricted or expired.
    #[error("content unavailable for '{input}': {message}")]
    RestrictedContent {
        /// The source identifier being extracted.
        input: String,
        /// The restriction message supplied by the source.
        message: String,
    },

    /// A network step failed in a way that may succeed on retry.
    ///
    /// Only observed inside the retry loop; once attempts are exhausted it
    /// is promoted to [`ExtractError::Discovery`].
    #[error("transient fetch failure for '{input}': {source}")]
    TransientFetch {
        /// The source identifier being extracted.
        input: String,
        /// The underlying fetch failure.
        #[source]
        source: FetchError,
    },

    /// A per-page encoding marker is outside the closed lookup.
    #[error("unknown format code '{code}' on page {page} of '{input}'")]
    UnknownFormatCode {
        /// The source identifier being extracted.
        input: String,
        /// The unrecognized code.
        code: String,
        /// 1-based page carrying the code.
        page: u32,
    },
}

impl ExtractError {
    /// Creates a `Discovery` error with a generic suggestion.
    #[must_use]
    pub fn discovery(input: &str, reason: impl Into<String>) -> Self {
        Self::Discovery {
            input: input.to_string(),
            reason: reason.into(),
            suggestion: "Check the identifier; the source layout may have changed".to_string(),
        }
    }

    /// Creates a `RestrictedContent` error.
    #[must_use]
    pub fn restricted(input: &str, message: impl Into<String>) -> Self {
        Self::RestrictedContent {
            input: input.to_string(),
            message: message.into(),
        }
    }

    /// Creates an `UnknownFormatCode` error.
    #[must_use]
    pub fn unknown_format_code(input: &str, code: impl Into<String>, page: u32) -> Self {
        Self::UnknownFormatCode {
            input: input.to_string(),
            code: code.into(),
            page,
        }
    }

    /// Maps a failed fetch into the extraction taxonomy.
    ///
    /// HTTP 451 is a legal restriction; retryable failures become
    /// `TransientFetch`; everything else is a discovery failure.
    #[must_use]
    pub fn from_fetch(input: &str, error: FetchError) -> Self {
        if error.status() == Some(451) {
            return Self::restricted(input, format!("{} is unavailable for legal reasons", error.url()));
        }
        match classify_fetch_error(&error) {
            FailureType::Transient | FailureType::RateLimited => Self::TransientFetch {
                input: input.to_string(),
                source: error,
            },
            FailureType::NeedsAuth => Self::Discovery {
                input: input.to_string(),
                reason: error.to_string(),
                suggestion: "The source requires authentication, which is not supported"
                    .to_string(),
            },
            FailureType::Permanent => Self::discovery(input, error.to_string()),
        }
    }

    /// Promotes a `TransientFetch` left over after retries into `Discovery`.
    #[must_use]
    pub fn promote_transient(self, attempts: u32) -> Self {
        match self {
            Self::TransientFetch { input, source } => Self::Discovery {
                input,
                reason: format!("gave up after {attempts} attempt(s): {source}"),
                suggestion: "The source may be down; try again later".to_string(),
            },
            other => other,
        }
    }
}

impl Retryable for ExtractError {
    fn failure_type(&self) -> FailureType {
        match self {
            Self::TransientFetch { source, .. } => classify_fetch_error(source),
            Self::Discovery { .. } | Self::RestrictedContent { .. } | Self::UnknownFormatCode { .. } => {
                FailureType::Permanent
            }
        }
    }
}
