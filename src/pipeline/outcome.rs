//! Per-item results of [`super::Pipeline::process`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::cache::{CacheError, CacheRecord};

/// Why an item needed no work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A cache record exists; carries the stored outcome.
    AlreadyRecorded(Box<CacheRecord>),
    /// No item id, or a URL the normalizer could not accept.
    InvalidInput(String),
    /// The URL authority is on the deny list.
    Denied(String),
    /// Another worker in this run holds the same item id.
    InFlight,
}

impl SkipReason {
    /// Stable label used in logs and summaries.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadyRecorded(_) => "already-recorded",
            Self::InvalidInput(_) => "invalid-input",
            Self::Denied(_) => "denied",
            Self::InFlight => "in-flight",
        }
    }

    /// True for skips caused by unusable input rather than prior work.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::Denied(_))
    }
}

/// Terminal failure class written into the cache as `not_found`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Non-retryable error: 4xx, invalid URL, unsupported content type, local I/O.
    Permanent,
    /// Transient errors persisted through every attempt.
    Exhausted,
    /// The page was fetched but carried no document link.
    NoDocumentLink,
    /// The headless engine kept failing.
    Rendering,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Permanent => "permanent",
            Self::Exhausted => "exhausted",
            Self::NoDocumentLink => "no-document-link",
            Self::Rendering => "rendering",
        })
    }
}

/// What happened to one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// At least one document was written.
    Saved(Vec<PathBuf>),
    /// Nothing was fetched.
    Skipped(SkipReason),
    /// Resolution or download failed for good; a `not_found` record was written.
    Failed { kind: FailureKind, reason: String },
}

/// Errors that stop processing of an item without recording it.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The cache could not be read or written. Fatal for the batch.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// An interrupt was requested while the item was in flight.
    #[error("interrupted")]
    Interrupted,
}
