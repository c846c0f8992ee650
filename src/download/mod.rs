//! Document download: binary fetch, output naming, and retry classification.
//!
//! # Features
//!
//! - Streaming downloads into `{name}.part`, renamed on completion
//! - Content-type gate: PDF and Word documents only
//! - `{ItemID}-{server name}.{ext}` naming with numeric collision suffixes
//! - Fixed-delay-plus-jitter retry policy shared with page fetches

mod content_type;
mod error;
mod fetcher;
mod filename;
mod retry;

pub use content_type::{ContentKind, DOCX_MIME, classify_content_type, document_extension};
pub use error::DownloadError;
pub use fetcher::{DocumentFetcher, SavedDocument};
pub use filename::{document_filename, partial_path, resolve_unique_path, sanitize_filename};
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error,
    classify_resolve_error,
};
