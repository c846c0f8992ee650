//! Thesis Downloader Core Library
//!
//! Locates and retrieves the full-text documents (PDF/Word) behind national thesis
//! registry entries. Each entry points at one of hundreds of institutional repository
//! platforms, and each platform hides the real file link behind its own page structure.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`normalizer`] - Rewrite and deny tables for known-broken registry URLs
//! - [`resolver`] - Per-platform strategies that turn a landing page into document links
//! - [`download`] - Binary fetch, output naming, and retry classification
//! - [`pipeline`] - Per-item orchestration and the bounded-parallel batch runner
//! - [`cache`] - Persistent dedup store keyed by registry item id
//! - [`db`] - `SQLite` connection and schema management
//! - [`user_agent`] - Weighted rotation of browser identities
//! - [`input`] - Input list parsing and item id extraction

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod db;
pub mod download;
pub mod input;
pub mod normalizer;
pub mod pipeline;
pub mod resolver;
pub mod user_agent;

// Re-export commonly used types
pub use cache::{CacheError, CacheOutcome, CacheRecord, DedupCache, default_cache_path};
pub use db::{DEFAULT_BUSY_TIMEOUT_MS, Database, DbError};
pub use download::{DocumentFetcher, DownloadError, RetryPolicy};
pub use input::{InputError, ItemId, SourceEntry, parse_source_list};
pub use normalizer::{NormalizedUrl, Normalizer, NormalizerRules, Rejection};
pub use pipeline::{
    BatchRunner, BatchStats, BatchSummary, FailureKind, Outcome, Pipeline, PipelineError,
    PipelineSettings, RunnerError, SkipReason,
};
pub use resolver::{ResolveError, StrategyKind, StrategySet, select_strategy};
pub use user_agent::{UserAgentPool, UserAgentProfile};
