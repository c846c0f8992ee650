//! Retry policy and failure classification for page and document fetches.
//!
//! Failures are classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - Temporary failures that may succeed on retry
//! - [`FailureType::RateLimited`] - Server throttling (HTTP 429), retried like transient
//! - [`FailureType::Permanent`] - Failures that won't succeed regardless of retries
//!
//! [`RetryPolicy`] then decides whether another attempt is allowed and how long to wait:
//! a fixed base delay plus uniform random jitter.
//!
//! # Example
//!
//! ```
//! use thesis_downloader_core::download::{
//!     DownloadError, RetryPolicy, RetryDecision, classify_error
//! };
//!
//! let policy = RetryPolicy::default();
//! let error = DownloadError::http_status("https://example.com/file.pdf", 503);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use super::DownloadError;
use crate::resolver::ResolveError;

/// Default maximum attempts per network operation, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default fixed delay between attempts.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);

/// Default upper bound for the random jitter added to each delay.
const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(5);

/// Classification of a fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, 5xx server errors, connection refused, browser crash.
    Transient,

    /// Server rate limiting (HTTP 429).
    RateLimited,

    /// Permanent failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, invalid URL, HTML instead of a document.
    Permanent,
}

impl FailureType {
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimited)
    }
}

/// Decision on whether to retry a failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for bounded retry with fixed delay and jitter.
///
/// # Default Values
///
/// - `max_attempts`: 5
/// - `base_delay`: 5 seconds
/// - `max_jitter`: 5 seconds
///
/// ```text
/// delay = base_delay + uniform(0..=max_jitter)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,
    base_delay: Duration,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with custom settings. `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_jitter,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed.
    #[must_use]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if !failure_type.is_retryable() {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay();
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    fn calculate_delay(&self) -> Duration {
        self.base_delay + self.calculate_jitter()
    }

    fn calculate_jitter(&self) -> Duration {
        let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Classifies a document fetch error.
///
/// | Error | Type |
/// |-------|------|
/// | HTTP 408, 5xx | Transient |
/// | HTTP 429 | RateLimited |
/// | Other HTTP | Permanent |
/// | Timeout, Network (non-TLS), Integrity | Transient |
/// | Network (TLS) | Permanent |
/// | IO, InvalidUrl, UnsupportedContentType | Permanent |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),
        DownloadError::Timeout { .. } | DownloadError::Integrity { .. } => FailureType::Transient,
        DownloadError::Network { source, .. } => classify_network(source),
        DownloadError::Io { .. }
        | DownloadError::InvalidUrl { .. }
        | DownloadError::UnsupportedContentType { .. } => FailureType::Permanent,
    }
}

/// Classifies a page fetch error. Rendering failures are transient.
#[must_use]
pub fn classify_resolve_error(error: &ResolveError) -> FailureType {
    match error {
        ResolveError::HttpStatus { status, .. } => classify_http_status(*status),
        ResolveError::Timeout { .. } | ResolveError::Rendering { .. } => FailureType::Transient,
        ResolveError::Network { source, .. } => classify_network(source),
        ResolveError::InvalidUrl { .. }
        | ResolveError::MissingParameter { .. }
        | ResolveError::ClientBuild { .. } => FailureType::Permanent,
    }
}

fn classify_network(source: &reqwest::Error) -> FailureType {
    if is_tls_error(source) {
        FailureType::Permanent
    } else {
        FailureType::Transient
    }
}

#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,
        429 => FailureType::RateLimited,
        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

/// Checks if a reqwest error is a TLS/certificate error.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let mut messages = vec![error.to_string().to_lowercase()];
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        messages.push(inner.to_string().to_lowercase());
        source = inner.source();
    }
    messages.iter().any(|message| {
        message.contains("certificate")
            || message.contains("tls")
            || message.contains("ssl")
            || message.contains("handshake")
    })
}
