//! Error types for dedup cache operations.

use std::fmt;

use thiserror::Error;

/// Structured classification for cache storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Constraint failure (primary key/check/not-null).
    ConstraintViolation,
    /// Connection pool timed out or is closed.
    PoolUnavailable,
    /// Filesystem or transport IO failure.
    Io,
    /// Unclassified database failure.
    Other,
}

impl CacheDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => Self::PoolUnavailable,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Database(database_error) => {
                let code = database_error.code();
                if matches!(
                    code.as_deref(),
                    Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
                ) || database_error
                    .message()
                    .to_ascii_lowercase()
                    .contains("database is locked")
                {
                    Self::BusyOrLocked
                } else if database_error.is_unique_violation() || database_error.is_check_violation() {
                    Self::ConstraintViolation
                } else {
                    Self::Other
                }
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for CacheDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolUnavailable => "pool_unavailable",
            Self::Io => "io",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

/// Errors raised by [`super::DedupCache`]. Any of them aborts a batch run.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Storage operation failed.
    #[error("cache storage error ({kind}): {message}")]
    Storage {
        kind: CacheDbErrorKind,
        message: String,
    },

    /// A stored row could not be decoded.
    #[error("corrupt cache record for item {item_id}: {reason}")]
    Corrupt { item_id: String, reason: String },

    /// The cache database could not be opened.
    #[error("failed to open cache: {0}")]
    Open(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage {
            kind: CacheDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl From<crate::db::DbError> for CacheError {
    fn from(err: crate::db::DbError) -> Self {
        Self::Open(err.to_string())
    }
}

impl CacheError {
    pub(crate) fn corrupt(item_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            item_id: item_id.into(),
            reason: reason.into(),
        }
    }
}
