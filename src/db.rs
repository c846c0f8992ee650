//! `SQLite` storage behind the dedup cache.
//!
//! One file per output directory, opened in WAL mode so a `cache list` in another
//! terminal can read while a batch is writing. The schema lives in `migrations/` and is
//! applied on every open.

use std::path::Path;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// File-level locking makes a large pool pointless.
const POOL_SIZE: u32 = 5;

/// How long a writer waits on a locked database before `SQLITE_BUSY`.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("cannot open cache database: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("cache schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("cannot create state directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Migrated connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens `db_path` with [`DEFAULT_BUSY_TIMEOUT_MS`].
    ///
    /// # Errors
    ///
    /// See [`Database::with_busy_timeout`].
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        Self::with_busy_timeout(db_path, Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS)).await
    }

    /// Opens `db_path`, creating the file and its parent directory when missing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Directory`] when the parent cannot be created, otherwise
    /// [`DbError::Connection`] or [`DbError::Migration`].
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn with_busy_timeout(db_path: &Path, busy_timeout: Duration) -> Result<Self, DbError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DbError::Directory {
                    path: parent.display().to_string(),
                    source,
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout);
        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect_with(options)
            .await?;
        Self::migrated(pool).await
    }

    /// Single-connection in-memory database. Every connection to `:memory:` is a new
    /// database, so the pool must not grow past one.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] or [`DbError::Migration`].
    pub async fn new_in_memory() -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, DbError> {
        MIGRATOR.run(&pool).await?;
        debug!("cache schema up to date");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the pragma query fails.
    pub async fn is_wal_enabled(&self) -> Result<bool, DbError> {
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;
        Ok(mode.eq_ignore_ascii_case("wal"))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
