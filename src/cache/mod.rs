//! Persistent dedup cache keyed by registry item id.
//!
//! A record is written once per item when it reaches a terminal outcome and is never
//! overwritten; a present record makes later runs skip the item. One async lock
//! serializes every storage access and guards a single-entry memo of the latest lookup,
//! so the pipeline's "check, then skip" path does not hit `SQLite` twice for the same item.
//!
//! # Example
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use thesis_downloader_core::cache::{CacheOutcome, DedupCache};
//! use thesis_downloader_core::input::ItemId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = DedupCache::open(Path::new("out/.thesis-downloader/cache.db")).await?;
//! let id = ItemId::parse("42")?;
//! if !cache.contains(&id).await? {
//!     cache.set(&id, &CacheOutcome::Saved(vec![PathBuf::from("out/42-f.pdf")])).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod record;

pub use error::{CacheDbErrorKind, CacheError};
pub use record::{CacheOutcome, CacheRecord};

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::input::ItemId;
use record::{CacheRow, encode_outcome};

/// Directory under the output directory holding run state.
pub const STATE_DIR_NAME: &str = ".thesis-downloader";

/// File name of the cache database inside [`STATE_DIR_NAME`].
pub const CACHE_FILE_NAME: &str = "cache.db";

/// Default cache location for an output directory.
#[must_use]
pub fn default_cache_path(output_dir: &Path) -> PathBuf {
    output_dir.join(STATE_DIR_NAME).join(CACHE_FILE_NAME)
}

#[derive(Debug, Default)]
struct Memo {
    last: Option<(ItemId, Option<CacheRecord>)>,
}

/// `SQLite`-backed `ItemID -> outcome` store.
#[derive(Debug)]
pub struct DedupCache {
    db: Database,
    memo: Mutex<Memo>,
}

impl DedupCache {
    /// Wraps an already-open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            db,
            memo: Mutex::new(Memo::default()),
        }
    }

    /// Opens or creates the cache file with the default busy timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Open`] when the database cannot be opened or migrated.
    pub async fn open(path: &Path) -> Result<Self, CacheError> {
        Ok(Self::new(Database::new(path).await?))
    }

    /// Opens or creates the cache file with a custom busy timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Open`] when the database cannot be opened or migrated.
    pub async fn open_with_busy_timeout(path: &Path, busy_timeout: Duration) -> Result<Self, CacheError> {
        Ok(Self::new(Database::with_busy_timeout(path, busy_timeout).await?))
    }

    /// Returns true when a record exists for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on storage failure.
    pub async fn contains(&self, id: &ItemId) -> Result<bool, CacheError> {
        Ok(self.get(id).await?.is_some())
    }

    /// Returns the record for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on storage failure or an undecodable row.
    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn get(&self, id: &ItemId) -> Result<Option<CacheRecord>, CacheError> {
        let mut memo = self.memo.lock().await;
        if let Some((memo_id, record)) = &memo.last
            && memo_id == id
        {
            debug!("cache memo hit");
            return Ok(record.clone());
        }

        let row = sqlx::query_as::<_, CacheRow>(
            r"SELECT item_id, status, saved_paths, reason, recorded_at
              FROM cache_records WHERE item_id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(self.db.pool())
        .await?;
        let record = row.map(CacheRow::into_record).transpose()?;

        memo.last = Some((id.clone(), record.clone()));
        Ok(record)
    }

    /// Inserts a record unless one already exists. Returns whether it inserted.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on storage failure.
    #[instrument(skip(self, outcome), fields(item_id = %id, status = outcome.status()))]
    pub async fn set(&self, id: &ItemId, outcome: &CacheOutcome) -> Result<bool, CacheError> {
        let (saved_paths, reason) = encode_outcome(id, outcome)?;
        let mut memo = self.memo.lock().await;
        memo.last = None;

        let result = sqlx::query(
            r"INSERT INTO cache_records (item_id, status, saved_paths, reason)
              VALUES (?, ?, ?, ?)
              ON CONFLICT(item_id) DO NOTHING",
        )
        .bind(id.as_str())
        .bind(outcome.status())
        .bind(saved_paths)
        .bind(reason)
        .execute(self.db.pool())
        .await?;

        let inserted = result.rows_affected() == 1;
        if !inserted {
            debug!("record already present; not overwritten");
        }
        Ok(inserted)
    }

    /// Removes the record for `id`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on storage failure.
    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn delete(&self, id: &ItemId) -> Result<bool, CacheError> {
        let mut memo = self.memo.lock().await;
        memo.last = None;
        let result = sqlx::query("DELETE FROM cache_records WHERE item_id = ?")
            .bind(id.as_str())
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes every record. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on storage failure.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<u64, CacheError> {
        let mut memo = self.memo.lock().await;
        memo.last = None;
        let result = sqlx::query("DELETE FROM cache_records")
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// All item ids, oldest record first.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on storage failure or an undecodable row.
    pub async fn keys(&self) -> Result<Vec<ItemId>, CacheError> {
        Ok(self.items().await?.into_iter().map(|record| record.item_id).collect())
    }

    /// All outcomes, oldest record first.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on storage failure or an undecodable row.
    pub async fn values(&self) -> Result<Vec<CacheOutcome>, CacheError> {
        Ok(self.items().await?.into_iter().map(|record| record.outcome).collect())
    }

    /// All records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on storage failure or an undecodable row.
    #[instrument(skip(self))]
    pub async fn items(&self) -> Result<Vec<CacheRecord>, CacheError> {
        let _memo = self.memo.lock().await;
        let rows = sqlx::query_as::<_, CacheRow>(
            r"SELECT item_id, status, saved_paths, reason, recorded_at
              FROM cache_records ORDER BY recorded_at, rowid",
        )
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter().map(CacheRow::into_record).collect()
    }

    /// Number of records.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on storage failure.
    pub async fn len(&self) -> Result<u64, CacheError> {
        let _memo = self.memo.lock().await;
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_records")
            .fetch_one(self.db.pool())
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Returns true when no records are stored.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on storage failure.
    pub async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }

    /// Closes the underlying pool.
    pub async fn close(self) {
        self.db.close().await;
    }
}
