//! Cache record types and their row encoding.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::CacheError;
use crate::input::ItemId;

const STATUS_SAVED: &str = "saved";
const STATUS_NOT_FOUND: &str = "not_found";

/// Terminal outcome stored for an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CacheOutcome {
    /// Documents were written to these paths.
    Saved(Vec<PathBuf>),
    /// Resolution or download failed definitively.
    NotFound { reason: String },
}

impl CacheOutcome {
    /// Storage label for the outcome.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Saved(_) => STATUS_SAVED,
            Self::NotFound { .. } => STATUS_NOT_FOUND,
        }
    }
}

/// One stored `(ItemID, outcome)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub item_id: ItemId,
    pub outcome: CacheOutcome,
    /// `SQLite` `datetime('now')` at insertion, UTC.
    pub recorded_at: String,
}

/// Raw row of `cache_records`.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct CacheRow {
    pub item_id: String,
    pub status: String,
    pub saved_paths: Option<String>,
    pub reason: Option<String>,
    pub recorded_at: String,
}

impl CacheRow {
    pub(crate) fn into_record(self) -> Result<CacheRecord, CacheError> {
        let item_id =
            ItemId::parse(&self.item_id).map_err(|e| CacheError::corrupt(&self.item_id, e.to_string()))?;
        let outcome = match self.status.as_str() {
            STATUS_SAVED => {
                let raw = self.saved_paths.as_deref().unwrap_or("[]");
                let paths: Vec<PathBuf> = serde_json::from_str(raw)
                    .map_err(|e| CacheError::corrupt(&self.item_id, format!("saved_paths: {e}")))?;
                CacheOutcome::Saved(paths)
            }
            STATUS_NOT_FOUND => CacheOutcome::NotFound {
                reason: self.reason.unwrap_or_default(),
            },
            other => {
                return Err(CacheError::corrupt(
                    &self.item_id,
                    format!("unknown status '{other}'"),
                ));
            }
        };
        Ok(CacheRecord {
            item_id,
            outcome,
            recorded_at: self.recorded_at,
        })
    }
}

/// Encodes the `saved_paths` and `reason` columns for an outcome.
pub(crate) fn encode_outcome(
    item_id: &ItemId,
    outcome: &CacheOutcome,
) -> Result<(Option<String>, Option<String>), CacheError> {
    match outcome {
        CacheOutcome::Saved(paths) => {
            let encoded = serde_json::to_string(paths)
                .map_err(|e| CacheError::corrupt(item_id.as_str(), format!("saved_paths: {e}")))?;
            Ok((Some(encoded), None))
        }
        CacheOutcome::NotFound { reason } => Ok((None, Some(reason.clone()))),
    }
}
