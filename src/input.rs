//! Input list parsing and item identifier extraction.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for registry entries that cannot be processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// The last `=` segment of the URL is not an integer.
    #[error("no numeric item id in '{url}' (expected the last '=' segment to be digits)")]
    MissingItemId {
        /// The offending line.
        url: String,
    },
}

/// Stable registry identifier used as the dedup key.
///
/// Always a non-empty string of ASCII digits. Leading zeros are preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Parses a bare identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::MissingItemId`] when `value` is not all digits.
    pub fn parse(value: &str) -> Result<Self, InputError> {
        let value = value.trim();
        if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(value.to_string()))
        } else {
            Err(InputError::MissingItemId {
                url: value.to_string(),
            })
        }
    }

    /// Extracts the identifier from a registry URL: the text after the last `=`.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::MissingItemId`] when there is no `=` or the trailing
    /// segment is not all digits.
    pub fn from_source_url(url: &str) -> Result<Self, InputError> {
        let url = url.trim();
        url.rsplit_once('=')
            .and_then(|(_, tail)| Self::parse(tail).ok())
            .ok_or_else(|| InputError::MissingItemId {
                url: url.to_string(),
            })
    }

    /// Borrows the digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One non-empty line of the input list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// 1-based line number in the input file.
    pub line: usize,
    /// Raw URL text, trimmed.
    pub url: String,
}

/// Splits a newline-delimited URL list, skipping blank lines and `#` comments.
#[must_use]
pub fn parse_source_list(text: &str) -> Vec<SourceEntry> {
    text.lines()
        .enumerate()
        .filter_map(|(index, raw)| {
            let url = raw.trim();
            (!url.is_empty() && !url.starts_with('#')).then(|| SourceEntry {
                line: index + 1,
                url: url.to_string(),
            })
        })
        .collect()
}
