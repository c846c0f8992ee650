//! Failures of a single document fetch.
//!
//! Messages end up in cache `not_found` reasons, so each one names the URL or path.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("transport failure for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no response from {url} before the deadline")]
    Timeout { url: String },

    #[error("server answered {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Creating, writing, or renaming the output file failed.
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Only `http` and `https` links are fetched.
    #[error("not a fetchable document URL: {url}")]
    InvalidUrl { url: String },

    /// Body length disagreed with `Content-Length`; the partial file was removed.
    #[error("truncated body for {path}: {actual_bytes} of {expected_bytes} bytes")]
    Integrity {
        path: PathBuf,
        expected_bytes: u64,
        actual_bytes: u64,
    },

    /// Typically a login wall or an HTML viewer in place of the file.
    #[error("{url} returned {content_type}, not a document")]
    UnsupportedContentType { url: String, content_type: String },
}

impl DownloadError {
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    pub fn unsupported_content_type(url: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::UnsupportedContentType {
            url: url.into(),
            content_type: content_type.into(),
        }
    }
}
