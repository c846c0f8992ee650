//! Error types for page fetching and link resolution.

use thiserror::Error;

/// Errors that can occur while fetching a repository page.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Non-success HTTP response.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// Headless browser failed to launch, navigate, or read the page.
    #[error("rendering failed for {url}: {message}")]
    Rendering { url: String, message: String },

    /// The URL could not be parsed or has no usable host.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A query parameter the strategy depends on is missing or empty.
    #[error("missing '{name}' parameter in {url}")]
    MissingParameter { url: String, name: &'static str },

    /// Shared HTTP client could not be constructed.
    #[error("HTTP client construction failed: {message}")]
    ClientBuild { message: String },
}

impl ResolveError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a rendering error.
    pub fn rendering(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rendering {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing-parameter error.
    pub fn missing_parameter(url: impl Into<String>, name: &'static str) -> Self {
        Self::MissingParameter {
            url: url.into(),
            name,
        }
    }

    /// Creates a client construction error.
    pub fn client_build(message: impl Into<String>) -> Self {
        Self::ClientBuild {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_http_status_display() {
        let msg = ResolveError::http_status("https://repo.example.org/x", 503).to_string();
        assert!(msg.contains("503"), "Expected status in: {msg}");
        assert!(msg.contains("https://repo.example.org/x"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_resolve_error_missing_parameter_display() {
        let msg = ResolveError::missing_parameter("https://a.org/x?id=1", "codigo_sophia").to_string();
        assert!(msg.contains("codigo_sophia"), "Expected parameter in: {msg}");
    }

    #[test]
    fn test_resolve_error_rendering_display() {
        let msg = ResolveError::rendering("https://ipen.br/x", "browser exited").to_string();
        assert!(msg.starts_with("rendering failed"), "Unexpected message: {msg}");
        assert!(msg.contains("browser exited"));
    }
}
