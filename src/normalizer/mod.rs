//! URL normalization: registry corrections, deny list, and well-formedness checks.
//!
//! [`Normalizer::normalize`] is a pure function of its input and the immutable
//! [`NormalizerRules`] it was built with. The rewrite table is applied until the URL stops
//! changing, so normalizing an already normalized URL returns it unchanged.
//!
//! # Example
//!
//! ```
//! use thesis_downloader_core::normalizer::{Normalizer, NormalizerRules};
//!
//! let normalizer = Normalizer::new(NormalizerRules::builtin());
//! let url = normalizer
//!     .normalize("http://tede2.usc.br:8080/handle/tede/1")
//!     .unwrap();
//! assert_eq!(url.as_str(), "https://tede2.usc.br:8443/handle/tede/1");
//! ```

mod rules;

pub use rules::{NormalizerRules, RewriteRule, RuleFileError};

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

/// Upper bound on full passes over the rewrite table before giving up.
const MAX_REWRITE_PASSES: usize = 8;

/// Reason a URL was rejected before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Missing scheme or authority, or embedded whitespace.
    #[error("invalid-url: {url} ({reason})")]
    InvalidUrl {
        /// The offending input.
        url: String,
        /// Short explanation.
        reason: &'static str,
    },

    /// The URL authority is on the deny list.
    #[error("denied-host: {host} ({url})")]
    DeniedHost {
        /// The rewritten URL.
        url: String,
        /// The denied authority.
        host: String,
    },

    /// The rewrite table did not reach a fixpoint for this URL.
    #[error("unstable-rewrite: {url} did not converge after {MAX_REWRITE_PASSES} passes")]
    UnstableRewrite {
        /// The original input.
        url: String,
    },
}

impl Rejection {
    /// Stable label used in logs and reports.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "invalid-url",
            Self::DeniedHost { .. } => "denied-host",
            Self::UnstableRewrite { .. } => "unstable-rewrite",
        }
    }
}

/// A URL that passed rewriting, the deny check, and validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    /// Borrows the URL text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Applies [`NormalizerRules`] to raw registry URLs.
#[derive(Debug, Clone)]
pub struct Normalizer {
    rules: Arc<NormalizerRules>,
}

impl Normalizer {
    /// Creates a normalizer over the given rules.
    #[must_use]
    pub fn new(rules: NormalizerRules) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    /// Normalizer with the built-in registry corrections.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(NormalizerRules::builtin())
    }

    /// Rules this normalizer applies.
    #[must_use]
    pub fn rules(&self) -> &NormalizerRules {
        &self.rules
    }

    /// Validates, rewrites, and deny-checks a URL.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] describing why the URL cannot be resolved.
    pub fn normalize(&self, raw: &str) -> Result<NormalizedUrl, Rejection> {
        let input = raw.trim();
        validate(input)?;

        let rewritten = self
            .apply_rewrites(input)
            .ok_or_else(|| Rejection::UnstableRewrite {
                url: input.to_string(),
            })?;
        if rewritten != input {
            debug!(from = %input, to = %rewritten, "rewrote registry URL");
        }

        validate(&rewritten)?;
        let authority = authority(&rewritten).unwrap_or_default();
        if self.rules.is_denied(authority) {
            return Err(Rejection::DeniedHost {
                host: authority.to_string(),
                url: rewritten,
            });
        }

        Ok(NormalizedUrl(rewritten))
    }

    fn apply_rewrites(&self, url: &str) -> Option<String> {
        let mut current = url.to_string();
        for pass in 0..MAX_REWRITE_PASSES {
            let next = self
                .rules
                .rewrites()
                .iter()
                .fold(current.clone(), |acc, rule| {
                    if acc.contains(&rule.from) {
                        acc.replace(&rule.from, &rule.to)
                    } else {
                        acc
                    }
                });
            if next == current {
                trace!(passes = pass + 1, "rewrite table converged");
                return Some(current);
            }
            current = next;
        }
        None
    }
}

/// Returns the raw authority (host plus optional port) of a `scheme://authority/...` URL.
///
/// This deliberately avoids full URL parsing so malformed hosts from data entry
/// (`dx,doi.org`, `orcid. org`) can still be matched against the deny list.
#[must_use]
pub fn authority(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    Some(&rest[..end])
}

fn validate(url: &str) -> Result<(), Rejection> {
    let invalid = |reason| Rejection::InvalidUrl {
        url: url.to_string(),
        reason,
    };

    if url.chars().any(char::is_whitespace) {
        return Err(invalid("embedded whitespace"));
    }
    let Some((scheme, _)) = url.split_once("://") else {
        return Err(invalid("missing scheme"));
    };
    let scheme_ok = scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !scheme_ok {
        return Err(invalid("missing scheme"));
    }
    if authority(url).is_none_or(str::is_empty) {
        return Err(invalid("missing authority"));
    }
    Ok(())
}
