//! Variant for Sophia library systems addressed by a `codigo_sophia` parameter.

use async_trait::async_trait;
use tracing::{debug, instrument};
use url::Url;

use super::extract::extract_document_links;
use super::generic::GenericStrategy;
use super::{FetchOptions, PageContent, ResolveError, Resolution, Strategy};

/// Query parameter carrying the catalog code.
pub const CODE_PARAMETER: &str = "codigo_sophia";

const MEDIA_PATH: &str = "/php/midia.php";

/// Fetches the media endpoint derived from the catalog code instead of the catalog page.
#[derive(Debug, Clone)]
pub struct CodeMediaStrategy {
    generic: GenericStrategy,
}

impl CodeMediaStrategy {
    #[must_use]
    pub fn new(generic: GenericStrategy) -> Self {
        Self { generic }
    }

    /// Builds `{scheme}://{authority}/php/midia.php?tipo=1&codigo={code}`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidUrl`] for unparseable input and
    /// [`ResolveError::MissingParameter`] when the code is absent or empty.
    pub fn media_url(url: &str) -> Result<Url, ResolveError> {
        let parsed = Url::parse(url).map_err(|e| ResolveError::invalid_url(url, e.to_string()))?;
        let code = parsed
            .query_pairs()
            .find(|(name, _)| name == CODE_PARAMETER)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ResolveError::missing_parameter(url, CODE_PARAMETER))?;

        let mut media = parsed
            .join(MEDIA_PATH)
            .map_err(|e| ResolveError::invalid_url(url, e.to_string()))?;
        media
            .query_pairs_mut()
            .clear()
            .append_pair("tipo", "1")
            .append_pair("codigo", &code);
        media.set_fragment(None);
        Ok(media)
    }
}

#[async_trait]
impl Strategy for CodeMediaStrategy {
    fn name(&self) -> &'static str {
        "code-media"
    }

    #[instrument(skip(self, options), fields(strategy = "code-media"))]
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<PageContent, ResolveError> {
        let media = Self::media_url(url)?;
        debug!(media_url = %media, "derived media endpoint");
        self.generic.fetch_page(media.as_str(), options).await
    }

    fn extract(&self, page: &PageContent) -> Resolution {
        Resolution::Links(extract_document_links(page))
    }
}
