//! Fallback strategy for repositories without a dedicated variant.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};
use url::Url;

use crate::download::{ContentKind, classify_content_type, document_extension};

use super::extract::extract_document_links;
use super::http_client::{page_request, send_checked};
use super::{FetchOptions, PageContent, ResolveError, Resolution, Strategy};

/// Fetches a page over HTTP and runs the shared extraction rules.
///
/// Before downloading HTML, the URL is checked for being the document itself: first by its
/// path suffix, then by a `HEAD` probe's content type.
#[derive(Debug, Clone)]
pub struct GenericStrategy {
    client: Client,
}

impl GenericStrategy {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch shared by the variants that only differ in extraction.
    pub(crate) async fn fetch_page(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<PageContent, ResolveError> {
        let parsed = Url::parse(url).map_err(|e| ResolveError::invalid_url(url, e.to_string()))?;

        if let Some(page) = self.detect_document(&parsed, options).await {
            return Ok(page);
        }

        let request = page_request(
            self.client.get(parsed.clone()),
            &options.user_agent.user_agent,
            options.timeout,
        );
        let response = send_checked(request, url).await?;
        let final_url = response.url().clone();
        let html = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ResolveError::timeout(url)
            } else {
                ResolveError::network(url, e)
            }
        })?;
        Ok(PageContent::html(final_url, html))
    }

    /// Recognizes a URL that already is the document, by path suffix and then by `HEAD`.
    pub(crate) async fn detect_document(
        &self,
        url: &Url,
        options: &FetchOptions,
    ) -> Option<PageContent> {
        if document_extension(url.path()).is_some() {
            debug!("URL path names a document; skipping page fetch");
            return Some(PageContent::document(url.clone(), None));
        }
        self.probe_document(url, options).await
    }

    /// Sends a `HEAD` request; any failure means "not known to be a document".
    async fn probe_document(&self, url: &Url, options: &FetchOptions) -> Option<PageContent> {
        let request = page_request(
            self.client.head(url.clone()),
            &options.user_agent.user_agent,
            options.timeout,
        );
        let response = match send_checked(request, url.as_str()).await {
            Ok(response) => response,
            Err(error) => {
                debug!(error = %error, "HEAD probe failed; falling back to GET");
                return None;
            }
        };
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        match classify_content_type(content_type.as_deref()) {
            ContentKind::Document(_) => {
                debug!(content_type = ?content_type, "HEAD probe reports a document");
                Some(PageContent::document(response.url().clone(), content_type))
            }
            ContentKind::Unlabeled | ContentKind::Other => None,
        }
    }
}

#[async_trait]
impl Strategy for GenericStrategy {
    fn name(&self) -> &'static str {
        "generic"
    }

    #[instrument(skip(self, options), fields(strategy = "generic"))]
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<PageContent, ResolveError> {
        self.fetch_page(url, options).await
    }

    fn extract(&self, page: &PageContent) -> Resolution {
        Resolution::Links(extract_document_links(page))
    }
}
