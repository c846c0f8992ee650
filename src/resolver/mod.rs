//! Link resolution: turning a repository landing page into document URLs.
//!
//! Each repository platform exposes its document link differently. A [`Strategy`]
//! knows how to fetch one platform's page and how to extract links from it;
//! [`select_strategy`] picks the strategy for a URL from an ordered dispatch table.
//!
//! # Architecture
//!
//! - [`Strategy`] - Async fetch plus synchronous extraction contract
//! - [`StrategyKind`] / [`select_strategy`] - Pure dispatch from URL to platform variant
//! - [`StrategySet`] - Kind-to-implementation map shared by pipeline workers
//! - [`GenericStrategy`] - Meta tag, embedded object, and anchor pattern extraction
//! - [`FileSelectStrategy`], [`CodeMediaStrategy`], [`FramesetStrategy`],
//!   [`BitstreamListStrategy`], [`RenderedStrategy`] - Platform variants
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use thesis_downloader_core::resolver::{
//!     ChromiumRenderer, FetchOptions, HttpClientConfig, RenderSettings, StrategySet,
//!     build_http_client, select_strategy,
//! };
//! use thesis_downloader_core::user_agent::UserAgentPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = build_http_client(&HttpClientConfig::default())?;
//! let strategies = StrategySet::new(client, Arc::new(ChromiumRenderer::new()), RenderSettings::default());
//!
//! let url = "https://repositorio.cespu.pt/handle/20.500.11816/1";
//! let strategy = strategies.get(select_strategy(url));
//! let options = FetchOptions::new(UserAgentPool::builtin().get_profile());
//! let page = strategy.fetch(url, &options).await?;
//! println!("{:?}", strategy.extract(&page));
//! # Ok(())
//! # }
//! ```

mod bitstream_list;
mod code_media;
mod dispatch;
mod error;
mod extract;
mod file_select;
mod frameset;
mod generic;
mod http_client;
mod rendered;
pub mod utils;

pub use bitstream_list::BitstreamListStrategy;
pub use code_media::CodeMediaStrategy;
pub use dispatch::{DISPATCH_TABLE, Predicate, StrategyKind, StrategySet, select_strategy};
pub use error::ResolveError;
pub use extract::extract_document_links;
pub use file_select::FileSelectStrategy;
pub use frameset::FramesetStrategy;
pub use generic::GenericStrategy;
pub use http_client::{HttpClientConfig, build_http_client, page_request, send_checked};
pub use rendered::{
    ChromiumRenderer, PageRenderer, RenderRequest, RenderSettings, RenderedPage,
    RenderedStrategy, RendererError,
};

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::user_agent::UserAgentProfile;

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

/// Per-request settings handed to [`Strategy::fetch`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    /// Outbound proxy for engines that do not share the HTTP client (headless browser).
    pub proxy: Option<String>,
    pub user_agent: UserAgentProfile,
}

impl FetchOptions {
    /// Options with the default timeout and no proxy.
    #[must_use]
    pub fn new(user_agent: UserAgentProfile) -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            proxy: None,
            user_agent,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }
}

/// What a fetch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageBody {
    /// An HTML page to run extraction over.
    Html(String),
    /// The fetched URL is the document itself.
    Document { content_type: Option<String> },
}

/// A fetched page together with its URL after redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    pub final_url: Url,
    pub body: PageBody,
}

impl PageContent {
    #[must_use]
    pub fn html(final_url: Url, html: impl Into<String>) -> Self {
        Self {
            final_url,
            body: PageBody::Html(html.into()),
        }
    }

    #[must_use]
    pub fn document(final_url: Url, content_type: Option<String>) -> Self {
        Self {
            final_url,
            body: PageBody::Document { content_type },
        }
    }

    /// Returns the HTML body, or `None` when the page is a document.
    #[must_use]
    pub fn html_body(&self) -> Option<&str> {
        match &self.body {
            PageBody::Html(html) => Some(html),
            PageBody::Document { .. } => None,
        }
    }
}

/// Absolute URLs of downloadable documents found on a page. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentLink(Vec<Url>);

impl DocumentLink {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(url: Url) -> Self {
        Self(vec![url])
    }

    /// Builds a link set from URLs, dropping repeats while keeping first-seen order.
    #[must_use]
    pub fn from_urls(urls: impl IntoIterator<Item = Url>) -> Self {
        let mut unique: Vec<Url> = Vec::new();
        for url in urls {
            if !unique.contains(&url) {
                unique.push(url);
            }
        }
        Self(unique)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn urls(&self) -> &[Url] {
        &self.0
    }

    #[must_use]
    pub fn into_urls(self) -> Vec<Url> {
        self.0
    }
}

/// Result of extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Document URLs (possibly none).
    Links(DocumentLink),
    /// The real content lives on another page; resolve that page generically.
    NextHop(Url),
}

/// Contract implemented by every platform variant.
///
/// Uses `async_trait` so the pipeline can hold strategies as `Arc<dyn Strategy>`.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Retrieves the page (or detects that the URL is the document itself).
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<PageContent, ResolveError>;

    /// Extracts document links from a page returned by this strategy's `fetch`.
    fn extract(&self, page: &PageContent) -> Resolution;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_document_link_from_urls_dedups_in_order() {
        let a = Url::parse("https://r.org/a.pdf").unwrap();
        let b = Url::parse("https://r.org/b.pdf").unwrap();
        let link = DocumentLink::from_urls([a.clone(), b.clone(), a.clone()]);
        assert_eq!(link.urls(), &[a, b]);
    }

    #[test]
    fn test_page_content_html_body() {
        let url = Url::parse("https://r.org/").unwrap();
        assert_eq!(PageContent::html(url.clone(), "<p>").html_body(), Some("<p>"));
        assert_eq!(PageContent::document(url, None).html_body(), None);
    }
}
