//! Variant for DSpace item pages that attach several bitstreams to one record.

use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::instrument;

use super::extract::extract_from_document;
use super::generic::GenericStrategy;
use super::utils::{absolutize_url, compile_static_selector};
use super::{DocumentLink, FetchOptions, PageBody, PageContent, ResolveError, Resolution, Strategy};

static BITSTREAM_ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[href*="/bitstream/handle"]"#));

/// Returns every bitstream anchor on the page, deduplicated in document order.
#[derive(Debug, Clone)]
pub struct BitstreamListStrategy {
    generic: GenericStrategy,
}

impl BitstreamListStrategy {
    #[must_use]
    pub fn new(generic: GenericStrategy) -> Self {
        Self { generic }
    }
}

#[async_trait]
impl Strategy for BitstreamListStrategy {
    fn name(&self) -> &'static str {
        "bitstream-list"
    }

    #[instrument(skip(self, options), fields(strategy = "bitstream-list"))]
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<PageContent, ResolveError> {
        self.generic.fetch_page(url, options).await
    }

    fn extract(&self, page: &PageContent) -> Resolution {
        let PageBody::Html(html) = &page.body else {
            return Resolution::Links(DocumentLink::single(page.final_url.clone()));
        };
        let document = Html::parse_document(html);
        let links = DocumentLink::from_urls(
            document
                .select(&BITSTREAM_ANCHOR_SELECTOR)
                .filter_map(|anchor| anchor.value().attr("href"))
                .filter_map(|href| absolutize_url(href, &page.final_url)),
        );
        if links.is_empty() {
            return Resolution::Links(extract_from_document(&document, &page.final_url));
        }
        Resolution::Links(links)
    }
}
