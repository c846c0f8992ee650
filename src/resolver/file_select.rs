//! Variant for repositories that list thesis files in a `<select id="file">` control.

use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use super::extract::extract_from_document;
use super::generic::GenericStrategy;
use super::utils::{absolutize_url, compile_static_selector};
use super::{
    DocumentLink, FetchOptions, PageBody, PageContent, ResolveError, Resolution, Strategy,
};

static FILE_SELECT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("select#file"));
static OPTION_SELECTOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("option"));
static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("a[href]"));

/// Returns every PDF anchor when their number matches the selector's file options.
///
/// A count mismatch means the page only partially exposes its files; nothing is returned
/// rather than an incomplete set.
#[derive(Debug, Clone)]
pub struct FileSelectStrategy {
    generic: GenericStrategy,
}

impl FileSelectStrategy {
    #[must_use]
    pub fn new(generic: GenericStrategy) -> Self {
        Self { generic }
    }
}

#[async_trait]
impl Strategy for FileSelectStrategy {
    fn name(&self) -> &'static str {
        "file-select"
    }

    #[instrument(skip(self, options), fields(strategy = "file-select"))]
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<PageContent, ResolveError> {
        self.generic.fetch_page(url, options).await
    }

    fn extract(&self, page: &PageContent) -> Resolution {
        let PageBody::Html(html) = &page.body else {
            return Resolution::Links(DocumentLink::single(page.final_url.clone()));
        };
        let document = Html::parse_document(html);

        let Some(select) = document.select(&FILE_SELECT_SELECTOR).next() else {
            return Resolution::Links(extract_from_document(&document, &page.final_url));
        };

        let option_count = select
            .select(&OPTION_SELECTOR)
            .filter(|option| {
                option
                    .value()
                    .attr("value")
                    .is_some_and(|value| !value.trim().is_empty())
            })
            .count();

        let links = DocumentLink::from_urls(
            document
                .select(&ANCHOR_SELECTOR)
                .filter_map(|anchor| anchor.value().attr("href"))
                .filter(|href| href.to_ascii_lowercase().contains("pdf"))
                .filter_map(|href| absolutize_url(href, &page.final_url)),
        );

        if option_count != links.len() {
            debug!(
                options = option_count,
                links = links.len(),
                "file option count does not match PDF links"
            );
            return Resolution::Links(DocumentLink::empty());
        }

        Resolution::Links(links)
    }
}
