//! Variant for framesets whose content page is loaded in a `mainFrame`.

use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::instrument;

use super::generic::GenericStrategy;
use super::utils::{absolutize_url, compile_static_selector};
use super::{DocumentLink, FetchOptions, PageBody, PageContent, ResolveError, Resolution, Strategy};

static MAIN_FRAME_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"frame[name="mainFrame"][src]"#));

/// Points the pipeline at the framed page; extraction then continues generically.
#[derive(Debug, Clone)]
pub struct FramesetStrategy {
    generic: GenericStrategy,
}

impl FramesetStrategy {
    #[must_use]
    pub fn new(generic: GenericStrategy) -> Self {
        Self { generic }
    }
}

#[async_trait]
impl Strategy for FramesetStrategy {
    fn name(&self) -> &'static str {
        "frameset"
    }

    #[instrument(skip(self, options), fields(strategy = "frameset"))]
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<PageContent, ResolveError> {
        self.generic.fetch_page(url, options).await
    }

    fn extract(&self, page: &PageContent) -> Resolution {
        let PageBody::Html(html) = &page.body else {
            return Resolution::Links(DocumentLink::single(page.final_url.clone()));
        };
        let document = Html::parse_document(html);
        document
            .select(&MAIN_FRAME_SELECTOR)
            .filter_map(|frame| frame.value().attr("src"))
            .find_map(|src| absolutize_url(src, &page.final_url))
            .map_or_else(|| Resolution::Links(DocumentLink::empty()), Resolution::NextHop)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use url::Url;

    use super::*;
    use crate::resolver::{HttpClientConfig, build_http_client};

    fn strategy() -> FramesetStrategy {
        let client = build_http_client(&HttpClientConfig::default()).unwrap();
        FramesetStrategy::new(GenericStrategy::new(client))
    }

    #[test]
    fn test_main_frame_becomes_next_hop() {
        let html = r#"<frameset><frame name="topFrame" src="top.php"><frame name="mainFrame" src="tde_busca/arquivo.php?codArquivo=5"></frameset>"#;
        let page = PageContent::html(Url::parse("https://bdtd.ufrr.br/tde/").unwrap(), html);
        assert_eq!(
            strategy().extract(&page),
            Resolution::NextHop(
                Url::parse("https://bdtd.ufrr.br/tde/tde_busca/arquivo.php?codArquivo=5").unwrap()
            )
        );
    }

    #[test]
    fn test_missing_frame_is_empty() {
        let html = r#"<frameset><frame name="other" src="x.php"></frameset>"#;
        let page = PageContent::html(Url::parse("https://bdtd.ufrr.br/").unwrap(), html);
        assert_eq!(strategy().extract(&page), Resolution::Links(DocumentLink::empty()));
    }
}
