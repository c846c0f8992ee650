//! Generic document-link extraction over parsed HTML.
//!
//! Rules run in a fixed priority order and the first rule that yields a link wins:
//!
//! 1. `citation_pdf_url` meta tag (loopback hosts rebased onto the page origin)
//! 2. `<object type="application/pdf" data=...>`
//! 3. `<embed type="application/pdf" src=...>`
//! 4. anchors whose `href` matches a known download pattern, pattern by pattern

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use super::utils::{absolutize_url, compile_static_regex, compile_static_selector, rebase_loopback};
use super::{DocumentLink, PageBody, PageContent};

static CITATION_PDF_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"meta[name="citation_pdf_url"][content]"#));
static PDF_OBJECT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"object[data][type="application/pdf"]"#));
static PDF_EMBED_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"embed[src][type="application/pdf"]"#));
static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("a[href]"));

/// Anchor `href` patterns in priority order.
static ANCHOR_PATTERNS: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        compile_static_regex(r"/Busca/Download\?codigoArquivo="),
        compile_static_regex(r"/bitstream.*\.pdf$"),
        compile_static_regex(r"download\.php\?(id_ficheiro|codigo)="),
        compile_static_regex(r"auth-sophia/exibicao"),
    ]
});

/// Runs generic extraction over a fetched page.
///
/// A page that is itself a document yields its own URL.
#[must_use]
pub fn extract_document_links(page: &PageContent) -> DocumentLink {
    match &page.body {
        PageBody::Document { .. } => DocumentLink::single(page.final_url.clone()),
        PageBody::Html(html) => {
            let document = Html::parse_document(html);
            extract_from_document(&document, &page.final_url)
        }
    }
}

pub(crate) fn extract_from_document(document: &Html, base: &Url) -> DocumentLink {
    if let Some(link) = citation_pdf_url(document, base) {
        return DocumentLink::single(link);
    }
    if let Some(link) = first_attr(document, &PDF_OBJECT_SELECTOR, "data", base) {
        return DocumentLink::single(link);
    }
    if let Some(link) = first_attr(document, &PDF_EMBED_SELECTOR, "src", base) {
        return DocumentLink::single(link);
    }
    for pattern in ANCHOR_PATTERNS.iter() {
        let found = document
            .select(&ANCHOR_SELECTOR)
            .filter_map(|anchor| anchor.value().attr("href"))
            .map(str::trim)
            .filter(|href| pattern.is_match(href))
            .find_map(|href| absolutize_url(href, base));
        if let Some(link) = found {
            return DocumentLink::single(link);
        }
    }
    DocumentLink::empty()
}

fn citation_pdf_url(document: &Html, base: &Url) -> Option<Url> {
    document
        .select(&CITATION_PDF_SELECTOR)
        .filter_map(|meta| meta.value().attr("content"))
        .find_map(|content| absolutize_url(content, base))
        .map(|link| rebase_loopback(link, base))
}

fn first_attr(document: &Html, selector: &Selector, attr: &str, base: &Url) -> Option<Url> {
    document
        .select(selector)
        .filter_map(|element| element.value().attr(attr))
        .find_map(|value| absolutize_url(value, base))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn page(base: &str, html: &str) -> PageContent {
        PageContent::html(Url::parse(base).unwrap(), html)
    }

    fn only_link(link: &DocumentLink) -> &str {
        assert_eq!(link.len(), 1, "expected one link, got {link:?}");
        link.urls()[0].as_str()
    }

    #[test]
    fn test_meta_tag_wins_over_matching_anchor() {
        let html = r#"<html><head>
            <meta name="citation_pdf_url" content="/bitstream/1/meta.pdf">
            </head><body><a href="/bitstream/1/anchor.pdf">PDF</a></body></html>"#;
        let links = extract_document_links(&page("https://repo.example.org/handle/1", html));
        assert_eq!(only_link(&links), "https://repo.example.org/bitstream/1/meta.pdf");
    }

    #[test]
    fn test_meta_tag_with_localhost_is_rebased() {
        let html = r#"<meta name="citation_pdf_url" content="http://localhost:8080/f.pdf">"#;
        let links = extract_document_links(&page("https://repo.example.org/download?id=42", html));
        assert_eq!(only_link(&links), "https://repo.example.org/f.pdf");
    }

    #[test]
    fn test_object_then_embed() {
        let html = r#"<body>
            <embed src="/e.pdf" type="application/pdf">
            <object data="/o.pdf" type="application/pdf"></object>
            </body>"#;
        let links = extract_document_links(&page("https://a.org/x", html));
        assert_eq!(only_link(&links), "https://a.org/o.pdf");

        let html = r#"<embed src="/viewer/e.pdf" type="application/pdf">"#;
        let links = extract_document_links(&page("https://a.org/x", html));
        assert_eq!(only_link(&links), "https://a.org/viewer/e.pdf");
    }

    #[test]
    fn test_object_without_pdf_type_ignored() {
        let html = r#"<object data="/flash.swf" type="application/x-shockwave-flash"></object>"#;
        assert!(extract_document_links(&page("https://a.org/x", html)).is_empty());
    }

    #[test]
    fn test_anchor_patterns_follow_priority_not_document_order() {
        let html = r#"<body>
            <a href="/tde/download.php?id_ficheiro=9">download</a>
            <a href="/Busca/Download?codigoArquivo=77">arquivo</a>
            </body>"#;
        let links = extract_document_links(&page("https://bdtd.example.br/x", html));
        assert_eq!(
            only_link(&links),
            "https://bdtd.example.br/Busca/Download?codigoArquivo=77"
        );
    }

    #[test]
    fn test_bitstream_anchor_requires_pdf_suffix() {
        let html = r#"<a href="/bitstream/1/2/license.txt">l</a><a href="/bitstream/1/2/tese.pdf">t</a>"#;
        let links = extract_document_links(&page("https://a.org/handle/1/2", html));
        assert_eq!(only_link(&links), "https://a.org/bitstream/1/2/tese.pdf");
    }

    #[test]
    fn test_sophia_anchors() {
        let html = r#"<a href="download.php?codigo=12">d</a>"#;
        let links = extract_document_links(&page("https://b.org/php/page.php", html));
        assert_eq!(only_link(&links), "https://b.org/php/download.php?codigo=12");

        let html = r#"<a href="https://b.org/auth-sophia/exibicao/345">d</a>"#;
        let links = extract_document_links(&page("https://b.org/x", html));
        assert_eq!(only_link(&links), "https://b.org/auth-sophia/exibicao/345");
    }

    #[test]
    fn test_no_match_is_empty() {
        let html = r#"<a href="/about">about</a><a href="/tese.docx">docx</a>"#;
        assert!(extract_document_links(&page("https://a.org/", html)).is_empty());
    }

    #[test]
    fn test_document_page_yields_its_own_url() {
        let url = Url::parse("https://a.org/files/t.pdf").unwrap();
        let links = extract_document_links(&PageContent::document(url, None));
        assert_eq!(only_link(&links), "https://a.org/files/t.pdf");
    }
}
