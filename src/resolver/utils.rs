//! Helpers shared by the strategy modules.

use regex::Regex;
use scraper::Selector;
use url::Url;

/// Compiles a regex at static init; panics on invalid pattern.
pub fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Compiles a CSS selector at static init; panics on invalid selector.
pub fn compile_static_selector(selector: &str) -> Selector {
    Selector::parse(selector)
        .unwrap_or_else(|e| panic!("invalid static selector '{selector}': {e}"))
}

/// Normalizes a host string: trim, strip trailing '.', and lowercase.
#[must_use]
pub fn canonical_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Returns true if `host` equals `domain` or is one of its subdomains.
#[must_use]
pub fn host_within_domain(host: &str, domain: &str) -> bool {
    let host = canonical_host(host);
    let domain = canonical_host(domain);
    if domain.is_empty() {
        return false;
    }
    host == domain
        || host
            .strip_suffix(domain.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Joins a possibly relative link against the page URL.
///
/// Empty values, fragments-only, and `javascript:` pseudo links yield `None`.
#[must_use]
pub fn absolutize_url(value: &str, base_url: &Url) -> Option<Url> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('#') {
        return None;
    }
    if value
        .get(..11)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("javascript:"))
    {
        return None;
    }
    let joined = base_url.join(value).ok()?;
    matches!(joined.scheme(), "http" | "https").then_some(joined)
}

/// Rebases a link that points at the repository's own loopback address onto the real origin.
///
/// Misconfigured repositories publish `http://localhost:8080/...` in their metadata; the
/// path and query are kept while scheme, host and port come from `origin`.
#[must_use]
pub fn rebase_loopback(link: Url, origin: &Url) -> Url {
    let is_loopback = link
        .host_str()
        .is_some_and(|host| host.eq_ignore_ascii_case("localhost"));
    if !is_loopback {
        return link;
    }
    let mut rebased = origin.clone();
    rebased.set_path(link.path());
    rebased.set_query(link.query());
    rebased.set_fragment(link.fragment());
    rebased
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_host_trims_and_lowercases() {
        assert_eq!(canonical_host("  Repositorio.UNESP.br.  "), "repositorio.unesp.br");
        assert_eq!(canonical_host(""), "");
    }

    #[test]
    fn test_host_within_domain_exact_and_subdomain() {
        assert!(host_within_domain("ipen.br", "ipen.br"));
        assert!(host_within_domain("www.ipen.br", "ipen.br"));
        assert!(host_within_domain("repositorio.ufvjm.edu.br", "ufvjm.edu.br"));
    }

    #[test]
    fn test_host_within_domain_rejects_suffix_lookalikes() {
        assert!(!host_within_domain("notipen.br", "ipen.br"));
        assert!(!host_within_domain("ipen.br.evil.com", "ipen.br"));
        assert!(!host_within_domain("ipen.br", ""));
    }

    #[test]
    fn test_absolutize_url_relative_and_absolute() {
        let base = Url::parse("https://repo.example.org/handle/1/2?x=1").unwrap();
        assert_eq!(
            absolutize_url("/bitstream/1/f.pdf", &base).unwrap().as_str(),
            "https://repo.example.org/bitstream/1/f.pdf"
        );
        assert_eq!(
            absolutize_url("f.pdf", &base).unwrap().as_str(),
            "https://repo.example.org/handle/1/f.pdf"
        );
        assert_eq!(
            absolutize_url("http://other.org/a.pdf", &base).unwrap().as_str(),
            "http://other.org/a.pdf"
        );
        assert_eq!(
            absolutize_url("//cdn.example.org/a.pdf", &base).unwrap().as_str(),
            "https://cdn.example.org/a.pdf"
        );
    }

    #[test]
    fn test_absolutize_url_skips_pseudo_links() {
        let base = Url::parse("https://repo.example.org/").unwrap();
        assert!(absolutize_url("", &base).is_none());
        assert!(absolutize_url("#top", &base).is_none());
        assert!(absolutize_url("JavaScript:void(0)", &base).is_none());
        assert!(absolutize_url("mailto:someone@example.org", &base).is_none());
    }

    #[test]
    fn test_rebase_loopback_takes_origin_scheme_host_and_port() {
        let origin = Url::parse("https://repo.example.org/download?id=42").unwrap();
        let link = Url::parse("http://localhost:8080/f.pdf").unwrap();
        assert_eq!(
            rebase_loopback(link, &origin).as_str(),
            "https://repo.example.org/f.pdf"
        );
    }

    #[test]
    fn test_rebase_loopback_leaves_other_hosts_alone() {
        let origin = Url::parse("https://repo.example.org/").unwrap();
        let link = Url::parse("http://files.example.org:8080/f.pdf?v=1").unwrap();
        assert_eq!(
            rebase_loopback(link, &origin).as_str(),
            "http://files.example.org:8080/f.pdf?v=1"
        );
    }
}
