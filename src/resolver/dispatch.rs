//! URL-to-strategy dispatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use reqwest::Client;
use url::Url;

use super::utils::host_within_domain;
use super::{
    BitstreamListStrategy, CodeMediaStrategy, FileSelectStrategy, FramesetStrategy,
    GenericStrategy, PageRenderer, RenderSettings, RenderedStrategy, Strategy,
};

/// Platform variant chosen for a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Generic,
    FileSelect,
    CodeMedia,
    Rendered,
    Frameset,
    BitstreamList,
}

impl StrategyKind {
    pub const ALL: [Self; 6] = [
        Self::Generic,
        Self::FileSelect,
        Self::CodeMedia,
        Self::Rendered,
        Self::Frameset,
        Self::BitstreamList,
    ];
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Generic => "generic",
            Self::FileSelect => "file-select",
            Self::CodeMedia => "code-media",
            Self::Rendered => "rendered",
            Self::Frameset => "frameset",
            Self::BitstreamList => "bitstream-list",
        })
    }
}

/// Condition a dispatch row tests against a URL.
#[derive(Debug, Clone, Copy)]
pub enum Predicate {
    /// Host equals the domain or is a subdomain of it.
    Host(&'static str),
    /// Host matches any listed domain.
    AnyHost(&'static [&'static str]),
    /// Query string carries the parameter.
    QueryParam(&'static str),
}

impl Predicate {
    fn matches(&self, url: &Url) -> bool {
        match self {
            Self::Host(domain) => url
                .host_str()
                .is_some_and(|host| host_within_domain(host, domain)),
            Self::AnyHost(domains) => url.host_str().is_some_and(|host| {
                domains
                    .iter()
                    .any(|domain| host_within_domain(host, domain))
            }),
            Self::QueryParam(name) => url.query_pairs().any(|(key, _)| key == *name),
        }
    }
}

const RENDERED_HOSTS: &[&str] = &[
    "web.esenfc.pt",
    "repositorio.esenfc.pt",
    "repositorio.pgsskroton.com",
    "repositorio.pgsscogna.com.br",
    "repositorio.unesp.br",
    "ufvjm.edu.br",
    "patua.iec.gov.br",
    "repositorio.unifesp.br",
    "ipen.br",
    "locus.ufv.br",
];

/// Ordered dispatch rows. The first matching row wins; no match means [`StrategyKind::Generic`].
pub const DISPATCH_TABLE: &[(Predicate, StrategyKind)] = &[
    (Predicate::Host("maxwell.vrac.puc-rio.br"), StrategyKind::FileSelect),
    (Predicate::QueryParam("codigo_sophia"), StrategyKind::CodeMedia),
    (Predicate::AnyHost(RENDERED_HOSTS), StrategyKind::Rendered),
    (Predicate::Host("bdtd.ufrr.br"), StrategyKind::Frameset),
    (Predicate::Host("repositorio.cespu.pt"), StrategyKind::BitstreamList),
];

/// Selects the strategy for a URL. Unparseable URLs get [`StrategyKind::Generic`].
#[must_use]
pub fn select_strategy(url: &str) -> StrategyKind {
    let Ok(parsed) = Url::parse(url) else {
        return StrategyKind::Generic;
    };
    DISPATCH_TABLE
        .iter()
        .find(|(predicate, _)| predicate.matches(&parsed))
        .map_or(StrategyKind::Generic, |(_, kind)| *kind)
}

/// Implementations for every [`StrategyKind`], shared across workers.
#[derive(Clone)]
pub struct StrategySet {
    generic: Arc<dyn Strategy>,
    strategies: HashMap<StrategyKind, Arc<dyn Strategy>>,
}

impl StrategySet {
    /// Builds the production variants over one HTTP client and renderer.
    #[must_use]
    pub fn new(client: Client, renderer: Arc<dyn PageRenderer>, render: RenderSettings) -> Self {
        let generic = GenericStrategy::new(client);
        let mut strategies: HashMap<StrategyKind, Arc<dyn Strategy>> = HashMap::new();
        strategies.insert(
            StrategyKind::FileSelect,
            Arc::new(FileSelectStrategy::new(generic.clone())),
        );
        strategies.insert(
            StrategyKind::CodeMedia,
            Arc::new(CodeMediaStrategy::new(generic.clone())),
        );
        strategies.insert(
            StrategyKind::Rendered,
            Arc::new(RenderedStrategy::new(generic.clone(), renderer, render)),
        );
        strategies.insert(
            StrategyKind::Frameset,
            Arc::new(FramesetStrategy::new(generic.clone())),
        );
        strategies.insert(
            StrategyKind::BitstreamList,
            Arc::new(BitstreamListStrategy::new(generic.clone())),
        );
        Self {
            generic: Arc::new(generic),
            strategies,
        }
    }

    /// Replaces the implementation for one kind.
    #[must_use]
    pub fn with_override(mut self, kind: StrategyKind, strategy: Arc<dyn Strategy>) -> Self {
        if kind == StrategyKind::Generic {
            self.generic = strategy;
        } else {
            self.strategies.insert(kind, strategy);
        }
        self
    }

    /// Implementation for `kind`; falls back to the generic variant.
    #[must_use]
    pub fn get(&self, kind: StrategyKind) -> Arc<dyn Strategy> {
        self.strategies
            .get(&kind)
            .map_or_else(|| Arc::clone(&self.generic), Arc::clone)
    }

    /// The generic variant, used to follow next hops.
    #[must_use]
    pub fn generic(&self) -> Arc<dyn Strategy> {
        Arc::clone(&self.generic)
    }
}

impl fmt::Debug for StrategySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<(String, &'static str)> = self
            .strategies
            .iter()
            .map(|(kind, strategy)| (kind.to_string(), strategy.name()))
            .chain(std::iter::once((StrategyKind::Generic.to_string(), self.generic.name())))
            .collect();
        names.sort_unstable();
        f.debug_struct("StrategySet").field("strategies", &names).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resolver::{ChromiumRenderer, HttpClientConfig, build_http_client};

    #[test]
    fn test_select_strategy_table_rows() {
        let cases = [
            (
                "https://www.maxwell.vrac.puc-rio.br/colecao.php?strSecao=resultado&nrSeq=1",
                StrategyKind::FileSelect,
            ),
            ("http://biblioteca.example.br/index.asp?codigo_sophia=123", StrategyKind::CodeMedia),
            ("https://repositorio.unesp.br/handle/11449/1", StrategyKind::Rendered),
            ("https://acervo.ufvjm.edu.br/jspui/handle/1/2", StrategyKind::Rendered),
            ("https://www.ipen.br/biblioteca/teses/1.pdf", StrategyKind::Rendered),
            ("https://bdtd.ufrr.br/tde_busca/arquivo.php?codArquivo=1", StrategyKind::Frameset),
            ("https://repositorio.cespu.pt/handle/20.500.11816/1", StrategyKind::BitstreamList),
            ("https://repositorio.ufba.br/handle/ri/1", StrategyKind::Generic),
        ];
        for (url, expected) in cases {
            assert_eq!(select_strategy(url), expected, "dispatch for {url}");
        }
    }

    #[test]
    fn test_select_strategy_first_row_wins() {
        // Both the file-select host and the code parameter match; the earlier row wins.
        let url = "https://maxwell.vrac.puc-rio.br/x?codigo_sophia=1";
        assert_eq!(select_strategy(url), StrategyKind::FileSelect);

        let url = "https://repositorio.unesp.br/x?codigo_sophia=1";
        assert_eq!(select_strategy(url), StrategyKind::CodeMedia);
    }

    #[test]
    fn test_select_strategy_does_not_match_lookalike_hosts() {
        assert_eq!(select_strategy("https://fakeipen.br/x"), StrategyKind::Generic);
        assert_eq!(select_strategy("https://x.org/?not_codigo_sophia=1"), StrategyKind::Generic);
    }

    #[test]
    fn test_select_strategy_unparseable_is_generic() {
        assert_eq!(select_strategy("not a url"), StrategyKind::Generic);
    }

    #[test]
    fn test_select_strategy_is_deterministic() {
        let url = "https://repositorio.cespu.pt/handle/1";
        let first = select_strategy(url);
        assert!((0..10).all(|_| select_strategy(url) == first));
    }

    #[test]
    fn test_strategy_set_maps_every_kind_and_honors_override() {
        let client = build_http_client(&HttpClientConfig::default()).unwrap();
        let set = StrategySet::new(
            client.clone(),
            Arc::new(ChromiumRenderer::new()),
            RenderSettings::default(),
        );
        for kind in StrategyKind::ALL {
            assert_eq!(set.get(kind).name(), kind.to_string());
        }

        let set = set.with_override(
            StrategyKind::Rendered,
            Arc::new(GenericStrategy::new(client)),
        );
        assert_eq!(set.get(StrategyKind::Rendered).name(), "generic");
    }
}
