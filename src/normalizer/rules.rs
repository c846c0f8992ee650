//! Rewrite and deny tables used by the [`Normalizer`](super::Normalizer).
//!
//! The built-in tables collect corrections for registry entries whose repository host or
//! path changed, or was mistyped, over the years. Operators can append their own rules from
//! plain-text files loaded once at startup.

use std::collections::HashSet;

use thiserror::Error;

/// Built-in literal substring rewrites, applied in order.
const DEFAULT_REWRITES: &[(&str, &str)] = &[
    ("repositorio.lnec.pt:8080", "repositorio.lnec.pt"),
    ("http://tede2.usc.br:8080", "https://tede2.usc.br:8443"),
    ("tede2.usc.br:8443/tede/handle/tede", "tede2.usc.br:8443/handle/tede"),
    ("tede2.pucgoias.edu.br/tede/handle/tede", "tede2.pucgoias.edu.br/handle/tede"),
    ("bibliotecatede.uninove.br/tede/handle/tede", "bibliotecatede.uninove.br/handle/tede"),
    ("dspace.unila.edu.br/123456789", "dspace.unila.edu.br/handle/123456789"),
    ("tede.bc.uepb.edu.br/tede/jspui", "tede.bc.uepb.edu.br/jspui"),
    ("repositorio.idp.edu.br/123456789", "repositorio.idp.edu.br/handle/123456789"),
    ("bdtd.ueg.br/tede/handle/tede", "bdtd.ueg.br/handle/tede"),
    ("repositorio.unifesp.br/xmlui", "repositorio.unifesp.br"),
    ("repositorio.ufpa.br/jspui/2011", "repositorio.ufpa.br/jspui/handle/2011"),
    ("repositorio.ufpa.br/handle", "repositorio.ufpa.br/jspui/handle"),
    ("repositorio.ufpa.br/jspui/handle2011", "repositorio.ufpa.br/jspui/handle/2011"),
    ("https://repositorio.ifba.edu.br", "http://repositorio.ifba.edu.br"),
    ("https://rigeo.cprm.gov.br", "http://rigeo.cprm.gov.br"),
    ("dspace.unipampa.edu.br:8080", "dspace.unipampa.edu.br"),
    ("repositorio.unilab.edu.br:8080", "repositorio.unilab.edu.br"),
    ("bd.bibl.ita.br", "bdita.bibl.ita.br"),
    ("teste.tede.unifacs.br:8080", "tede.unifacs.br"),
    ("http://repositorio.ifap.edu.br", "https://repositorio.ifap.edu.br"),
    ("repositorio.ifap.edu.br:8080", "repositorio.ifap.edu.br"),
    ("http://repositorio.ufal.br", "http://www.repositorio.ufal.br"),
    ("bibliodigital.unijui.edu.br:8080", "bibliodigital.unijui.edu.br"),
    ("bibliodigital.unijui.edu.br/xmlui", "bibliodigital.unijui.edu.br"),
    ("vkali40.ucs.br:8080", "repositorio.ucs.br"),
    ("10.1.0.96:8080", "repositorio.ifba.edu.br"),
    ("191.252.194.60", "repositorio.fdv.br"),
    ("prod.repositorio.ufscar.br", "repositorio.ufscar.br"),
    ("www7.bahiana.edu.br", "repositorio.bahiana.edu.br"),
    ("ri.ucsal.br:8080", "ri.ucsal.br"),
    ("ri.ucsal.br/jspui", "ri.ucsal.br"),
    ("10.0.217.128:8080", "tede.upf.br"),
    ("lrepositorio.ufra.edu.br", "repositorio.ufra.edu.br"),
    ("repositorio.ufra.edu.br/jspui//jspui", "repositorio.ufra.edu.br/jspui"),
    ("repositorio.ufra.edu.br/handle", "repositorio.ufra.edu.br/jspui/handle"),
    ("www.repositorio.fjp.mg.gov.br", "repositorio.fjp.mg.gov.br"),
    ("rigeoh.cprm.gov.br", "rigeo.cprm.gov.br"),
    ("200.129.163.131:8080", "tede.ufam.edu.br"),
    ("200.136.52.105", "repositorio.ipen.br"),
    ("200.129.209.58:8080", "repositorio.ufgd.edu.br/jspui"),
    ("repositorio.ufgd.edu.br/jspui/jspui", "repositorio.ufgd.edu.br/jspui"),
    ("200.129.209.58", "repositorio.ufgd.edu.br"),
    ("www.repositorio.ufrb.edu.br", "ri.ufrb.edu.br"),
    ("repositorio.faema.edu.br:8000", "repositorio.unifaema.edu.br"),
    ("www.repositorio.ufba.br", "repositorio.ufba.br"),
    ("acervo.ufvjm.edu.br", "repositorio.ufvjm.edu.br"),
    ("repositorio.ufvjm.edu.br:8080", "repositorio.ufvjm.edu.br"),
    ("repositorio.ufvjm.edu.br/jspui", "repositorio.ufvjm.edu.br"),
    ("repositorio.cruzeirodosul.edu.br:8080", "repositorio.cruzeirodosul.edu.br"),
    ("repositorio.cruzeirodosul.edu.br", "repositorio.cruzeirodosul.edu.br/jspui"),
    ("repositorio.cruzeirodosul.edu.br/jspui/jspui", "repositorio.cruzeirodosul.edu.br/jspui"),
    ("tede2.unisagrado.edu.br:8080", "tede2.unisagrado.edu.br:8443"),
    ("http://repositorio.ufes.br", "https://repositorio.ufes.br"),
    ("tede.utp.br:8080", "tede.utp.br"),
    ("tede.unioeste.br:8080/tede", "tede.unioeste.br"),
    ("tedebc.ufma.br/jspui/handle/tede/tede", "tedebc.ufma.br/jspui/handle/tede"),
    ("www.repositorio.uniceub.br", "repositorio.uniceub.br/jspui"),
    ("repositorio.uniceub.br/jspui/jspui", "repositorio.uniceub.br/jspui"),
    ("www.repositorio.insper.edu.br", "repositorio.insper.edu.br"),
    ("tede2.uefs.br:8080/handle/tede/tede", "tede2.uefs.br:8080/handle/tede"),
    ("repositorio.unb.br", "repositorio.unb.br/jspui"),
    ("repositorio.unb.br/jspui/jspui", "repositorio.unb.br/jspui"),
    ("dspace.idp.edu.br:8080/xmlui", "repositorio.idp.edu.br"),
    ("purl.net/esepf/handle", "hdl.handle.net"),
    ("http://repositorio.ufba.br", "https://repositorio.ufba.br"),
];

/// Built-in authorities that never yield a document.
///
/// Includes aggregators, researcher profile pages, dead hosts, and typos found in
/// registry entries.
const DEFAULT_DENIED_HOSTS: &[&str] = &[
    "",
    "localhost:8080",
    "localhost:443",
    "152.92.4.120",
    "link.springer.com",
    "dx.doi.org.br",
    "sucupira.capes.gov.br",
    "linktr.ee",
    "orcid.org",
    "lattes.cnpg.br",
    "orcid. org",
    "www.youtube.com",
    "dx.doi.org.",
    "dx.doi.org",
    "lattes.cnpq.br",
    "orcid",
    "youtu.be",
    "drive.google.com",
    "dx,doi.org",
    "lattes,cnpq.br",
    "dx:doi.org",
    "dx.org",
    "dx;xoi.org",
    "onlinelibrary.wiley.com",
    "buscatextual.cnpq.br",
    "bdtccs.furg.br:8080",
    "wwws.cnpq.br",
    "iattes.cníci.br",
    "lattes.cnp q.br",
    "www.abpnrevista.org.br",
    "www.sciencedirect.com",
    "sistemas.usp.br",
    "www.movisaberesefazeresmigrantes.com",
    "sitios.anhembi.br",
    "www.bd.bibl.ita.br",
    "tede.inatel.br:8080",
    "riu.ufam.edu.br",
    "www.teses.ufc.br",
    "rubi.casaruibarbosa.gov.br",
    "repositorio.ismt.pt",
    "dspace.ismt.pt",
    "teses.ufrj.br",
    "www.uff.br",
    "app.uff.br",
    "tede.fecap.br",
    "tede.fecap.br:8080",
    "www2.unifesp.br",
    "www.egn.mar.mil.br",
    "repositorioinstitucional.uea.edu.br",
    "bibliotecadigital.unec.edu.br",
    "repositorio.santamariasaude.pt",
    "www.defesa.gov.br",
    "teses2.ufrj.br",
    "ufba.academia.edu",
    "biotecnologia.ufba.br",
    "repositorio.faema.edu.br:8000",
    "ppgss.ufsc.br",
    "unesp.primo.exlibrisgroup.com",
    "www.obrasraras.fiocruz.br",
];

/// One literal substring replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    /// Text to search for.
    pub from: String,
    /// Replacement text.
    pub to: String,
}

impl RewriteRule {
    /// Creates a rewrite rule.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Errors raised while loading operator-supplied rule files.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleFileError {
    /// A rewrite line is not of the form `from => to`.
    #[error("invalid rewrite rule on line {line}: expected `from => to`")]
    MalformedRewrite {
        /// 1-based line number.
        line: usize,
    },

    /// A rewrite line has an empty `from` side, which would match everywhere.
    #[error("invalid rewrite rule on line {line}: empty search text")]
    EmptyPattern {
        /// 1-based line number.
        line: usize,
    },
}

/// Immutable rewrite and deny tables.
#[derive(Debug, Clone, Default)]
pub struct NormalizerRules {
    rewrites: Vec<RewriteRule>,
    denied_hosts: HashSet<String>,
}

impl NormalizerRules {
    /// Creates a rule set from explicit tables.
    #[must_use]
    pub fn new(
        rewrites: Vec<RewriteRule>,
        denied_hosts: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            rewrites,
            denied_hosts: denied_hosts
                .into_iter()
                .map(|host| host.as_ref().trim().to_lowercase())
                .collect(),
        }
    }

    /// Returns the built-in registry corrections.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(
            DEFAULT_REWRITES
                .iter()
                .map(|(from, to)| RewriteRule::new(*from, *to))
                .collect(),
            DEFAULT_DENIED_HOSTS.iter().copied(),
        )
    }

    /// Appends rewrite rules after the existing ones.
    #[must_use]
    pub fn with_rewrites(mut self, extra: impl IntoIterator<Item = RewriteRule>) -> Self {
        self.rewrites.extend(extra);
        self
    }

    /// Adds hosts to the deny set.
    #[must_use]
    pub fn with_denied_hosts(mut self, extra: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.denied_hosts
            .extend(extra.into_iter().map(|host| host.as_ref().trim().to_lowercase()));
        self
    }

    /// Ordered rewrite table.
    #[must_use]
    pub fn rewrites(&self) -> &[RewriteRule] {
        &self.rewrites
    }

    /// Number of denied authorities.
    #[must_use]
    pub fn denied_host_count(&self) -> usize {
        self.denied_hosts.len()
    }

    /// Returns true when `authority` (host with optional port) is denied.
    #[must_use]
    pub fn is_denied(&self, authority: &str) -> bool {
        self.denied_hosts.contains(&authority.to_lowercase())
    }

    /// Parses a rewrite file: one `from => to` per line, `#` starts a comment line.
    ///
    /// # Errors
    ///
    /// Returns [`RuleFileError`] on the first malformed line.
    pub fn parse_rewrites(text: &str) -> Result<Vec<RewriteRule>, RuleFileError> {
        let mut rules = Vec::new();
        for (index, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((from, to)) = line.split_once("=>") else {
                return Err(RuleFileError::MalformedRewrite { line: index + 1 });
            };
            let from = from.trim();
            if from.is_empty() {
                return Err(RuleFileError::EmptyPattern { line: index + 1 });
            }
            rules.push(RewriteRule::new(from, to.trim()));
        }
        Ok(rules)
    }

    /// Parses a deny file: one authority per line, `#` starts a comment line.
    #[must_use]
    pub fn parse_denied_hosts(text: &str) -> Vec<String> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_are_populated() {
        let rules = NormalizerRules::builtin();
        assert_eq!(rules.rewrites().len(), DEFAULT_REWRITES.len());
        assert!(rules.denied_host_count() > 50);
        assert_eq!(rules.rewrites()[0].from, "repositorio.lnec.pt:8080");
    }

    #[test]
    fn test_is_denied_ignores_case() {
        let rules = NormalizerRules::builtin();
        assert!(rules.is_denied("ORCID.org"));
        assert!(rules.is_denied("Iattes.cníci.br"));
        assert!(rules.is_denied("localhost:8080"));
        assert!(!rules.is_denied("localhost:9090"));
        assert!(!rules.is_denied("repositorio.ufba.br"));
    }

    #[test]
    fn test_parse_rewrites_skips_comments_and_blank_lines() {
        let rules = NormalizerRules::parse_rewrites(
            "# moved in 2023\n\nold.example.br => new.example.br\n  a.br/x=>a.br/y  \n",
        )
        .unwrap();
        assert_eq!(
            rules,
            vec![
                RewriteRule::new("old.example.br", "new.example.br"),
                RewriteRule::new("a.br/x", "a.br/y"),
            ]
        );
    }

    #[test]
    fn test_parse_rewrites_reports_line_numbers() {
        let err = NormalizerRules::parse_rewrites("a => b\nmissing arrow\n").unwrap_err();
        assert_eq!(err, RuleFileError::MalformedRewrite { line: 2 });

        let err = NormalizerRules::parse_rewrites(" => b").unwrap_err();
        assert_eq!(err, RuleFileError::EmptyPattern { line: 1 });
    }

    #[test]
    fn test_extra_rules_append_after_builtin() {
        let rules = NormalizerRules::builtin()
            .with_rewrites([RewriteRule::new("x.br", "y.br")])
            .with_denied_hosts(["Blocked.Example.org"]);
        assert_eq!(rules.rewrites().last().unwrap().from, "x.br");
        assert!(rules.is_denied("blocked.example.org"));
    }

    #[test]
    fn test_parse_denied_hosts() {
        let hosts = NormalizerRules::parse_denied_hosts("# dead\nold.example.br\n\n  b.br:8080 \n");
        assert_eq!(hosts, vec!["old.example.br", "b.br:8080"]);
    }
}
