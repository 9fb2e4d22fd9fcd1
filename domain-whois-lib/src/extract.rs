//! Domain normalization and public-suffix extraction.

use crate::registry::TldRegistry;
use crate::types::DomainName;

/// Reduce user input to a bare lowercase host name.
///
/// Strips an `http://`/`https://` scheme (a `www.` label is kept), then any
/// path, query, fragment and port. Applying it twice changes nothing.
pub fn normalize(input: &str) -> String {
    let mut domain = input.trim().to_lowercase();

    for scheme in ["https://", "http://"] {
        if let Some(rest) = domain.strip_prefix(scheme) {
            domain = rest.to_string();
            break;
        }
    }

    if let Some(idx) = domain.find(|c: char| c == '/' || c == '?' || c == '#') {
        if idx > 0 {
            domain.truncate(idx);
        }
    }

    if let Some(idx) = domain.find(':') {
        if idx > 0 {
            domain.truncate(idx);
        }
    }

    domain.trim().to_string()
}

/// Splits domains against a fixed list of known suffixes.
///
/// Suffixes are ordered by label count, then length, both descending, so the
/// first `endsWith` hit is the most specific one (`co.uk` before `uk`).
#[derive(Debug, Clone, Default)]
pub struct TldExtractor {
    /// (suffix, ".suffix") in match order
    suffixes: Vec<(String, String)>,
}

impl TldExtractor {
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<String> = suffixes
            .into_iter()
            .map(|s| s.as_ref().trim().trim_matches('.').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        list.sort_by(|a, b| {
            let dots_a = a.matches('.').count();
            let dots_b = b.matches('.').count();
            dots_b
                .cmp(&dots_a)
                .then_with(|| b.len().cmp(&a.len()))
                .then_with(|| a.cmp(b))
        });
        list.dedup();

        Self {
            suffixes: list
                .into_iter()
                .map(|s| {
                    let dotted = format!(".{}", s);
                    (s, dotted)
                })
                .collect(),
        }
    }

    /// Extractor over every suffix the registry knows.
    pub fn from_registry(registry: &dyn TldRegistry) -> Self {
        Self::new(registry.suffixes())
    }

    pub fn len(&self) -> usize {
        self.suffixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }

    /// Split `input` into subdomain, prefix and suffix.
    ///
    /// Unknown suffixes fall back to a last-label split. Input without a dot
    /// comes back as `{prefix: input, suffix: ""}`.
    pub fn extract(&self, input: &str) -> DomainName {
        let normalized = normalize(input);
        let host = normalized.trim_end_matches('.');

        let mut name = DomainName {
            raw: input.to_string(),
            normalized: normalized.clone(),
            ..DomainName::default()
        };

        if !host.contains('.') {
            name.prefix = host.to_string();
            return name;
        }

        let matched = self
            .suffixes
            .iter()
            .find(|(_, dotted)| host.ends_with(dotted.as_str()) && host.len() > dotted.len());

        let (remainder, suffix) = match matched {
            Some((suffix, dotted)) => (&host[..host.len() - dotted.len()], suffix.as_str()),
            None => match host.rsplit_once('.') {
                Some((rest, last)) => (rest, last),
                None => (host, ""),
            },
        };

        name.suffix = suffix.to_string();
        match remainder.rsplit_once('.') {
            Some((sub, prefix)) => {
                name.prefix = prefix.to_string();
                if !sub.is_empty() {
                    name.subdomain = Some(sub.to_string());
                }
            }
            None => name.prefix = remainder.to_string(),
        }

        if let Some((parent, _)) = name.suffix.split_once('.') {
            name.parent_prefix = Some(parent.to_string());
        }

        name
    }
}
