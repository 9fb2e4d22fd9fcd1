//! Per-TLD rewrite strategies applied before generic text parsing.
//!
//! Some registries print sectioned contact blocks, translated labels or
//! bracketed keys. A strategy reshapes such output into plain
//! `[scope ]key: value` lines so the generic parser can read it, and may
//! contribute registry specific "not found" phrases.

use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// Rewrites a raw response into generic `key: value` lines.
pub type RewriteFn = fn(&str) -> String;

lazy_static::lazy_static! {
    static ref CJK_RUN: Regex = Regex::new(r"[\x{4e00}-\x{9fa5}]+").unwrap();
    static ref EXCESS_NEWLINES: Regex = Regex::new(r"\n{3,}").unwrap();
    static ref IO_PURCHASE: Regex = Regex::new(r"is available for purchase.*\n?").unwrap();
    static ref IO_BUY_LINK: Regex = Regex::new(r"Click here to buy.*\n?").unwrap();
    static ref DOT_LEADERS: Regex = Regex::new(r"\.{2,}").unwrap();
}

/// How one registry's output is handled before parsing.
#[derive(Debug, Clone, Default)]
pub struct TldStrategy {
    /// Extra phrases meaning the domain is unregistered
    pub availability_phrases: Vec<String>,
    /// Text rewrite, `None` to pass the response through unchanged
    pub rewrite: Option<RewriteFn>,
}

impl TldStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_phrases(mut self, phrases: &[&str]) -> Self {
        self.availability_phrases
            .extend(phrases.iter().map(|p| p.to_string()));
        self
    }

    pub fn with_rewrite(mut self, rewrite: RewriteFn) -> Self {
        self.rewrite = Some(rewrite);
        self
    }

    /// Apply the rewrite, if any.
    pub fn apply(&self, raw: &str) -> String {
        match self.rewrite {
            Some(rewrite) => rewrite(raw),
            None => raw.to_string(),
        }
    }

    /// Whether `raw` contains one of this registry's "not found" phrases.
    pub fn signals_available(&self, raw: &str) -> bool {
        let lower = raw.to_lowercase();
        self.availability_phrases
            .iter()
            .any(|phrase| lower.contains(&phrase.to_lowercase()))
    }
}

/// Strategy map keyed by suffix.
///
/// Lookup tries the exact suffix, then drops leading labels one at a time
/// ("com.cn" falls back to "cn").
#[derive(Debug, Clone, Default)]
pub struct PrehandleRegistry {
    strategies: HashMap<String, Arc<TldStrategy>>,
}

impl PrehandleRegistry {
    /// Registry without any strategies; every response passes through.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in strategies.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();

        let no_match_domain = TldStrategy::new().with_phrases(&["No match for domain"]);
        for tld in ["com", "net", "org"] {
            registry.register(tld, no_match_domain.clone());
        }

        let uk = TldStrategy::new()
            .with_phrases(&["No match for", "This domain name has not been registered"])
            .with_rewrite(rewrite_uk);
        for tld in ["uk", "co.uk", "org.uk", "me.uk"] {
            registry.register(tld, uk.clone());
        }

        registry.register(
            "cn",
            TldStrategy::new()
                .with_phrases(&[
                    "No matching record.",
                    "The domain you want to register is available",
                ])
                .with_rewrite(rewrite_cn),
        );
        registry.register(
            "jp",
            TldStrategy::new()
                .with_phrases(&["No match!!", "No match for"])
                .with_rewrite(rewrite_jp),
        );
        registry.register(
            "ru",
            TldStrategy::new().with_phrases(&["No entries found", "No information"]),
        );
        registry.register(
            "eu",
            TldStrategy::new()
                .with_phrases(&["Status: AVAILABLE", "not found"])
                .with_rewrite(rewrite_eu),
        );
        registry.register(
            "cc",
            TldStrategy::new().with_phrases(&["No match for", "Domain not found"]),
        );
        registry.register(
            "io",
            TldStrategy::new()
                .with_phrases(&["is available for purchase"])
                .with_rewrite(rewrite_io),
        );
        registry.register(
            "br",
            TldStrategy::new().with_phrases(&["No match for", "No objects found"]),
        );

        registry.register("it", TldStrategy::new().with_rewrite(rewrite_it));
        registry.register("am", TldStrategy::new().with_rewrite(rewrite_am));
        registry.register("nl", TldStrategy::new().with_rewrite(rewrite_nl));
        registry.register("ar", TldStrategy::new().with_rewrite(rewrite_ar));
        registry.register("sa", TldStrategy::new().with_rewrite(rewrite_sa));
        registry.register("be", TldStrategy::new().with_rewrite(rewrite_be));
        registry.register("kz", TldStrategy::new().with_rewrite(rewrite_kz));
        registry.register("at", TldStrategy::new().with_rewrite(rewrite_at));
        registry.register("bo", TldStrategy::new().with_rewrite(rewrite_bo));
        registry.register("sg", TldStrategy::new().with_rewrite(rewrite_sg));

        registry
    }

    /// Add or replace the strategy for `tld`.
    pub fn register<T: AsRef<str>>(&mut self, tld: T, strategy: TldStrategy) {
        let tld = tld.as_ref().trim().trim_start_matches('.').to_lowercase();
        self.strategies.insert(tld, Arc::new(strategy));
    }

    /// Strategy for `tld`, falling back through its parent suffixes.
    pub fn get(&self, tld: &str) -> Option<Arc<TldStrategy>> {
        let mut candidate = tld.trim().trim_start_matches('.').to_lowercase();
        loop {
            if let Some(strategy) = self.strategies.get(&candidate) {
                return Some(strategy.clone());
            }
            match candidate.split_once('.') {
                Some((_, parent)) => candidate = parent.to_string(),
                None => return None,
            }
        }
    }

    /// Rewrite `raw` with the strategy for `tld`; unchanged without one.
    pub fn apply(&self, tld: &str, raw: &str) -> String {
        match self.get(tld) {
            Some(strategy) => strategy.apply(raw),
            None => raw.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Prefix lines inside known sections with the section's scope.
///
/// A line equal to a section header (or, in `prefix_mode`, starting with
/// one) switches the current scope; a blank line clears it. In normal mode
/// the header line itself is dropped.
fn rewrite_sections(text: &str, sections: &[(&str, &str)], prefix_mode: bool) -> String {
    let mut result = Vec::new();
    let mut scope: Option<&str> = None;

    for line in text.split('\n') {
        let trimmed = line.trim();

        if prefix_mode {
            for (header, replacement) in sections {
                if trimmed.starts_with(*header) {
                    scope = Some(*replacement);
                }
            }
        } else if let Some((_, replacement)) = sections.iter().find(|(header, _)| *header == trimmed)
        {
            scope = Some(*replacement);
            continue;
        }

        if trimmed.is_empty() {
            scope = None;
        }

        match scope {
            Some(prefix) if !trimmed.is_empty() => result.push(format!("{} {}", prefix, line)),
            _ => result.push(line.to_string()),
        }
    }

    result.join("\n")
}

/// Split on blank lines and prefix each non-blank line of a numbered part.
fn rewrite_parts(text: &str, prefix_for: impl Fn(usize, &str) -> Option<&'static str>) -> String {
    let mut part = 0;
    let mut result = Vec::new();

    for line in text.trim().split('\n') {
        if line.trim().is_empty() {
            part += 1;
            result.push(line.to_string());
            continue;
        }
        match prefix_for(part, line) {
            Some(prefix) => result.push(format!("{} {}", prefix, line)),
            None => result.push(line.to_string()),
        }
    }

    result.join("\n")
}

fn rewrite_it(raw: &str) -> String {
    rewrite_sections(
        raw,
        &[
            ("Registrant", "Registrant"),
            ("Admin Contact", "Admin"),
            ("Technical Contacts", "Technical"),
            ("Registrar", "Registrar"),
            ("Nameservers", "Nameservers:"),
        ],
        false,
    )
}

/// .am prints contacts as bare positional lines under a group header.
fn rewrite_am(raw: &str) -> String {
    const GROUPS: &[(&str, &str)] = &[
        ("Registrant:", "Registrant:"),
        ("Administrative contact:", "Admin:"),
        ("Technical contact:", "Technical:"),
        ("DNS servers:", "DNS servers:"),
    ];
    const POSITIONS: &[&str] = &["Name", "Address", "State", "Country", "Email", "Phone"];

    let mut result = Vec::new();
    let mut group: Option<&str> = None;
    let mut position = 0usize;

    for line in raw.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            group = None;
            result.push(String::new());
            continue;
        }

        if let Some((_, name)) = GROUPS.iter().find(|(header, _)| *header == trimmed) {
            group = Some(*name);
            position = 0;
            result.push(name.to_string());
            continue;
        }

        match group {
            Some("DNS servers:") => result.push(trimmed.to_string()),
            Some(_) => {
                if let Some(label) = POSITIONS.get(position) {
                    result.push(format!("{}:{}", label, trimmed));
                }
                position += 1;
            }
            None => result.push(trimmed.to_string()),
        }
    }

    rewrite_sections(
        &result.join("\n"),
        &[
            ("DNS servers:", "Name servers:"),
            ("Admin:", "Admin"),
            ("Technical:", "Technical"),
            ("Registrant:", "Registrant"),
        ],
        true,
    )
}

fn rewrite_uk(raw: &str) -> String {
    rewrite_sections(
        raw,
        &[
            ("Registrant:", "Registrant:"),
            ("Registrar:", "Registrar:"),
            ("Name servers:", "Name Servers:"),
            ("Name servers", "Name Servers:"),
        ],
        false,
    )
}

fn rewrite_eu(raw: &str) -> String {
    rewrite_sections(
        raw,
        &[
            ("Registrant:", "Registrant:"),
            ("Technical:", "Technical:"),
            ("Registrar:", "Registrar:"),
            ("Technical contact:", "Technical"),
            ("Name servers:", "Name servers:"),
        ],
        false,
    )
}

/// .nl prints the registrar name on the line after a bare "Registrar:".
fn rewrite_nl(raw: &str) -> String {
    let mut result = Vec::new();
    let mut after_registrar: Option<usize> = None;

    for line in raw.split('\n') {
        if line.starts_with("Registrar:") {
            after_registrar = Some(0);
            result.push(line.to_string());
            continue;
        }
        match after_registrar.as_mut() {
            Some(count) => {
                *count += 1;
                if *count == 1 && !line.trim().is_empty() {
                    result.push(format!("Registrar name: {}", line.trim()));
                } else {
                    result.push(line.to_string());
                }
            }
            None => result.push(line.to_string()),
        }
    }

    rewrite_sections(
        &result.join("\n"),
        &[("Domain nameservers:", "Nameservers:")],
        false,
    )
}

fn rewrite_ar(raw: &str) -> String {
    rewrite_parts(raw, |part, line| match part {
        1 => Some("domain"),
        2 => Some("registrant"),
        3 if line.contains("created") => Some("nserver"),
        _ => None,
    })
}

fn rewrite_at(raw: &str) -> String {
    rewrite_parts(raw, |part, _| if part == 2 { Some("registrant") } else { None })
}

fn rewrite_sa(raw: &str) -> String {
    rewrite_sections(raw, &[("Name Servers:", "Nameservers:")], false)
}

fn rewrite_be(raw: &str) -> String {
    rewrite_sections(
        raw,
        &[("Registrar:", "Registrar"), ("Nameservers:", "Nameservers:")],
        false,
    )
}

/// .kz pads labels with dot leaders ("Domain name..........: x").
fn rewrite_kz(raw: &str) -> String {
    let cleaned = DOT_LEADERS.replace_all(raw, "");
    let cleaned = cleaned
        .replace(".:", ":")
        .replace("Current Registar", "Registar Name");

    rewrite_sections(
        &cleaned,
        &[
            ("Organization Using Domain Name", "registrant"),
            ("Administrative Contact/Agent", "Administrative"),
        ],
        false,
    )
}

/// .bo labels are in Spanish.
fn rewrite_bo(raw: &str) -> String {
    const LABELS: &[(&str, &str)] = &[
        ("Nombre Completo", "Name"),
        ("Correo electrónico", "Email"),
        ("País", "Country"),
        ("Ciudad", "City"),
        ("Dirección", "Street"),
        ("Teléfono", "Phone"),
        ("Fecha de activación", "Create Date"),
        ("Fecha de corte", "Expire Date"),
    ];

    let mut text = raw.to_string();
    for (spanish, english) in LABELS {
        text = text.replace(spanish, english);
    }

    rewrite_sections(
        &text,
        &[
            ("CONTACTO ADMINISTRATIVO", "Admin"),
            ("CONTACTO TECNICO", "Technical"),
            ("CONTACTO FINANCIERO", "Bill"),
            ("TITULAR DEL DOMINIO", "Registrant"),
        ],
        false,
    )
}

fn rewrite_sg(raw: &str) -> String {
    let compact = raw
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    rewrite_sections(
        &compact,
        &[
            ("Technical Contact:", "Registrant"),
            ("Name Servers:", "Name Servers"),
        ],
        false,
    )
}

/// .jp uses bracketed Japanese labels.
fn rewrite_jp(raw: &str) -> String {
    const LABELS: &[(&str, &str)] = &[
        ("[登録年月日]", "create date:"),
        ("[有効期限]", "Expire date:"),
        ("[状態]", "status:"),
        ("[最終更新] ", "update date:"),
        ("[名前]", "Registrant Name:"),
        ("[Email]", "Email:"),
        ("[郵便番号]", "registrant zipcode:"),
        ("[住所]", "registrant address:"),
        ("[電話番号]", "registrant phone:"),
    ];

    let mut text = raw.to_string();
    for (label, key) in LABELS {
        text = text.replace(label, key);
    }
    text
}

/// .cn mixes Chinese captions into English labels.
fn rewrite_cn(raw: &str) -> String {
    let text = CJK_RUN.replace_all(raw, "");
    let text = text.replace("\r\n", "\n");
    EXCESS_NEWLINES.replace_all(&text, "\n\n").into_owned()
}

/// .io appends sales copy that would otherwise look like data.
fn rewrite_io(raw: &str) -> String {
    let text = IO_PURCHASE.replace_all(raw, "");
    IO_BUY_LINK.replace_all(&text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squash(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_lookup_falls_back_to_parent_suffix() {
        let registry = PrehandleRegistry::builtin();
        assert!(registry.get("co.uk").is_some());
        assert!(registry.get("ltd.uk").is_some());
        assert!(registry.get("com.cn").is_some());
        assert!(registry.get(".IT").is_some());
        assert!(registry.get("de").is_none());
        assert_eq!(registry.apply("de", "Domain: x.de"), "Domain: x.de");
    }

    #[test]
    fn test_registered_strategy_overrides_builtin() {
        fn shout(raw: &str) -> String {
            raw.to_uppercase()
        }
        let mut registry = PrehandleRegistry::builtin();
        registry.register("it", TldStrategy::new().with_rewrite(shout));
        assert_eq!(registry.apply("it", "abc"), "ABC");
    }

    #[test]
    fn test_section_rewrite_prefixes_scope() {
        let raw = "Domain: example.it\n\nRegistrant\n  Organization: Example Srl\n  Address: Roma\n\nNameservers\n  ns1.example.it\n  ns2.example.it\n";
        let out = rewrite_it(raw);
        assert!(squash(&out).contains("Registrant Organization: Example Srl"));
        assert!(squash(&out).contains("Nameservers: ns1.example.it"));
        assert!(!out.lines().any(|l| l.trim() == "Registrant"));
    }

    #[test]
    fn test_uk_sections() {
        let raw = "    Registrant:\n        Example Ltd\n\n    Name servers:\n        ns1.example.co.uk\n";
        let out = rewrite_uk(raw);
        assert!(squash(&out).contains("Registrant: Example Ltd"));
        assert!(squash(&out).contains("Name Servers: ns1.example.co.uk"));
    }

    #[test]
    fn test_am_positional_contacts() {
        let raw = "Registrant:\n   Example LLC\n   Yerevan\n   AM\n\nDNS servers:\n   ns1.example.am\n";
        let out = rewrite_am(raw);
        assert!(out.contains("Registrant Name:Example LLC"));
        assert!(out.contains("Registrant Address:Yerevan"));
        assert!(out.contains("Name servers: ns1.example.am"));
    }

    #[test]
    fn test_nl_registrar_line() {
        let raw = "Registrar:\n   Example BV\n   Street 1\n\nDomain nameservers:\n   ns1.example.nl\n";
        let out = rewrite_nl(raw);
        assert!(out.contains("Registrar name: Example BV"));
        assert!(squash(&out).contains("Nameservers: ns1.example.nl"));
    }

    #[test]
    fn test_ar_parts() {
        let raw = "header\n\nname: example.com.ar\n\nname: Someone\n\nnserver created: 2020\n";
        let out = rewrite_ar(raw);
        assert!(out.contains("domain name: example.com.ar"));
        assert!(out.contains("registrant name: Someone"));
    }

    #[test]
    fn test_kz_dot_leaders() {
        let out = rewrite_kz("Domain name..........: example.kz\nCurrent Registar:....: REG\n");
        assert!(out.contains("Domain name: example.kz"));
        assert!(out.contains("Registar Name:: REG") || out.contains("Registar Name: REG"));
    }

    #[test]
    fn test_bo_translates_labels() {
        let out = rewrite_bo("TITULAR DEL DOMINIO\nNombre Completo: Juan\nFecha de corte: 2030-01-01\n");
        assert!(out.contains("Registrant Name: Juan"));
        assert!(out.contains("Expire Date: 2030-01-01"));
    }

    #[test]
    fn test_jp_bracket_labels() {
        let out = rewrite_jp("[登録年月日]                   2001/01/01\n[状態]                         Connected (2030/01/31)\n");
        assert!(out.starts_with("create date:"));
        assert!(out.contains("status:"));
    }

    #[test]
    fn test_cn_strips_cjk_and_newlines() {
        let out = rewrite_cn("Domain Name: example.cn\r\n\r\n\r\n\r\nRegistrant: 北京Example\r\n");
        assert_eq!(out, "Domain Name: example.cn\n\nRegistrant: Example\n");
    }

    #[test]
    fn test_io_drops_sales_copy() {
        let out = rewrite_io(
            "Domain Name: x.io\nis available for purchase now\nClick here to buy it\nStatus: ok\n",
        );
        assert_eq!(out, "Domain Name: x.io\nStatus: ok\n");
    }

    #[test]
    fn test_strategy_phrases() {
        let registry = PrehandleRegistry::builtin();
        let ru = registry.get("ru").unwrap();
        assert!(ru.signals_available("no entries found for the selected source"));
        assert!(!ru.signals_available("domain: EXAMPLE.RU"));
    }
}
