//! Field label aliases and privacy-redaction markers for the text parser.

use std::collections::BTreeMap;

/// Canonical fields in resolution order, each with its exact-match aliases.
///
/// A key resolves to the first field whose spaced name it contains or
/// whose alias it equals, so the order below is the tie-break.
const DEFAULT_ALIASES: &[(&str, &[&str])] = &[
    ("domain_id", &["domain id", "registry domain id"]),
    ("domain_name", &["domain name", "domain"]),
    ("domain_status", &["domain status", "status"]),
    ("domain_dnssec", &["dnssec"]),
    ("whois_server", &["whois server", "registrar whois server"]),
    (
        "name_servers",
        &["name server", "nserver", "nameserver", "nameservers", "name servers"],
    ),
    (
        "created_date",
        &[
            "creation date",
            "created on",
            "created",
            "registration date",
            "create date",
            "record created",
            "registration time",
        ],
    ),
    (
        "updated_date",
        &[
            "last update",
            "updated date",
            "updated on",
            "last modified",
            "changed",
            "update date",
            "last updated",
            "modified",
        ],
    ),
    (
        "expired_date",
        &[
            "expiration date",
            "expire date",
            "expiry date",
            "renewal date",
            "expires on",
            "registry expiry date",
            "registrar registration expiration date",
            "paid till",
            "record expires",
            "expiration time",
        ],
    ),
    ("transfer_date", &["transfer date", "last transferred"]),
    ("referral_url", &["referral url"]),
    ("registrar_name", &["registrar", "sponsoring registrar"]),
    ("registrar_url", &["registrar url", "registrar website"]),
    ("registrar_iana_id", &["registrar iana id"]),
    (
        "registrar_abuse_contact_email",
        &["registrar abuse contact email"],
    ),
    (
        "registrar_abuse_contact_phone",
        &["registrar abuse contact phone"],
    ),
];

/// Values containing any of these (case-insensitive) are redaction notices.
const DEFAULT_PROTECTED_WORDS: &[&str] = &[
    "REDACTED FOR PRIVACY",
    "GDPR masked",
    "is not disclosed",
    "Privacy Protection",
    "REDACTED",
    "DATA REDACTED",
    "PRIVACY",
    "Contact Privacy Inc",
    "Protected by",
    "Whois Privacy",
    "Information not available",
    "private",
    "TO BE DISCLOSED",
    "Not disclosed",
    "Registration information",
    "Contact data has been withdrawn",
    "Personal data not displayed",
];

/// Placeholder some gTLD registries print instead of contact data.
const RDDS_PLACEHOLDER: &str = "Please query the RDDS service of the Registrar";

#[derive(Debug, Clone)]
struct AliasEntry {
    canonical: String,
    /// `canonical` with underscores spelled as spaces
    spaced: String,
    aliases: Vec<String>,
}

/// Maps raw WHOIS labels to canonical field names.
///
/// Read-only after construction; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct KeyAliasTable {
    entries: Vec<AliasEntry>,
}

impl Default for KeyAliasTable {
    fn default() -> Self {
        let entries = DEFAULT_ALIASES
            .iter()
            .map(|(canonical, aliases)| AliasEntry {
                canonical: canonical.to_string(),
                spaced: canonical.replace('_', " "),
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
            })
            .collect();
        Self { entries }
    }
}

impl KeyAliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the table with configured aliases.
    ///
    /// Aliases for a known canonical field are appended to it; unknown
    /// canonical names are added at the end of the resolution order.
    pub fn with_extra_aliases(mut self, extra: &BTreeMap<String, Vec<String>>) -> Self {
        for (canonical, aliases) in extra {
            let canonical = canonical.trim().to_lowercase();
            if canonical.is_empty() {
                continue;
            }
            let aliases: Vec<String> = aliases
                .iter()
                .map(|a| clean_key(a))
                .filter(|a| !a.is_empty())
                .collect();

            match self.entries.iter_mut().find(|e| e.canonical == canonical) {
                Some(entry) => {
                    for alias in aliases {
                        if !entry.aliases.contains(&alias) {
                            entry.aliases.push(alias);
                        }
                    }
                }
                None => self.entries.push(AliasEntry {
                    spaced: canonical.replace('_', " "),
                    canonical,
                    aliases,
                }),
            }
        }
        self
    }

    /// Canonical field for an already cleaned key, if any.
    pub fn resolve(&self, key: &str) -> Option<&str> {
        if key.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|entry| key.contains(entry.spaced.as_str()) || entry.aliases.iter().any(|a| a == key))
            .map(|entry| entry.canonical.as_str())
    }
}

/// Privacy-redaction markers; values containing one are discarded.
#[derive(Debug, Clone)]
pub struct ProtectedWords {
    /// Lowercased markers
    words: Vec<String>,
}

impl Default for ProtectedWords {
    fn default() -> Self {
        Self::from_words(DEFAULT_PROTECTED_WORDS.iter().copied())
    }
}

impl ProtectedWords {
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Vec::new();
        for word in words {
            let word = word.as_ref().trim().to_lowercase();
            if !word.is_empty() && !list.contains(&word) {
                list.push(word);
            }
        }
        Self { words: list }
    }

    /// Built-in markers plus `extra`.
    pub fn with_extra<I, S>(self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let combined: Vec<String> = self
            .words
            .into_iter()
            .chain(extra.into_iter().map(|w| w.as_ref().to_string()))
            .collect();
        Self::from_words(combined)
    }

    /// Whether `value` is a redaction notice rather than data.
    pub fn is_protected(&self, value: &str) -> bool {
        if value.contains(RDDS_PLACEHOLDER) {
            return true;
        }
        let lower = value.to_lowercase();
        self.words.iter().any(|word| lower.contains(word.as_str()))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Normalize a raw WHOIS label for alias resolution.
///
/// Drops parenthetical text, turns `-_/\'.` into spaces, collapses
/// whitespace, strips a leading "Registry "/"Sponsoring " and lowercases.
pub fn clean_key(raw: &str) -> String {
    let key = match raw.find('(') {
        Some(idx) => &raw[..idx],
        None => raw,
    };

    let replaced: String = key
        .chars()
        .map(|c| match c {
            '-' | '_' | '/' | '\\' | '\'' | '.' => ' ',
            other => other,
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let lower = collapsed.to_lowercase();

    for prefix in ["registry ", "sponsoring "] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            return rest.trim().to_string();
        }
    }
    lower
}
