//! Heuristic parser for plaintext WHOIS responses.

use super::aliases::{clean_key, KeyAliasTable, ProtectedWords};
use super::prehandle::PrehandleRegistry;
use super::{push_unique, strip_status_url, ParseContext, ParseHandler, ParserKind};
use crate::dates::DateNormalizer;
use crate::types::{DateField, FormattedWhois, ParsedRecord, TimezoneHint};
use std::sync::Arc;
use tracing::debug;

/// Lines shorter than this cannot hold a `key: value` pair worth reading.
const MIN_LINE_LEN: usize = 5;

/// Phrases meaning the queried name is not registered.
const NOT_FOUND_PHRASES: &[&str] = &[
    "No match for",
    "Status: AVAILABLE",
    "not found",
    "no match",
    "No entries found",
    "no data found",
    "not registered",
    "Domain not found",
    "domain does not exist",
    "domain doesn't exist",
    "The queried object does not exist",
    "is available",
    "is free",
    "No Object Found",
    "Domain name not known",
    "Status: free",
    "Status: available",
    "The domain you requested is not registered",
];

/// Phrases meaning the name is withheld from registration.
const RESERVED_PHRASES: &[&str] = &[
    "Reserved Domain Name",
    "ICANN Reserved Name",
    "This name is reserved by the Registry",
    "has been reserved by aeDA Regulator",
    "Reserved:",
    "It has been reserved",
    "This domain name has been reserved for policy reasons",
    "This name is registry reserved",
    "Reserved by Registry Operator",
    "Domain name is invalid",
    "This name is not available for registration",
    "the Domain Name you apply can not be registered online",
    "Registry Reserved",
    "This domain has been reserved by the registry",
    "status: Blocked",
    "This is an ICANN reserved name",
    "Status: RESERVED",
    "Reserved Name and is not available",
    "Prohibited String - Object Cannot Be Registered",
    "domaintype: RESERVED",
    "This name is invalid and can not be registered",
    "Prohibited String",
];

/// Generic `key: value` WHOIS parser.
///
/// Classification runs first ("not found" or reserved responses skip
/// field extraction), then the TLD's rewrite strategy, then line-by-line
/// extraction with alias resolution and redaction filtering.
#[derive(Debug, Clone)]
pub struct TextParser {
    aliases: Arc<KeyAliasTable>,
    protected: Arc<ProtectedWords>,
    prehandlers: Arc<PrehandleRegistry>,
    dates: Arc<DateNormalizer>,
}

impl Default for TextParser {
    fn default() -> Self {
        Self::new(
            Arc::new(KeyAliasTable::default()),
            Arc::new(ProtectedWords::default()),
            Arc::new(PrehandleRegistry::builtin()),
            Arc::new(DateNormalizer::new()),
        )
    }
}

impl TextParser {
    pub fn new(
        aliases: Arc<KeyAliasTable>,
        protected: Arc<ProtectedWords>,
        prehandlers: Arc<PrehandleRegistry>,
        dates: Arc<DateNormalizer>,
    ) -> Self {
        Self {
            aliases,
            protected,
            prehandlers,
            dates,
        }
    }

    fn is_not_found(&self, raw: &str, ctx: &ParseContext<'_>) -> bool {
        let lower = raw.to_lowercase();
        let builtin = NOT_FOUND_PHRASES
            .iter()
            .any(|phrase| lower.contains(&phrase.to_lowercase()));
        if builtin {
            return true;
        }

        let configured = ctx
            .availability_patterns()
            .iter()
            .filter(|p| !p.trim().is_empty())
            .any(|p| lower.contains(&p.to_lowercase()));
        if configured {
            return true;
        }

        self.prehandlers
            .get(ctx.tld)
            .map(|strategy| strategy.signals_available(raw))
            .unwrap_or(false)
    }

    fn is_reserved(&self, raw: &str, ctx: &ParseContext<'_>) -> bool {
        let lower = raw.to_lowercase();
        if RESERVED_PHRASES
            .iter()
            .any(|phrase| lower.contains(&phrase.to_lowercase()))
        {
            return true;
        }
        ctx.reserved_hint()
            .map(|hint| lower.contains(&hint.to_lowercase()))
            .unwrap_or(false)
    }

    fn date_field(&self, value: &str, timezone: Option<&TimezoneHint>) -> DateField {
        let cleaned = value.replace(" CLST", "");
        DateField {
            raw: value.to_string(),
            utc: self.dates.format_date(cleaned.trim(), timezone),
        }
    }

    /// Parse one line into `formatted`. Returns whether a field was stored.
    fn extract_line(
        &self,
        line: &str,
        formatted: &mut FormattedWhois,
        timezone: Option<&TimezoneHint>,
    ) -> bool {
        let line = line.trim();
        if line.chars().count() < MIN_LINE_LEN || !line.contains(':') || line.ends_with(':') {
            return false;
        }

        let (raw_key, raw_value) = match line.split_once(':') {
            Some(pair) => pair,
            None => return false,
        };
        let key = clean_key(raw_key);
        let value = raw_value.replace("&nbsp;", "");
        let value = value.trim();
        let canonical = self.aliases.resolve(&key);

        if value.is_empty() || self.protected.is_protected(value) {
            return false;
        }
        let email_like = key.replace(' ', "").contains("email")
            || canonical.map(|c| c.contains("email")).unwrap_or(false);
        if email_like && !value.contains('@') {
            return false;
        }

        match canonical {
            Some("domain_id") => formatted.domain.id = Some(value.to_string()),
            Some("domain_name") => formatted.domain.name = Some(value.to_lowercase()),
            Some("domain_status") => {
                for status in value.split(',') {
                    if let Some(status) = camel_case_status(status) {
                        push_unique(&mut formatted.domain.status, status);
                    }
                }
            }
            Some("domain_dnssec") => formatted.domain.dnssec = Some(is_dnssec_signed(value)),
            Some("name_servers") => {
                for server in value.split(',') {
                    push_unique(&mut formatted.domain.name_servers, server.trim().to_lowercase());
                }
            }
            Some("created_date") => formatted.domain.created = Some(self.date_field(value, timezone)),
            Some("updated_date") => formatted.domain.updated = Some(self.date_field(value, timezone)),
            Some("expired_date") => formatted.domain.expired = Some(self.date_field(value, timezone)),
            Some("transfer_date") => formatted.domain.transfer = Some(self.date_field(value, timezone)),
            Some("whois_server") => formatted.registrar.set("whois_server", value),
            Some("referral_url") => formatted.registrar.set("referral_url", value),
            Some("registrar_name") => formatted.registrar.set("name", value),
            Some("registrar_url") => formatted.registrar.set("url", value),
            Some("registrar_iana_id") => formatted.registrar.set("iana_id", value),
            Some("registrar_abuse_contact_email") => formatted.registrar.set("abuse_email", value),
            Some("registrar_abuse_contact_phone") => formatted.registrar.set("abuse_phone", value),
            Some(other) => match other.strip_prefix("registrar_") {
                Some(field) => formatted.registrar.set(field, value),
                None => {
                    formatted.domain.extra.insert(other.to_string(), value.to_string());
                }
            },
            None => return route_contact(&key, value, formatted),
        }
        true
    }
}

/// Route a scoped contact line ("admin email: ...") into its block.
fn route_contact(key: &str, value: &str, formatted: &mut FormattedWhois) -> bool {
    let (scope, rest) = match key.split_once(' ') {
        Some((scope, rest)) => (scope, rest),
        None => (key, ""),
    };

    let block = match scope {
        "registrant" | "holder" | "owner" => &mut formatted.registrant,
        "admin" | "administrative" => &mut formatted.administrative,
        "tech" | "technical" => &mut formatted.technical,
        "bill" | "billing" => &mut formatted.billing,
        _ => return false,
    };

    let field: String = rest.chars().filter(|c| *c != ' ').collect();
    let field = match field.as_str() {
        "" | "name" => "organization".to_string(),
        "emailaddress" => "email".to_string(),
        _ => field,
    };
    block.set(field, value);
    true
}

/// Reformat an EPP status to lower camel case, dropping any explanation URL.
///
/// Already camel-cased words keep their inner capitals; all-caps words are
/// lowercased first.
fn camel_case_status(raw: &str) -> Option<String> {
    let head = strip_status_url(raw);
    if head.is_empty() {
        return None;
    }

    let mut joined = String::new();
    for word in head.split_whitespace() {
        let has_lower = word.chars().any(|c| c.is_lowercase());
        let word = if has_lower {
            word.to_string()
        } else {
            word.to_lowercase()
        };
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            joined.extend(first.to_uppercase());
            joined.push_str(chars.as_str());
        }
    }

    let mut chars = joined.chars();
    let first = chars.next()?;
    Some(first.to_lowercase().chain(chars).collect())
}

/// Whether a WHOIS DNSSEC value means the zone is signed.
fn is_dnssec_signed(value: &str) -> bool {
    let mut cleaned = value.to_string();
    for noise in ["CLST", "Connected", "(GMT+0:00)", "(", ")"] {
        cleaned = cleaned.replace(noise, "");
    }
    let cleaned = cleaned.trim().to_lowercase();
    matches!(
        cleaned.as_str(),
        "signeddelegations" | "signeddelegation" | "signed" | "yes" | "true"
    )
}

impl ParseHandler for TextParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Text
    }

    fn parse(&self, domain: &str, raw: &str, ctx: &ParseContext<'_>) -> ParsedRecord {
        let mut record = ParsedRecord::new(domain, ctx.tld).with_raw_text(raw);

        if raw.trim().is_empty() {
            record.parse_success = false;
            record.error = Some("Empty WHOIS response".to_string());
            return record;
        }

        if self.is_not_found(raw, ctx) {
            debug!(domain, "WHOIS response signals an unregistered domain");
            record.is_available = true;
            return record;
        }

        if self.is_reserved(raw, ctx) {
            debug!(domain, "WHOIS response signals a reserved domain");
            record.is_reserved = true;
            return record;
        }

        let text = self.prehandlers.apply(ctx.tld, raw);
        let timezone = ctx.timezone();

        let mut stored = 0usize;
        for line in text.lines() {
            if self.extract_line(line, &mut record.formatted, timezone) {
                stored += 1;
            }
        }

        if stored == 0 {
            record.parse_success = false;
            record.error = Some("No recognizable WHOIS fields in response".to_string());
        }
        debug!(domain, fields = stored, "parsed WHOIS text");
        record
    }
}
