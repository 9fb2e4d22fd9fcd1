//! Response parsers.
//!
//! Every parser turns a raw payload into the same [`ParsedRecord`] shape.
//! Plaintext WHOIS goes through [`TextParser`]; RDAP JSON goes through
//! [`RdapParser`]. Parsers never fail: problems are reported through
//! `parse_success` and `error` on the returned record.

pub mod aliases;
pub mod prehandle;
pub mod rdap_json;
pub mod text;

pub use aliases::{clean_key, KeyAliasTable, ProtectedWords};
pub use prehandle::{PrehandleRegistry, TldStrategy};
pub use rdap_json::RdapParser;
pub use text::TextParser;

use crate::types::{ParsedRecord, TimezoneHint, TldRecord};

/// Which parser implementation produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    /// Heuristic key/value parser for plaintext WHOIS
    Text,
    /// RDAP JSON mapper
    RdapJson,
}

/// Per-call parse inputs besides the payload itself.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    /// Suffix of the queried domain ("co.uk")
    pub tld: &'a str,
    /// Registry record for the suffix, when the registry knows it
    pub record: Option<&'a TldRecord>,
}

impl<'a> ParseContext<'a> {
    pub fn new(tld: &'a str) -> Self {
        Self { tld, record: None }
    }

    pub fn with_record(mut self, record: &'a TldRecord) -> Self {
        self.record = Some(record);
        self
    }

    /// Timezone the registry prints naive dates in.
    pub fn timezone(&self) -> Option<&'a TimezoneHint> {
        self.record.and_then(|r| r.timezone.as_ref())
    }

    /// Registry specific "not found" phrases.
    pub fn availability_patterns(&self) -> &'a [String] {
        self.record
            .map(|r| r.availability_patterns.as_slice())
            .unwrap_or(&[])
    }

    pub fn reserved_hint(&self) -> Option<&'a str> {
        self.record
            .and_then(|r| r.reserved_hint.as_deref())
            .filter(|hint| !hint.trim().is_empty())
    }
}

/// Converts a raw payload into a normalized record.
pub trait ParseHandler: Send + Sync {
    fn kind(&self) -> ParserKind;

    /// Parse `raw` for `domain`. Never panics and never fails; degraded
    /// results carry `parse_success = false` and an error message.
    fn parse(&self, domain: &str, raw: &str, ctx: &ParseContext<'_>) -> ParsedRecord;
}

/// Drop a trailing ICANN explanation URL from an EPP status value.
///
/// `"clientTransferProhibited https://icann.org/epp#..."` becomes
/// `"clientTransferProhibited"`.
pub(crate) fn strip_status_url(status: &str) -> &str {
    let head = match status.find("http") {
        Some(idx) => &status[..idx],
        None => status,
    };
    head.trim_end_matches(|c: char| c.is_whitespace() || c == '(' || c == '-')
        .trim()
}

/// Append `value` unless an equal entry is already present.
pub(crate) fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_status_url() {
        assert_eq!(
            strip_status_url("clientTransferProhibited https://icann.org/epp#clientTransferProhibited"),
            "clientTransferProhibited"
        );
        assert_eq!(
            strip_status_url("ok (https://www.icann.org/epp#ok)"),
            "ok"
        );
        assert_eq!(strip_status_url("active"), "active");
    }

    #[test]
    fn test_context_reads_record() {
        let record = TldRecord::tcp("cn", "whois.cnnic.cn")
            .with_availability("No matching record")
            .with_reserved_hint("  ")
            .with_timezone(TimezoneHint::offset("+8"));
        let ctx = ParseContext::new("cn").with_record(&record);

        assert_eq!(ctx.availability_patterns(), ["No matching record".to_string()]);
        assert_eq!(ctx.reserved_hint(), None);
        assert_eq!(ctx.timezone().and_then(|tz| tz.offset_minutes()), Some(480));

        let bare = ParseContext::new("zz");
        assert!(bare.availability_patterns().is_empty());
        assert!(bare.timezone().is_none());
    }
}
