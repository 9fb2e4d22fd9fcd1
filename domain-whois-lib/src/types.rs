//! Core data types for WHOIS/RDAP lookups.
//!
//! This module defines the records that flow through the engine: the
//! extracted domain, the registry's per-TLD record, the raw query outcome,
//! and the normalized [`ParsedRecord`] handed back to callers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Status code of a record that was produced normally.
pub const STATUS_OK: u16 = 0;
/// Status code of a record whose lookup failed.
pub const STATUS_FAILED: u16 = 1;
/// Status code of a record for a TLD with no WHOIS service at all.
pub const STATUS_NO_SERVICE: u16 = 404;

/// Which query adapter serves a TLD.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum AdapterKind {
    /// Plaintext WHOIS over TCP port 43
    #[default]
    #[serde(rename = "tcp", alias = "whois")]
    Tcp,

    /// RDAP over HTTPS
    #[serde(rename = "rdap")]
    Rdap,

    /// Registry offers no lookup service
    #[serde(rename = "none")]
    None,
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterKind::Tcp => write!(f, "WHOIS"),
            AdapterKind::Rdap => write!(f, "RDAP"),
            AdapterKind::None => write!(f, "none"),
        }
    }
}

/// Timezone declared by a registry for the naive dates it prints.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TimezoneHint {
    /// IANA zone name, e.g. "Asia/Shanghai"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Fixed UTC offset in hours: "+8", "-5", "5.5" or "+05:30"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,

    /// strftime pattern tried before the built-in format list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl TimezoneHint {
    /// A hint with only a fixed offset, e.g. `TimezoneHint::offset("+8")`.
    pub fn offset<S: Into<String>>(offset: S) -> Self {
        Self {
            offset: Some(offset.into()),
            ..Self::default()
        }
    }

    /// A hint with only an IANA zone name.
    pub fn named<S: Into<String>>(name: S) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Parse the declared offset into minutes east of UTC.
    ///
    /// Accepts hour counts with optional sign and fraction ("+8", "-3.5")
    /// and clock-style offsets ("+05:30", "-0800"). Returns `None` for
    /// missing or malformed offsets.
    pub fn offset_minutes(&self) -> Option<i32> {
        self.offset.as_deref().and_then(crate::dates::parse_utc_offset)
    }
}

/// Read-only registry record describing how to query one TLD.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TldRecord {
    /// Suffix this record serves, without a leading dot ("com", "co.uk")
    pub tld: String,

    /// Adapter used for queries
    #[serde(default)]
    pub adapter: AdapterKind,

    /// WHOIS host (optionally `host:port`) or, when it starts with
    /// `http`, an explicit RDAP base URL
    #[serde(default)]
    pub host: String,

    /// TCP WHOIS host used when the RDAP adapter fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_host: Option<String>,

    /// Extra "not found" phrases for this registry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub availability_patterns: Vec<String>,

    /// Phrase marking a reserved name for this registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_hint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<TimezoneHint>,
}

impl TldRecord {
    /// Record served by TCP WHOIS at `host`.
    pub fn tcp<T: Into<String>, H: Into<String>>(tld: T, host: H) -> Self {
        Self {
            tld: tld.into(),
            adapter: AdapterKind::Tcp,
            host: host.into(),
            fallback_host: None,
            availability_patterns: Vec::new(),
            reserved_hint: None,
            timezone: None,
        }
    }

    /// Record served by RDAP; `base` may be empty to use discovery.
    pub fn rdap<T: Into<String>, B: Into<String>>(tld: T, base: B) -> Self {
        Self {
            adapter: AdapterKind::Rdap,
            ..Self::tcp(tld, base)
        }
    }

    /// Record for a TLD without any lookup service.
    pub fn none<T: Into<String>>(tld: T) -> Self {
        Self {
            adapter: AdapterKind::None,
            ..Self::tcp(tld, "")
        }
    }

    pub fn with_fallback_host<H: Into<String>>(mut self, host: H) -> Self {
        self.fallback_host = Some(host.into());
        self
    }

    /// Availability phrases, in the registry's `a|b|c` notation.
    pub fn with_availability<P: AsRef<str>>(mut self, patterns: P) -> Self {
        self.availability_patterns = patterns
            .as_ref()
            .split('|')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
        self
    }

    pub fn with_reserved_hint<R: Into<String>>(mut self, hint: R) -> Self {
        self.reserved_hint = Some(hint.into());
        self
    }

    pub fn with_timezone(mut self, timezone: TimezoneHint) -> Self {
        self.timezone = Some(timezone);
        self
    }

    /// Explicit RDAP base URL configured for this TLD, if any.
    pub fn rdap_override(&self) -> Option<&str> {
        let host = self.host.trim();
        if host.starts_with("http") {
            Some(host)
        } else {
            None
        }
    }

    /// TCP WHOIS host usable for this TLD, if any.
    ///
    /// The dedicated fallback host wins; otherwise a non-URL `host` is used.
    pub fn tcp_host(&self) -> Option<&str> {
        if let Some(host) = self.fallback_host.as_deref().filter(|h| !h.trim().is_empty()) {
            return Some(host.trim());
        }
        let host = self.host.trim();
        if host.is_empty() || host.starts_with("http") {
            None
        } else {
            Some(host)
        }
    }
}

/// A domain split against the known-suffix list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DomainName {
    /// Input exactly as received
    pub raw: String,

    /// Lowercase, scheme/path/query/port stripped
    pub normalized: String,

    /// Registrable label directly left of the suffix ("example")
    pub prefix: String,

    /// Matched public suffix ("co.uk"), empty when the input has no dot
    pub suffix: String,

    /// Everything left of the prefix ("www")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,

    /// First label of a multi-label suffix ("co" for "co.uk")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_prefix: Option<String>,
}

impl DomainName {
    /// The registrable name sent upstream: `prefix.suffix`.
    pub fn registrable(&self) -> String {
        if self.suffix.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}.{}", self.prefix, self.suffix)
        }
    }
}

/// Raw result of one query handler invocation. Always produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub domain: String,
    pub adapter: AdapterKind,

    /// Host or base URL that produced the payload (or was last tried)
    pub server: String,

    /// Upstream payload, or a descriptive failure envelope
    pub raw_payload: String,

    pub succeeded: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub elapsed_ms: u64,
}

impl QueryOutcome {
    pub fn success<D, S, P>(domain: D, adapter: AdapterKind, server: S, payload: P, elapsed: Duration) -> Self
    where
        D: Into<String>,
        S: Into<String>,
        P: Into<String>,
    {
        Self {
            domain: domain.into(),
            adapter,
            server: server.into(),
            raw_payload: payload.into(),
            succeeded: true,
            error: None,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// A failed query; `envelope` is the descriptive payload kept for callers.
    pub fn failure<D, S, P, E>(
        domain: D,
        adapter: AdapterKind,
        server: S,
        envelope: P,
        error: E,
        elapsed: Duration,
    ) -> Self
    where
        D: Into<String>,
        S: Into<String>,
        P: Into<String>,
        E: Into<String>,
    {
        Self {
            domain: domain.into(),
            adapter,
            server: server.into(),
            raw_payload: envelope.into(),
            succeeded: false,
            error: Some(error.into()),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// A date as printed by the registry plus its UTC normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DateField {
    pub raw: String,
    pub utc: String,
}

/// Domain-level part of a normalized record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DomainBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name_servers: Vec<String>,
    pub status: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dnssec: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired: Option<DateField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<DateField>,

    /// Registry specific long tail (RDAP notices, remarks, custom properties)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl DomainBlock {
    /// True when nothing beyond the defaults has been filled in.
    pub fn is_empty(&self) -> bool {
        *self == DomainBlock::default()
    }
}

/// Contact block: an ordered field map with typed accessors layered on top.
///
/// Registries disagree on contact schemas, so every field is kept under its
/// canonical name. The well-known fields (`name`, `organization`, `email`,
/// `phone`, `address`) have accessors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactBlock {
    /// Human readable section marker, always present
    pub key: String,

    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl ContactBlock {
    pub fn new<K: Into<String>>(key: K) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Set `field`, replacing any earlier value. Blank values are ignored.
    pub fn set<F: Into<String>, V: AsRef<str>>(&mut self, field: F, value: V) {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return;
        }
        let field = field.into();
        if field.is_empty() || field == "key" {
            return;
        }
        self.fields.insert(field, value.to_string());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name")
    }

    pub fn organization(&self) -> Option<&str> {
        self.get("organization")
    }

    pub fn email(&self) -> Option<&str> {
        self.get("email")
    }

    pub fn phone(&self) -> Option<&str> {
        self.get("phone")
    }

    pub fn address(&self) -> Option<&str> {
        self.get("address")
    }

    /// True when only the key marker is present.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The normalized registration data.
///
/// All five contact blocks are always present, each carrying its marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormattedWhois {
    pub key: String,
    pub domain: DomainBlock,
    pub registrar: ContactBlock,
    pub registrant: ContactBlock,
    pub administrative: ContactBlock,
    pub technical: ContactBlock,
    pub billing: ContactBlock,
}

impl Default for FormattedWhois {
    fn default() -> Self {
        Self {
            key: "WHOIS".to_string(),
            domain: DomainBlock::default(),
            registrar: ContactBlock::new("Registrar"),
            registrant: ContactBlock::new("Registrant"),
            administrative: ContactBlock::new("Administrative"),
            technical: ContactBlock::new("Technical"),
            billing: ContactBlock::new("Billing"),
        }
    }
}

/// Final, caller-facing result of a lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedRecord {
    pub domain_name: String,
    pub tld: String,
    pub is_available: bool,
    pub is_reserved: bool,
    pub parse_success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// `STATUS_OK`, `STATUS_FAILED` or `STATUS_NO_SERVICE`
    pub status_code: u16,

    /// Adapter whose payload produced this record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter: Option<AdapterKind>,

    pub formatted: FormattedWhois,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

impl ParsedRecord {
    /// An empty, successful record for `domain`.
    pub fn new<D: Into<String>, T: Into<String>>(domain: D, tld: T) -> Self {
        Self {
            domain_name: domain.into(),
            tld: tld.into(),
            is_available: false,
            is_reserved: false,
            parse_success: true,
            error: None,
            status_code: STATUS_OK,
            adapter: None,
            formatted: FormattedWhois::default(),
            raw_text: None,
        }
    }

    /// A failed record; never marks the domain available.
    pub fn failure<D: Into<String>, T: Into<String>, E: Into<String>>(
        domain: D,
        tld: T,
        error: E,
        status_code: u16,
    ) -> Self {
        Self {
            parse_success: false,
            error: Some(error.into()),
            status_code,
            ..Self::new(domain, tld)
        }
    }

    pub fn with_raw_text<R: Into<String>>(mut self, raw: R) -> Self {
        self.raw_text = Some(raw.into());
        self
    }
}

/// Runtime parameters for lookups.
///
/// Every retry count, timeout and backoff constant lives here so deployments
/// can tune them; the defaults are empirical.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// Maximum concurrent lookups in bulk operations
    /// Default: 10, Range: 1-100
    pub concurrency: usize,

    /// Delay before each bulk lookup starts, to stay under upstream rate limits
    /// Default: 0
    pub pacing: Duration,

    /// Connect+read budget for one TCP WHOIS exchange
    /// Default: 10 seconds
    pub whois_timeout: Duration,

    /// Port used for hosts without an explicit `:port`
    /// Default: 43
    pub whois_port: u16,

    /// Extra TCP attempts against alternate servers
    /// Default: 1
    pub whois_max_retries: u32,

    /// Pause before a TCP retry after an error
    /// Default: 500 ms
    pub whois_retry_delay: Duration,

    /// Budget for one RDAP HTTP request
    /// Default: 15 seconds
    pub rdap_timeout: Duration,

    /// Extra RDAP attempts after a failed request
    /// Default: 1
    pub rdap_max_retries: u32,

    /// Exponential backoff base and cap for RDAP retries
    /// Default: 1 s, capped at 5 s
    pub rdap_backoff_base: Duration,
    pub rdap_backoff_cap: Duration,

    /// Fall back to TCP WHOIS when the RDAP adapter fails
    /// Default: true
    pub rdap_tcp_fallback: bool,

    /// Consult the IANA bootstrap registry for RDAP servers
    /// Default: true
    pub enable_bootstrap: bool,

    pub bootstrap_url: String,

    /// Default: 24 hours
    pub bootstrap_ttl: Duration,

    /// Where the bootstrap snapshot is persisted, if anywhere
    pub bootstrap_cache_file: Option<PathBuf>,

    /// TTL for memoized records when a cache is attached
    /// Default: 1 hour
    pub cache_ttl: Duration,

    pub user_agent: String,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            pacing: Duration::ZERO,
            whois_timeout: Duration::from_secs(10),
            whois_port: 43,
            whois_max_retries: 1,
            whois_retry_delay: Duration::from_millis(500),
            rdap_timeout: Duration::from_secs(15),
            rdap_max_retries: 1,
            rdap_backoff_base: Duration::from_secs(1),
            rdap_backoff_cap: Duration::from_secs(5),
            rdap_tcp_fallback: true,
            enable_bootstrap: true,
            bootstrap_url: "https://data.iana.org/rdap/dns.json".to_string(),
            bootstrap_ttl: Duration::from_secs(24 * 3600),
            bootstrap_cache_file: None,
            cache_ttl: Duration::from_secs(3600),
            user_agent: format!("domain-whois/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl LookupConfig {
    /// Set bulk concurrency, capped at 100.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, 100);
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Set both the TCP and RDAP timeouts.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.whois_timeout = timeout;
        self.rdap_timeout = timeout;
        self
    }

    pub fn with_whois_timeout(mut self, timeout: Duration) -> Self {
        self.whois_timeout = timeout;
        self
    }

    pub fn with_rdap_timeout(mut self, timeout: Duration) -> Self {
        self.rdap_timeout = timeout;
        self
    }

    /// Set the retry budget of both handlers.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.whois_max_retries = retries;
        self.rdap_max_retries = retries;
        self
    }

    pub fn with_whois_retry_delay(mut self, delay: Duration) -> Self {
        self.whois_retry_delay = delay;
        self
    }

    pub fn with_rdap_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.rdap_backoff_base = base;
        self.rdap_backoff_cap = cap.max(base);
        self
    }

    pub fn with_tcp_fallback(mut self, enabled: bool) -> Self {
        self.rdap_tcp_fallback = enabled;
        self
    }

    pub fn with_bootstrap(mut self, enabled: bool) -> Self {
        self.enable_bootstrap = enabled;
        self
    }

    pub fn with_bootstrap_url<U: Into<String>>(mut self, url: U) -> Self {
        self.bootstrap_url = url.into();
        self
    }

    pub fn with_bootstrap_cache_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.bootstrap_cache_file = Some(path.into());
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Backoff before RDAP attempt number `attempt` (1-based retry count).
    pub fn rdap_backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.rdap_backoff_base.saturating_mul(1u32 << exp);
        delay.min(self.rdap_backoff_cap)
    }
}
