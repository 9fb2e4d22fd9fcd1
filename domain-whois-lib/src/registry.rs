//! TLD registry: how each suffix is queried.
//!
//! The engine only reads from the registry. Deployments back it with their
//! own store by implementing [`TldRegistry`]; [`StaticTldRegistry`] covers
//! the built-in table and TOML files.

use crate::error::WhoisError;
use crate::types::{AdapterKind, TimezoneHint, TldRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Read-only lookup of per-TLD query settings.
pub trait TldRegistry: Send + Sync {
    /// Record for `tld` (no leading dot, lowercase), if the registry knows it.
    fn get_tld_info(&self, tld: &str) -> Option<TldRecord>;

    /// Every suffix the registry knows; feeds the TLD extractor.
    fn suffixes(&self) -> Vec<String>;
}

/// In-memory registry built from records.
#[derive(Debug, Clone, Default)]
pub struct StaticTldRegistry {
    records: HashMap<String, TldRecord>,
}

/// On-disk shape of a registry file: a list of `[[tld]]` tables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryFile {
    #[serde(default)]
    pub tld: Vec<TldRecord>,
}

impl StaticTldRegistry {
    /// Empty registry; every lookup misses.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<I: IntoIterator<Item = TldRecord>>(records: I) -> Self {
        let mut registry = Self::new();
        for record in records {
            registry.insert(record);
        }
        registry
    }

    /// Registry preloaded with the built-in table of common TLDs.
    pub fn builtin() -> Self {
        Self::from_records(builtin_records())
    }

    /// Load `[[tld]]` records from a TOML file.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, WhoisError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            WhoisError::file_error(
                path.to_string_lossy(),
                format!("Failed to read TLD registry: {}", e),
            )
        })?;

        let file: RegistryFile = toml::from_str(&content)?;
        validate_records(&file.tld)?;

        debug!(path = %path.display(), records = file.tld.len(), "loaded TLD registry file");
        Ok(Self::from_records(file.tld))
    }

    /// Insert or replace a record. The suffix is lowercased and stripped of dots.
    pub fn insert(&mut self, mut record: TldRecord) {
        record.tld = record.tld.trim().trim_matches('.').to_lowercase();
        self.records.insert(record.tld.clone(), record);
    }

    /// Overlay `other` on top of this registry; its records win.
    pub fn merge(mut self, other: StaticTldRegistry) -> Self {
        self.records.extend(other.records);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records sorted by suffix, for listing.
    pub fn records(&self) -> Vec<&TldRecord> {
        let mut records: Vec<&TldRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.tld.cmp(&b.tld));
        records
    }
}

impl TldRegistry for StaticTldRegistry {
    fn get_tld_info(&self, tld: &str) -> Option<TldRecord> {
        self.records.get(&tld.to_lowercase()).cloned()
    }

    fn suffixes(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }
}

/// Reject records that could never be queried.
pub fn validate_records(records: &[TldRecord]) -> Result<(), WhoisError> {
    for record in records {
        let tld = record.tld.trim().trim_matches('.');
        if tld.is_empty() || tld.contains(' ') {
            return Err(WhoisError::config(format!(
                "Invalid TLD '{}' in registry",
                record.tld
            )));
        }
        if record.adapter == AdapterKind::Tcp && record.host.trim().starts_with("http") {
            return Err(WhoisError::config(format!(
                "TLD '{}' uses the tcp adapter but its host is a URL",
                record.tld
            )));
        }
    }
    Ok(())
}

/// Default table of frequently queried suffixes.
fn builtin_records() -> Vec<TldRecord> {
    let verisign_miss = "No match for";
    let china = TimezoneHint {
        name: Some("Asia/Shanghai".to_string()),
        offset: Some("+8".to_string()),
        format: None,
    };
    let japan = TimezoneHint {
        name: Some("Asia/Tokyo".to_string()),
        offset: Some("+9".to_string()),
        format: None,
    };

    let mut records = vec![
        TldRecord::tcp("com", "whois.verisign-grs.com").with_availability(verisign_miss),
        TldRecord::tcp("net", "whois.verisign-grs.com").with_availability(verisign_miss),
        TldRecord::tcp("org", "whois.pir.org").with_availability("NOT FOUND|Domain not found"),
        TldRecord::tcp("info", "whois.nic.info"),
        TldRecord::tcp("biz", "whois.nic.biz"),
        TldRecord::tcp("io", "whois.nic.io").with_availability("is available for purchase"),
        TldRecord::tcp("ai", "whois.nic.ai"),
        TldRecord::tcp("co", "whois.nic.co"),
        TldRecord::tcp("cc", "ccwhois.verisign-grs.com").with_availability(verisign_miss),
        TldRecord::tcp("tv", "tvwhois.verisign-grs.com").with_availability(verisign_miss),
        TldRecord::tcp("me", "whois.nic.me"),
        TldRecord::tcp("xyz", "whois.nic.xyz"),
        TldRecord::rdap("app", "").with_fallback_host("whois.nic.google"),
        TldRecord::rdap("dev", "").with_fallback_host("whois.nic.google"),
        TldRecord::tcp("de", "whois.denic.de").with_availability("Status: free"),
        TldRecord::tcp("eu", "whois.eu").with_availability("Status: AVAILABLE"),
        TldRecord::tcp("fr", "whois.nic.fr"),
        TldRecord::tcp("nl", "whois.domain-registry.nl").with_availability("is free"),
        TldRecord::tcp("be", "whois.dns.be").with_availability("Status: AVAILABLE"),
        TldRecord::tcp("it", "whois.nic.it").with_availability("Status: AVAILABLE"),
        TldRecord::tcp("at", "whois.nic.at"),
        TldRecord::tcp("ch", "whois.nic.ch"),
        TldRecord::tcp("ru", "whois.tcinet.ru").with_availability("No entries found"),
        TldRecord::tcp("kr", "whois.kr"),
        TldRecord::tcp("am", "whois.amnic.net"),
        TldRecord::tcp("sa", "whois.nic.net.sa"),
        TldRecord::tcp("kz", "whois.nic.kz"),
        TldRecord::tcp("bo", "whois.nic.bo"),
        TldRecord::none("es"),
    ];

    for tld in ["uk", "co.uk", "org.uk", "me.uk", "ltd.uk", "plc.uk"] {
        records.push(
            TldRecord::tcp(tld, "whois.nic.uk")
                .with_availability("This domain name has not been registered"),
        );
    }
    for tld in ["cn", "com.cn", "net.cn", "org.cn"] {
        records.push(
            TldRecord::tcp(tld, "whois.cnnic.cn")
                .with_availability("No matching record")
                .with_timezone(china.clone()),
        );
    }
    for tld in ["jp", "co.jp"] {
        records.push(
            TldRecord::tcp(tld, "whois.jprs.jp")
                .with_availability("No match!!")
                .with_timezone(japan.clone()),
        );
    }
    for tld in ["br", "com.br"] {
        records.push(TldRecord::tcp(tld, "whois.registro.br").with_availability("No match for"));
    }
    for tld in ["au", "com.au", "net.au", "org.au"] {
        records.push(TldRecord::tcp(tld, "whois.auda.org.au"));
    }
    for tld in ["ar", "com.ar"] {
        records.push(TldRecord::tcp(tld, "whois.nic.ar"));
    }
    for tld in ["sg", "com.sg"] {
        records.push(TldRecord::tcp(tld, "whois.sgnic.sg"));
    }

    records
}
