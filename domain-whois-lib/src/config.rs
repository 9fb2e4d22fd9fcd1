//! Configuration file and environment variable handling.
//!
//! Settings are layered: built-in defaults, then TOML files (XDG, home,
//! local; later wins), then `DW_*` environment variables, then CLI flags.
//! Each layer only overrides the values it actually sets.

use crate::error::WhoisError;
use crate::parsers::{KeyAliasTable, ProtectedWords};
use crate::registry::validate_records;
use crate::types::{LookupConfig, TldRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Name of the local and XDG configuration file.
pub const CONFIG_FILE_NAME: &str = "domain-whois.toml";

/// Complete configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub whois: Option<WhoisConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rdap: Option<RdapConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<BootstrapConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parser: Option<ParserConfig>,

    /// Inline TLD registry records (`[[tld]]` tables)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tld: Vec<TldRecord>,
}

/// `[defaults]`: bulk behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DefaultsConfig {
    /// Concurrent lookups (1-100)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Delay before each bulk lookup ("200ms")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pacing: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<String>,
}

/// `[whois]`: TCP handler.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WhoisConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<String>,
}

/// `[rdap]`: RDAP handler.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RdapConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_base: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_cap: Option<String>,

    /// Fall back to TCP WHOIS when RDAP fails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_fallback: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// `[bootstrap]`: IANA RDAP bootstrap registry.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BootstrapConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<PathBuf>,
}

/// `[parser]`: text parser tables.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ParserConfig {
    /// Extra redaction markers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protected_words: Option<Vec<String>>,

    /// Extra labels per canonical field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_aliases: Option<BTreeMap<String, Vec<String>>>,
}

/// Overwrite each listed field of `$lower` that `$higher` sets.
macro_rules! overlay {
    ($lower:expr, $higher:expr; $($field:ident),+ $(,)?) => {
        $(
            if $higher.$field.is_some() {
                $lower.$field = $higher.$field;
            }
        )+
    };
}

fn merge_table<T>(lower: Option<T>, higher: Option<T>, merge: impl FnOnce(&mut T, T)) -> Option<T> {
    match (lower, higher) {
        (Some(mut lower), Some(higher)) => {
            merge(&mut lower, higher);
            Some(lower)
        }
        (None, higher) => higher,
        (lower, None) => lower,
    }
}

fn duration_field(table: &str, key: &str, value: &Option<String>) -> Result<Option<Duration>, WhoisError> {
    match value {
        None => Ok(None),
        Some(raw) => parse_duration_string(raw).map(Some).ok_or_else(|| {
            WhoisError::config(format!(
                "Invalid duration '{}' for [{}] {}. Use a format like '500ms', '5s', '2m' or '24h'",
                raw, table, key
            ))
        }),
    }
}

impl FileConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self, WhoisError> {
        let config: FileConfig = toml::from_str(content)
            .map_err(|e| WhoisError::config(format!("Failed to parse TOML configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay the values this file sets on `config`.
    pub fn apply_to(&self, mut config: LookupConfig) -> Result<LookupConfig, WhoisError> {
        if let Some(defaults) = &self.defaults {
            if let Some(concurrency) = defaults.concurrency {
                config.concurrency = concurrency;
            }
            if let Some(pacing) = duration_field("defaults", "pacing", &defaults.pacing)? {
                config.pacing = pacing;
            }
            if let Some(ttl) = duration_field("defaults", "cache_ttl", &defaults.cache_ttl)? {
                config.cache_ttl = ttl;
            }
        }

        if let Some(whois) = &self.whois {
            if let Some(timeout) = duration_field("whois", "timeout", &whois.timeout)? {
                config.whois_timeout = timeout;
            }
            if let Some(port) = whois.port {
                config.whois_port = port;
            }
            if let Some(retries) = whois.max_retries {
                config.whois_max_retries = retries;
            }
            if let Some(delay) = duration_field("whois", "retry_delay", &whois.retry_delay)? {
                config.whois_retry_delay = delay;
            }
        }

        if let Some(rdap) = &self.rdap {
            if let Some(timeout) = duration_field("rdap", "timeout", &rdap.timeout)? {
                config.rdap_timeout = timeout;
            }
            if let Some(retries) = rdap.max_retries {
                config.rdap_max_retries = retries;
            }
            if let Some(base) = duration_field("rdap", "backoff_base", &rdap.backoff_base)? {
                config.rdap_backoff_base = base;
            }
            if let Some(cap) = duration_field("rdap", "backoff_cap", &rdap.backoff_cap)? {
                config.rdap_backoff_cap = cap;
            }
            if let Some(fallback) = rdap.tcp_fallback {
                config.rdap_tcp_fallback = fallback;
            }
            if let Some(agent) = &rdap.user_agent {
                config.user_agent = agent.clone();
            }
        }

        if let Some(bootstrap) = &self.bootstrap {
            if let Some(enabled) = bootstrap.enabled {
                config.enable_bootstrap = enabled;
            }
            if let Some(url) = &bootstrap.url {
                config.bootstrap_url = url.clone();
            }
            if let Some(ttl) = duration_field("bootstrap", "ttl", &bootstrap.ttl)? {
                config.bootstrap_ttl = ttl;
            }
            if let Some(path) = &bootstrap.cache_file {
                config.bootstrap_cache_file = Some(path.clone());
            }
        }

        Ok(config)
    }

    /// Built-in alias table extended with `[parser] extra_aliases`.
    pub fn alias_table(&self) -> KeyAliasTable {
        match self.parser.as_ref().and_then(|p| p.extra_aliases.as_ref()) {
            Some(extra) => KeyAliasTable::default().with_extra_aliases(extra),
            None => KeyAliasTable::default(),
        }
    }

    /// Built-in redaction markers extended with `[parser] protected_words`.
    pub fn protected_words(&self) -> ProtectedWords {
        match self.parser.as_ref().and_then(|p| p.protected_words.as_ref()) {
            Some(extra) => ProtectedWords::default().with_extra(extra),
            None => ProtectedWords::default(),
        }
    }

    /// Validate a configuration for common issues.
    pub fn validate(&self) -> Result<(), WhoisError> {
        let applied = self.apply_to(LookupConfig::default())?;

        if let Some(concurrency) = self.defaults.as_ref().and_then(|d| d.concurrency) {
            if concurrency == 0 || concurrency > 100 {
                return Err(WhoisError::config("Concurrency must be between 1 and 100"));
            }
        }
        if applied.whois_timeout.is_zero() || applied.rdap_timeout.is_zero() {
            return Err(WhoisError::config("Timeouts must be greater than zero"));
        }
        if applied.whois_port == 0 {
            return Err(WhoisError::config("WHOIS port must be between 1 and 65535"));
        }
        if applied.rdap_backoff_cap < applied.rdap_backoff_base {
            return Err(WhoisError::config("RDAP backoff_cap must not be below backoff_base"));
        }
        if !applied.bootstrap_url.starts_with("http://") && !applied.bootstrap_url.starts_with("https://") {
            return Err(WhoisError::config(format!(
                "Bootstrap URL '{}' must be an http(s) URL",
                applied.bootstrap_url
            )));
        }
        if applied.user_agent.trim().is_empty() {
            return Err(WhoisError::config("RDAP user_agent cannot be empty"));
        }

        if let Some(aliases) = self.parser.as_ref().and_then(|p| p.extra_aliases.as_ref()) {
            for (canonical, labels) in aliases {
                if canonical.trim().is_empty() {
                    return Err(WhoisError::config("Alias field names cannot be empty"));
                }
                if labels.iter().all(|l| l.trim().is_empty()) {
                    return Err(WhoisError::config(format!(
                        "Alias field '{}' needs at least one label",
                        canonical
                    )));
                }
            }
        }

        validate_records(&self.tld)
    }
}

/// Configuration discovery and loading.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    local_dir: PathBuf,
    home_dir: Option<PathBuf>,
    xdg_dir: Option<PathBuf>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// Manager searching the working directory, `$HOME` and `$XDG_CONFIG_HOME`.
    pub fn new() -> Self {
        let home_dir = env::var_os("HOME").map(PathBuf::from);
        let xdg_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| home_dir.as_ref().map(|home| home.join(".config")));
        Self {
            local_dir: PathBuf::from("."),
            home_dir,
            xdg_dir,
        }
    }

    /// Manager searching explicit directories.
    pub fn with_dirs<L: Into<PathBuf>>(local_dir: L, home_dir: Option<PathBuf>, xdg_dir: Option<PathBuf>) -> Self {
        Self {
            local_dir: local_dir.into(),
            home_dir,
            xdg_dir,
        }
    }

    /// Load and validate one configuration file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, WhoisError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(WhoisError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            WhoisError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config = FileConfig::from_toml_str(&content).map_err(|e| match e {
            WhoisError::ConfigError { message } => WhoisError::config(format!("{}: {}", path.display(), message)),
            other => other,
        })?;
        debug!(path = %path.display(), "loaded configuration file");
        Ok(config)
    }

    /// Existing configuration files, lowest precedence first.
    pub fn discover_paths(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(xdg) = &self.xdg_dir {
            candidates.push(xdg.join("domain-whois").join("config.toml"));
        }
        if let Some(home) = &self.home_dir {
            candidates.push(home.join(format!(".{}", CONFIG_FILE_NAME)));
        }
        candidates.push(self.local_dir.join(CONFIG_FILE_NAME));

        let mut found: Vec<PathBuf> = Vec::new();
        for path in candidates {
            if path.is_file() && !found.contains(&path) {
                found.push(path);
            }
        }
        found
    }

    /// Load every discovered file and merge them, local file winning.
    pub fn discover_and_load(&self) -> Result<FileConfig, WhoisError> {
        let paths = self.discover_paths();
        let mut merged = FileConfig::default();
        for path in &paths {
            let config = self.load_file(path)?;
            merged = merge_configs(merged, config);
        }

        if paths.len() > 1 {
            info!(
                files = ?paths,
                "multiple config files found, later files take precedence"
            );
        }
        merged.validate()?;
        Ok(merged)
    }
}

/// Merge two configurations; values from `higher` win.
pub fn merge_configs(lower: FileConfig, higher: FileConfig) -> FileConfig {
    let mut tld = lower.tld;
    for record in higher.tld {
        match tld.iter_mut().find(|r| r.tld.eq_ignore_ascii_case(&record.tld)) {
            Some(existing) => *existing = record,
            None => tld.push(record),
        }
    }

    FileConfig {
        defaults: merge_table(lower.defaults, higher.defaults, |l, h| {
            overlay!(l, h; concurrency, pacing, cache_ttl);
        }),
        whois: merge_table(lower.whois, higher.whois, |l, h| {
            overlay!(l, h; timeout, port, max_retries, retry_delay);
        }),
        rdap: merge_table(lower.rdap, higher.rdap, |l, h| {
            overlay!(l, h; timeout, max_retries, backoff_base, backoff_cap, tcp_fallback, user_agent);
        }),
        bootstrap: merge_table(lower.bootstrap, higher.bootstrap, |l, h| {
            overlay!(l, h; enabled, url, ttl, cache_file);
        }),
        parser: merge_table(lower.parser, higher.parser, |l, h| {
            l.protected_words = match (l.protected_words.take(), h.protected_words) {
                (Some(mut words), Some(more)) => {
                    words.extend(more);
                    Some(words)
                }
                (words, more) => more.or(words),
            };
            l.extra_aliases = match (l.extra_aliases.take(), h.extra_aliases) {
                (Some(mut aliases), Some(more)) => {
                    for (field, labels) in more {
                        aliases.entry(field).or_default().extend(labels);
                    }
                    Some(aliases)
                }
                (aliases, more) => more.or(aliases),
            };
        }),
        tld,
    }
}

/// Settings read from `DW_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub concurrency: Option<usize>,
    pub pacing: Option<Duration>,
    pub whois_timeout: Option<Duration>,
    pub rdap_timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub bootstrap: Option<bool>,
    pub bootstrap_cache: Option<PathBuf>,
    pub tcp_fallback: Option<bool>,
    /// Explicit config file (`DW_CONFIG`)
    pub config: Option<PathBuf>,
    /// TLD registry file (`DW_TLDS`)
    pub tlds: Option<PathBuf>,
}

/// Load configuration from the process environment.
///
/// Invalid values are logged and ignored.
pub fn load_env_config() -> EnvConfig {
    EnvConfig::from_vars(env::vars())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl EnvConfig {
    /// Build from `(name, value)` pairs; unrelated names are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = EnvConfig::default();

        for (name, value) in vars {
            let name = name.as_ref();
            let value = value.as_ref().trim();
            if !name.starts_with("DW_") {
                continue;
            }

            let accepted = match name {
                "DW_CONCURRENCY" => match value.parse::<usize>() {
                    Ok(n) if (1..=100).contains(&n) => {
                        config.concurrency = Some(n);
                        true
                    }
                    _ => false,
                },
                "DW_PACING" => parse_duration_string(value).map(|d| config.pacing = Some(d)).is_some(),
                "DW_WHOIS_TIMEOUT" => parse_duration_string(value)
                    .filter(|d| !d.is_zero())
                    .map(|d| config.whois_timeout = Some(d))
                    .is_some(),
                "DW_RDAP_TIMEOUT" => parse_duration_string(value)
                    .filter(|d| !d.is_zero())
                    .map(|d| config.rdap_timeout = Some(d))
                    .is_some(),
                "DW_MAX_RETRIES" => value.parse::<u32>().ok().map(|n| config.max_retries = Some(n)).is_some(),
                "DW_BOOTSTRAP" => parse_bool(value).map(|b| config.bootstrap = Some(b)).is_some(),
                "DW_TCP_FALLBACK" => parse_bool(value).map(|b| config.tcp_fallback = Some(b)).is_some(),
                "DW_BOOTSTRAP_CACHE" if !value.is_empty() => {
                    config.bootstrap_cache = Some(PathBuf::from(value));
                    true
                }
                "DW_CONFIG" if !value.is_empty() => {
                    config.config = Some(PathBuf::from(value));
                    true
                }
                "DW_TLDS" if !value.is_empty() => {
                    config.tlds = Some(PathBuf::from(value));
                    true
                }
                _ => {
                    debug!(name, "ignoring unknown DW_ variable");
                    continue;
                }
            };

            if accepted {
                debug!(name, value, "using environment override");
            } else {
                warn!(name, value, "ignoring invalid environment value");
            }
        }

        config
    }

    /// Overlay the values this environment sets on `config`.
    pub fn apply_to(&self, mut config: LookupConfig) -> LookupConfig {
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(pacing) = self.pacing {
            config.pacing = pacing;
        }
        if let Some(timeout) = self.whois_timeout {
            config.whois_timeout = timeout;
        }
        if let Some(timeout) = self.rdap_timeout {
            config.rdap_timeout = timeout;
        }
        if let Some(retries) = self.max_retries {
            config = config.with_max_retries(retries);
        }
        if let Some(enabled) = self.bootstrap {
            config.enable_bootstrap = enabled;
        }
        if let Some(path) = &self.bootstrap_cache {
            config.bootstrap_cache_file = Some(path.clone());
        }
        if let Some(enabled) = self.tcp_fallback {
            config.rdap_tcp_fallback = enabled;
        }
        config
    }
}

/// Parse a duration like "500ms", "5s", "2m" or "24h".
///
/// A bare number is read as seconds.
pub fn parse_duration_string(raw: &str) -> Option<Duration> {
    let raw = raw.trim().to_lowercase();
    if raw.is_empty() {
        return None;
    }

    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: u64 = number.parse().ok()?;

    match unit.trim() {
        "ms" => Some(Duration::from_millis(value)),
        "" | "s" => Some(Duration::from_secs(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs),
        "h" => value.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}
