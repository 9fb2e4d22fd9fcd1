//! IANA RDAP bootstrap registry (RFC 9224) with a persisted snapshot.
//!
//! The registry is fetched as a whole and kept as one immutable
//! [`BootstrapSnapshot`] behind an `Arc`. Refreshing swaps the `Arc`, so
//! readers always see a complete snapshot. A failed refresh keeps serving
//! the previous one, however old, and further attempts wait out a cooldown.

use crate::error::WhoisError;
use crate::types::LookupConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Wait after a failed refresh before asking the registry again.
pub const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_secs(60);

/// One `[patterns, urls]` entry of the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapService {
    pub tlds: Vec<String>,
    pub urls: Vec<String>,
}

/// A complete copy of the bootstrap registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapSnapshot {
    pub services: Vec<BootstrapService>,

    /// Unix seconds of the fetch that produced this snapshot
    pub fetched_at: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl BootstrapSnapshot {
    /// Build a snapshot from the registry's `{services: [[tlds], [urls]]}` JSON.
    pub fn from_registry_json(json: &Value) -> Result<Self, WhoisError> {
        let entries = json
            .get("services")
            .and_then(Value::as_array)
            .ok_or_else(|| WhoisError::bootstrap("Invalid bootstrap JSON: missing 'services' array"))?;

        let strings = |value: Option<&Value>, lowercase: bool| -> Vec<String> {
            value
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(|s| if lowercase { s.to_lowercase() } else { s.to_string() })
                        .collect()
                })
                .unwrap_or_default()
        };

        let services = entries
            .iter()
            .filter_map(Value::as_array)
            .filter(|pair| pair.len() >= 2)
            .map(|pair| BootstrapService {
                tlds: strings(pair.first(), true),
                urls: strings(pair.get(1), false),
            })
            .filter(|service| !service.tlds.is_empty() && !service.urls.is_empty())
            .collect::<Vec<_>>();

        if services.is_empty() {
            return Err(WhoisError::bootstrap(
                "Bootstrap registry lists no usable services",
            ));
        }

        Ok(Self {
            services,
            fetched_at: unix_now(),
        })
    }

    pub fn age(&self) -> Duration {
        Duration::from_secs(unix_now().saturating_sub(self.fetched_at))
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }

    /// Number of TLD patterns covered.
    pub fn tld_count(&self) -> usize {
        self.services.iter().map(|s| s.tlds.len()).sum()
    }

    /// RDAP base URL serving `tld`.
    ///
    /// Exact pattern matches win; a compound TLD then tries its labels
    /// from the right ("com.br" tries "br" before "com").
    pub fn find_server(&self, tld: &str) -> Option<&str> {
        let tld = tld.trim().trim_matches('.').to_lowercase();
        if tld.is_empty() {
            return None;
        }
        self.lookup(&tld).or_else(|| {
            if !tld.contains('.') {
                return None;
            }
            tld.rsplit('.').find_map(|label| self.lookup(label))
        })
    }

    fn lookup(&self, tld: &str) -> Option<&str> {
        self.services
            .iter()
            .find(|service| service.tlds.iter().any(|t| t == tld))
            .and_then(|service| service.urls.first())
            .map(String::as_str)
    }
}

/// Lazily refreshed bootstrap registry shared across lookups.
#[derive(Debug)]
pub struct RdapBootstrapCache {
    url: String,
    ttl: Duration,
    cache_file: Option<PathBuf>,
    client: reqwest::Client,
    snapshot: RwLock<Option<Arc<BootstrapSnapshot>>>,
    refresh_cooldown: Duration,
    last_failure: Mutex<Option<Instant>>,
    // One registry fetch in flight at a time
    refresh_lock: tokio::sync::Mutex<()>,
}

impl RdapBootstrapCache {
    pub fn new(config: &LookupConfig) -> Result<Self, WhoisError> {
        let client = reqwest::Client::builder()
            .timeout(config.rdap_timeout)
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| {
                WhoisError::network_with_source("Failed to create bootstrap HTTP client", e.to_string())
            })?;

        let cache = Self {
            url: config.bootstrap_url.clone(),
            ttl: config.bootstrap_ttl,
            cache_file: config.bootstrap_cache_file.clone(),
            client,
            snapshot: RwLock::new(None),
            refresh_cooldown: DEFAULT_REFRESH_COOLDOWN,
            last_failure: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        };

        if let Some(snapshot) = cache.load_persisted() {
            cache.store(Arc::new(snapshot));
        }
        Ok(cache)
    }

    /// Seed the cache with a known snapshot.
    pub fn with_snapshot(self, snapshot: BootstrapSnapshot) -> Self {
        self.store(Arc::new(snapshot));
        self
    }

    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn in_cooldown(&self) -> bool {
        let last = match self.last_failure.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        last.map_or(false, |at| at.elapsed() < self.refresh_cooldown)
    }

    fn set_last_failure(&self, at: Option<Instant>) {
        match self.last_failure.lock() {
            Ok(mut guard) => *guard = at,
            Err(poisoned) => *poisoned.into_inner() = at,
        }
    }

    /// Current snapshot, without refreshing.
    pub fn current(&self) -> Option<Arc<BootstrapSnapshot>> {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                warn!("Bootstrap cache lock poisoned, recovering");
                poisoned.into_inner().clone()
            }
        }
    }

    fn store(&self, snapshot: Arc<BootstrapSnapshot>) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = Some(snapshot),
            Err(poisoned) => {
                warn!("Bootstrap cache lock poisoned, recovering");
                *poisoned.into_inner() = Some(snapshot);
            }
        }
    }

    /// A fresh snapshot if one can be had, else whatever is cached.
    ///
    /// Returns `None` only when no snapshot was ever loaded. After a failed
    /// refresh the cached snapshot is served as is until the cooldown ends.
    pub async fn get(&self) -> Option<Arc<BootstrapSnapshot>> {
        if let Some(current) = self.usable_without_refresh() {
            return current;
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed or failed while we waited
        if let Some(current) = self.usable_without_refresh() {
            return current;
        }

        let current = self.current();
        match self.refresh().await {
            Ok(snapshot) => {
                self.set_last_failure(None);
                Some(snapshot)
            }
            Err(e) => {
                self.set_last_failure(Some(Instant::now()));
                match &current {
                    Some(stale) => warn!(
                        error = %e,
                        age_secs = stale.age().as_secs(),
                        "Bootstrap refresh failed, serving previous snapshot"
                    ),
                    None => warn!(error = %e, "Bootstrap refresh failed and no snapshot is cached"),
                }
                current
            }
        }
    }

    /// `Some(snapshot)` when the cached state should be served without a fetch.
    fn usable_without_refresh(&self) -> Option<Option<Arc<BootstrapSnapshot>>> {
        let current = self.current();
        let fresh = current.as_ref().map_or(false, |s| s.is_fresh(self.ttl));
        if fresh || self.in_cooldown() {
            Some(current)
        } else {
            None
        }
    }

    /// Base URL for `tld` from the (possibly refreshed) registry.
    pub async fn find_server(&self, tld: &str) -> Option<String> {
        self.get()
            .await
            .and_then(|snapshot| snapshot.find_server(tld).map(String::from))
    }

    /// Fetch the registry now and replace the snapshot.
    pub async fn refresh(&self) -> Result<Arc<BootstrapSnapshot>, WhoisError> {
        debug!(url = %self.url, "Fetching RDAP bootstrap registry");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| WhoisError::bootstrap(format!("Failed to fetch bootstrap registry: {}", e)))?;

        if !response.status().is_success() {
            return Err(WhoisError::bootstrap(format!(
                "Bootstrap registry returned HTTP {}",
                response.status()
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| WhoisError::bootstrap(format!("Failed to parse bootstrap JSON: {}", e)))?;

        let snapshot = Arc::new(BootstrapSnapshot::from_registry_json(&json)?);
        info!(tlds = snapshot.tld_count(), "RDAP bootstrap registry refreshed");

        self.store(snapshot.clone());
        if let Err(e) = self.persist(&snapshot) {
            warn!(error = %e, "Could not persist bootstrap snapshot");
        }
        Ok(snapshot)
    }

    fn persist(&self, snapshot: &BootstrapSnapshot) -> Result<(), WhoisError> {
        let path = match &self.cache_file {
            Some(path) => path,
            None => return Ok(()),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| WhoisError::file_error(parent.display().to_string(), e.to_string()))?;
        }
        let body = serde_json::to_string(snapshot)?;
        std::fs::write(path, body)
            .map_err(|e| WhoisError::file_error(path.display().to_string(), e.to_string()))
    }

    /// Read the persisted snapshot, stale or not.
    fn load_persisted(&self) -> Option<BootstrapSnapshot> {
        let path = self.cache_file.as_deref()?;
        match read_snapshot(path) {
            Ok(snapshot) => {
                debug!(
                    path = %path.display(),
                    age_secs = snapshot.age().as_secs(),
                    "Loaded persisted bootstrap snapshot"
                );
                Some(snapshot)
            }
            Err(e) => {
                if path.exists() {
                    warn!(path = %path.display(), error = %e, "Ignoring unreadable bootstrap snapshot");
                }
                None
            }
        }
    }
}

fn read_snapshot(path: &Path) -> Result<BootstrapSnapshot, WhoisError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| WhoisError::file_error(path.display().to_string(), e.to_string()))?;
    Ok(serde_json::from_str(&content)?)
}
