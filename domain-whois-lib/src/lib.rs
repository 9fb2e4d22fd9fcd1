//! # Domain WHOIS Library
//!
//! Query engine that answers "who owns this domain and is it available".
//! It talks raw TCP WHOIS (port 43) and RDAP over HTTP, then normalizes
//! the wildly inconsistent responses into one [`ParsedRecord`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use domain_whois_lib::WhoisDispatcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dispatcher = WhoisDispatcher::new()?;
//!     let record = dispatcher.lookup("example.com").await;
//!
//!     println!("{} available: {}", record.domain_name, record.is_available);
//!     if let Some(expiry) = &record.formatted.domain.expired {
//!         println!("expires {}", expiry.utc);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Suffix-aware extraction**: longest-match TLDs such as `co.uk`
//! - **TCP WHOIS**: alternate servers for terse answers and dead hosts
//! - **RDAP**: IANA bootstrap discovery with a persisted, stale-tolerant cache
//! - **Heuristic text parser**: multilingual key aliases, redaction filtering
//!   and per-TLD preprocessing
//! - **Date normalization**: registry timezones folded into UTC ISO-8601
//! - **Bulk lookups**: bounded concurrency with optional pacing
//!
//! Lookups never return `Err`: failures come back as records with
//! `parse_success = false` and a readable `error`.

pub use cache::{MemoryCache, RecordCache};
pub use concurrent::ConcurrentProcessor;
pub use config::{
    load_env_config, merge_configs, parse_duration_string, ConfigManager, EnvConfig, FileConfig,
};
pub use dates::DateNormalizer;
pub use dispatcher::WhoisDispatcher;
pub use error::WhoisError;
pub use extract::{normalize, TldExtractor};
pub use parsers::{KeyAliasTable, ParseContext, ParseHandler, PrehandleRegistry, ProtectedWords};
pub use protocols::{QueryHandler, RdapBootstrapCache, RdapHandler, WhoisTcpHandler};
pub use registry::{StaticTldRegistry, TldRegistry};
pub use types::{
    AdapterKind, ContactBlock, DateField, DomainBlock, DomainName, FormattedWhois, LookupConfig,
    ParsedRecord, QueryOutcome, TimezoneHint, TldRecord, STATUS_FAILED, STATUS_NO_SERVICE,
    STATUS_OK,
};
pub use utils::{expand_domain_inputs, parse_domain_list, read_domain_list};

// Building blocks exposed for callers that assemble their own pipeline
pub mod parsers;
pub mod protocols;

mod cache;
mod concurrent;
mod config;
mod dates;
mod dispatcher;
mod error;
mod extract;
mod registry;
mod types;
mod utils;

pub type Result<T> = std::result::Result<T, WhoisError>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
