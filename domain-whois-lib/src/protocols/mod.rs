//! Query handlers for the upstream protocols.
//!
//! Each handler talks to one kind of upstream (TCP/43 WHOIS or RDAP over
//! HTTPS) and always hands back a [`QueryOutcome`]: network trouble is
//! retried inside the handler and, when it persists, reported through a
//! failure envelope instead of an `Err`.

/// IANA RDAP bootstrap registry snapshot cache
pub mod bootstrap;

/// RDAP over HTTPS
pub mod rdap;

/// Plaintext WHOIS over TCP
pub mod whois;

pub use bootstrap::{BootstrapService, BootstrapSnapshot, RdapBootstrapCache};
pub use rdap::RdapHandler;
pub use whois::WhoisTcpHandler;

use crate::types::{AdapterKind, DomainName, QueryOutcome, TldRecord};
use async_trait::async_trait;

/// Fetches the raw registration payload for one domain.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Adapter this handler implements.
    fn adapter(&self) -> AdapterKind;

    /// Query upstream for `domain` using `record`'s server settings.
    ///
    /// Never fails: exhausted retries produce an outcome with
    /// `succeeded = false` and a descriptive payload.
    async fn query(&self, domain: &DomainName, record: &TldRecord) -> QueryOutcome;
}
