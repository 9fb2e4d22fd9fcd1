//! RDAP (Registration Data Access Protocol) query handler.
//!
//! Resolves a base URL for the TLD, issues `GET <base>/domain/<name>` and
//! hands back the JSON body. A `404` is a normal answer meaning "not
//! registered" and is turned into a small synthetic JSON document.
//! Transient failures (network errors, timeouts, 5xx, 429) are retried with
//! capped exponential backoff; every failure is finally reported through a
//! `{error, domain, rdapServer}` envelope.

use super::bootstrap::RdapBootstrapCache;
use super::QueryHandler;
use crate::error::WhoisError;
use crate::types::{AdapterKind, DomainName, LookupConfig, QueryOutcome, TldRecord};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const RDAP_MEDIA_TYPE: &str = "application/rdap+json";

/// Endpoints of major registries, consulted before the bootstrap registry.
const STATIC_BASES: &[(&str, &str)] = &[
    ("com", "https://rdap.verisign.com/com/v1/"),
    ("net", "https://rdap.verisign.com/net/v1/"),
    ("org", "https://rdap.pir.org/v1/"),
    ("info", "https://rdap.afilias.net/rdap/"),
    ("io", "https://rdap.identitydigital.services/rdap/"),
    ("app", "https://rdap.nominet.uk/app/"),
    ("dev", "https://rdap.nic.google/dev/"),
    ("eu", "https://rdap.eu/rdap/"),
];

/// RDAP query handler.
#[derive(Debug, Clone)]
pub struct RdapHandler {
    client: reqwest::Client,
    config: LookupConfig,
    static_bases: HashMap<String, String>,
    bootstrap: Option<Arc<RdapBootstrapCache>>,
}

impl RdapHandler {
    /// Create a handler from the lookup configuration.
    ///
    /// Connections are never pooled; every request opens its own.
    pub fn new(config: &LookupConfig) -> Result<Self, WhoisError> {
        let client = reqwest::Client::builder()
            .timeout(config.rdap_timeout)
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| {
                WhoisError::network_with_source("Failed to create RDAP HTTP client", e.to_string())
            })?;

        let static_bases = STATIC_BASES
            .iter()
            .map(|(tld, base)| (tld.to_string(), base.to_string()))
            .collect();

        Ok(Self {
            client,
            config: config.clone(),
            static_bases,
            bootstrap: None,
        })
    }

    pub fn with_bootstrap(mut self, bootstrap: Arc<RdapBootstrapCache>) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    /// Add or replace a static base URL.
    pub fn with_static_base<T: Into<String>, B: Into<String>>(mut self, tld: T, base: B) -> Self {
        self.static_bases.insert(tld.into().to_lowercase(), base.into());
        self
    }

    pub fn bootstrap(&self) -> Option<&Arc<RdapBootstrapCache>> {
        self.bootstrap.as_ref()
    }

    /// Base URL for `tld`.
    ///
    /// Order: the record's own override, the static table, the bootstrap
    /// registry, then a `https://rdap.nic.<last label>/` guess.
    pub async fn resolve_base(&self, tld: &str, record: &TldRecord) -> String {
        let tld = tld.trim_matches('.').to_lowercase();

        if let Some(base) = record.rdap_override() {
            return base.to_string();
        }
        if let Some(base) = self.static_bases.get(&tld) {
            return base.clone();
        }
        if let Some(bootstrap) = &self.bootstrap {
            if let Some(base) = bootstrap.find_server(&tld).await {
                debug!(tld = %tld, base = %base, "RDAP base from bootstrap registry");
                return base;
            }
        }

        let last_label = tld.rsplit('.').next().unwrap_or(tld.as_str());
        format!("https://rdap.nic.{}/", last_label)
    }

    /// One timed request. `Ok` carries a JSON body.
    async fn fetch(&self, url: &str, domain: &str) -> Result<String, WhoisError> {
        let request = async {
            let response = self
                .client
                .get(url)
                .header(ACCEPT, RDAP_MEDIA_TYPE)
                .send()
                .await
                .map_err(|e| WhoisError::rdap(domain, format!("Request failed: {}", e)))?;

            let status = response.status();
            debug!(url, status = status.as_u16(), "RDAP response");

            if status == StatusCode::NOT_FOUND {
                return Ok(not_found_body(domain));
            }
            if !status.is_success() {
                return Err(WhoisError::rdap_with_status(
                    domain,
                    format!("Unexpected HTTP status {}", status),
                    status.as_u16(),
                ));
            }

            let body = response.text().await?;
            if let Err(e) = serde_json::from_str::<serde_json::Value>(&body) {
                return Err(WhoisError::parse(format!(
                    "RDAP response for '{}' is not JSON: {}",
                    domain, e
                )));
            }
            Ok(body)
        };

        let timeout = self.config.rdap_timeout;
        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(WhoisError::timeout(format!("RDAP request to {}", url), timeout)),
        }
    }
}

/// `<base>/domain/<domain>`, with exactly one slash between base and path.
pub fn domain_url(base: &str, domain: &str) -> String {
    format!("{}/domain/{}", base.trim_end_matches('/'), domain)
}

/// Synthetic body for a `404`, read by the JSON parser as "available".
fn not_found_body(domain: &str) -> String {
    json!({
        "status": "not found",
        "errorCode": 404,
        "title": "Not Found",
        "description": [format!("The domain {} was not found in the RDAP registry", domain)]
    })
    .to_string()
}

#[async_trait]
impl QueryHandler for RdapHandler {
    fn adapter(&self) -> AdapterKind {
        AdapterKind::Rdap
    }

    async fn query(&self, domain: &DomainName, record: &TldRecord) -> QueryOutcome {
        let started = Instant::now();
        let name = domain.registrable();
        let tld = if domain.suffix.is_empty() {
            record.tld.as_str()
        } else {
            domain.suffix.as_str()
        };

        let base = self.resolve_base(tld, record).await;
        let url = domain_url(&base, &name);

        let mut attempt = 0u32;
        let error = loop {
            debug!(url = %url, attempt, "RDAP query");
            match self.fetch(&url, &name).await {
                Ok(body) => {
                    return QueryOutcome::success(&name, AdapterKind::Rdap, base, body, started.elapsed());
                }
                Err(e) if e.is_retryable() && attempt < self.config.rdap_max_retries => {
                    attempt += 1;
                    let delay = self.config.rdap_backoff(attempt);
                    info!(
                        domain = %name,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "RDAP query failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break e,
            }
        };

        warn!(domain = %name, base = %base, error = %error, "RDAP query failed");
        let envelope = json!({
            "error": error.to_string(),
            "domain": name,
            "rdapServer": base,
        })
        .to_string();
        QueryOutcome::failure(
            name,
            AdapterKind::Rdap,
            base,
            envelope,
            error.to_string(),
            started.elapsed(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn domain(name: &str, suffix: &str) -> DomainName {
        DomainName {
            raw: format!("{}.{}", name, suffix),
            normalized: format!("{}.{}", name, suffix),
            prefix: name.to_string(),
            suffix: suffix.to_string(),
            ..DomainName::default()
        }
    }

    fn handler(retries: u32) -> RdapHandler {
        let config = LookupConfig::default()
            .with_rdap_timeout(Duration::from_secs(2))
            .with_max_retries(retries)
            .with_rdap_backoff(Duration::from_millis(10), Duration::from_millis(20));
        RdapHandler::new(&config).unwrap()
    }

    #[test]
    fn test_domain_url() {
        assert_eq!(
            domain_url("https://rdap.verisign.com/com/v1/", "example.com"),
            "https://rdap.verisign.com/com/v1/domain/example.com"
        );
        assert_eq!(
            domain_url("https://rdap.example", "a.test"),
            "https://rdap.example/domain/a.test"
        );
    }

    #[tokio::test]
    async fn test_resolve_base_order() {
        let handler = handler(0);

        let override_record = TldRecord::rdap("com", "https://custom.example/rdap/");
        assert_eq!(
            handler.resolve_base("com", &override_record).await,
            "https://custom.example/rdap/"
        );

        let plain = TldRecord::rdap("com", "");
        assert_eq!(
            handler.resolve_base("com", &plain).await,
            "https://rdap.verisign.com/com/v1/"
        );

        // No bootstrap attached: generic guess on the last label
        assert_eq!(
            handler.resolve_base("co.zz", &TldRecord::rdap("co.zz", "")).await,
            "https://rdap.nic.zz/"
        );
    }

    #[tokio::test]
    async fn test_success_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/domain/example.zz"))
            .and(header("accept", RDAP_MEDIA_TYPE))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "objectClassName": "domain",
                "ldhName": "example.zz"
            })))
            .mount(&server)
            .await;

        let record = TldRecord::rdap("zz", server.uri());
        let outcome = handler(0).query(&domain("example", "zz"), &record).await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.adapter, AdapterKind::Rdap);
        assert!(outcome.raw_payload.contains("\"ldhName\""));
    }

    #[tokio::test]
    async fn test_404_is_synthesized_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let record = TldRecord::rdap("zz", server.uri());
        let outcome = handler(0).query(&domain("free", "zz"), &record).await;

        assert!(outcome.succeeded);
        let body: serde_json::Value = serde_json::from_str(&outcome.raw_payload).unwrap();
        assert_eq!(body["status"], "not found");
        assert_eq!(body["errorCode"], 404);
    }

    #[tokio::test]
    async fn test_server_error_retries_then_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let record = TldRecord::rdap("zz", server.uri());
        let outcome = handler(2).query(&domain("busy", "zz"), &record).await;

        assert!(!outcome.succeeded);
        let body: serde_json::Value = serde_json::from_str(&outcome.raw_payload).unwrap();
        assert_eq!(body["domain"], "busy.zz");
        assert_eq!(body["rdapServer"], server.uri());
        assert!(body["error"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_definitive_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let record = TldRecord::rdap("zz", server.uri());
        let outcome = handler(3).query(&domain("denied", "zz"), &record).await;
        assert!(!outcome.succeeded);
        assert!(outcome.error.unwrap().contains("403"));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(2)
            .mount(&server)
            .await;

        let record = TldRecord::rdap("zz", server.uri());
        let outcome = handler(1).query(&domain("busy", "zz"), &record).await;
        assert!(!outcome.succeeded);
    }

    #[tokio::test]
    async fn test_non_json_body_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let record = TldRecord::rdap("zz", server.uri());
        let outcome = handler(2).query(&domain("example", "zz"), &record).await;
        assert!(!outcome.succeeded);
        assert!(outcome.error.unwrap().contains("not JSON"));
    }
}
