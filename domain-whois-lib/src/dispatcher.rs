//! Lookup orchestration.
//!
//! [`WhoisDispatcher`] ties the pieces together: it splits the input
//! against the TLD registry, picks the query handler named by the TLD's
//! adapter, falls back from RDAP to TCP WHOIS when allowed, and hands the
//! payload to the parser matching the adapter that actually produced it.

use crate::cache::RecordCache;
use crate::concurrent::ConcurrentProcessor;
use crate::dates::DateNormalizer;
use crate::extract::TldExtractor;
use crate::parsers::{
    KeyAliasTable, ParseContext, ParseHandler, ParserKind, PrehandleRegistry, ProtectedWords,
    RdapParser, TextParser,
};
use crate::protocols::{QueryHandler, RdapBootstrapCache, RdapHandler, WhoisTcpHandler};
use crate::registry::{StaticTldRegistry, TldRegistry};
use crate::types::{
    AdapterKind, DomainName, LookupConfig, ParsedRecord, QueryOutcome, TldRecord, STATUS_FAILED,
    STATUS_NO_SERVICE, STATUS_OK,
};
use futures::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Main entry point for WHOIS/RDAP lookups.
///
/// Every lookup returns a [`ParsedRecord`]; network failures, unsupported
/// TLDs and unparseable payloads all come back as records with
/// `parse_success = false` and an `error` message.
///
/// # Example
///
/// ```rust,no_run
/// use domain_whois_lib::WhoisDispatcher;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let dispatcher = WhoisDispatcher::new()?;
///     let record = dispatcher.lookup("example.com").await;
///     println!("available: {}", record.is_available);
///     Ok(())
/// }
/// ```
pub struct WhoisDispatcher {
    config: LookupConfig,
    registry: Arc<dyn TldRegistry>,
    extractor: TldExtractor,
    tcp: Arc<dyn QueryHandler>,
    rdap: Arc<dyn QueryHandler>,
    bootstrap: Option<Arc<RdapBootstrapCache>>,
    dates: Arc<DateNormalizer>,
    aliases: Arc<KeyAliasTable>,
    protected: Arc<ProtectedWords>,
    prehandlers: Arc<PrehandleRegistry>,
    text_parser: TextParser,
    rdap_parser: RdapParser,
    cache: Option<Arc<dyn RecordCache>>,
}

impl WhoisDispatcher {
    /// Dispatcher with default settings and the built-in TLD table.
    pub fn new() -> crate::Result<Self> {
        Self::with_config(LookupConfig::default())
    }

    /// Dispatcher with custom settings and the built-in TLD table.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use domain_whois_lib::{LookupConfig, WhoisDispatcher};
    /// use std::time::Duration;
    ///
    /// let config = LookupConfig::default()
    ///     .with_concurrency(20)
    ///     .with_timeout(Duration::from_secs(8));
    /// let dispatcher = WhoisDispatcher::with_config(config).unwrap();
    /// ```
    pub fn with_config(config: LookupConfig) -> crate::Result<Self> {
        let bootstrap = if config.enable_bootstrap {
            Some(Arc::new(RdapBootstrapCache::new(&config)?))
        } else {
            None
        };

        let mut rdap = RdapHandler::new(&config)?;
        if let Some(bootstrap) = &bootstrap {
            rdap = rdap.with_bootstrap(bootstrap.clone());
        }

        let registry: Arc<dyn TldRegistry> = Arc::new(StaticTldRegistry::builtin());
        let extractor = TldExtractor::from_registry(registry.as_ref());
        let dates = Arc::new(DateNormalizer::new());
        let aliases = Arc::new(KeyAliasTable::default());
        let protected = Arc::new(ProtectedWords::default());
        let prehandlers = Arc::new(PrehandleRegistry::builtin());

        Ok(Self {
            tcp: Arc::new(WhoisTcpHandler::new(&config)),
            rdap: Arc::new(rdap),
            bootstrap,
            registry,
            extractor,
            text_parser: TextParser::new(
                aliases.clone(),
                protected.clone(),
                prehandlers.clone(),
                dates.clone(),
            ),
            rdap_parser: RdapParser::new(dates.clone()),
            dates,
            aliases,
            protected,
            prehandlers,
            cache: None,
            config,
        })
    }

    /// Use `registry` for TLD records and suffix extraction.
    pub fn with_registry(mut self, registry: Arc<dyn TldRegistry>) -> Self {
        self.extractor = TldExtractor::from_registry(registry.as_ref());
        self.registry = registry;
        self
    }

    /// Replace the handler for the handler's own adapter kind.
    pub fn with_query_handler(mut self, handler: Arc<dyn QueryHandler>) -> Self {
        match handler.adapter() {
            AdapterKind::Tcp => self.tcp = handler,
            AdapterKind::Rdap => self.rdap = handler,
            AdapterKind::None => {}
        }
        self
    }

    /// Replace the text parser's alias table and redaction markers.
    pub fn with_parser_tables(mut self, aliases: KeyAliasTable, protected: ProtectedWords) -> Self {
        self.aliases = Arc::new(aliases);
        self.protected = Arc::new(protected);
        self.rebuild_text_parser();
        self
    }

    /// Replace the per-TLD preprocessing strategies.
    pub fn with_prehandlers(mut self, prehandlers: PrehandleRegistry) -> Self {
        self.prehandlers = Arc::new(prehandlers);
        self.rebuild_text_parser();
        self
    }

    /// Memoize successful records in `cache` for `config.cache_ttl`.
    pub fn with_cache(mut self, cache: Arc<dyn RecordCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn rebuild_text_parser(&mut self) {
        self.text_parser = TextParser::new(
            self.aliases.clone(),
            self.protected.clone(),
            self.prehandlers.clone(),
            self.dates.clone(),
        );
    }

    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn TldRegistry> {
        &self.registry
    }

    pub fn extractor(&self) -> &TldExtractor {
        &self.extractor
    }

    /// Bootstrap cache shared with the RDAP handler, when enabled.
    pub fn bootstrap(&self) -> Option<&Arc<RdapBootstrapCache>> {
        self.bootstrap.as_ref()
    }

    /// Split `input` and find the TLD record that governs it.
    ///
    /// Unknown suffixes get a TCP record guessing `whois.nic.<tld>`.
    pub fn resolve(&self, input: &str) -> (DomainName, TldRecord) {
        let name = self.extractor.extract(input);
        let record = self
            .registry
            .get_tld_info(&name.suffix)
            .unwrap_or_else(|| TldRecord::tcp(name.suffix.clone(), format!("whois.nic.{}", name.suffix)));
        (name, record)
    }

    /// Run the query step only, without parsing.
    pub async fn query(&self, input: &str) -> QueryOutcome {
        let (name, record) = self.resolve(input);
        if let Some(problem) = invalid_reason(&name) {
            return QueryOutcome::failure(
                name.normalized.clone(),
                record.adapter,
                "",
                problem.clone(),
                problem,
                Duration::ZERO,
            );
        }
        if record.adapter == AdapterKind::None {
            let message = no_service_message(&name.suffix);
            return QueryOutcome::failure(
                name.registrable(),
                AdapterKind::None,
                "",
                message.clone(),
                message,
                Duration::ZERO,
            );
        }
        self.run_query(&name, &record).await
    }

    async fn run_query(&self, name: &DomainName, record: &TldRecord) -> QueryOutcome {
        let primary = match record.adapter {
            AdapterKind::Rdap => &self.rdap,
            _ => &self.tcp,
        };
        let outcome = primary.query(name, record).await;

        let can_fall_back = !outcome.succeeded
            && outcome.adapter == AdapterKind::Rdap
            && self.config.rdap_tcp_fallback
            && record.tcp_host().is_some();
        if !can_fall_back {
            return outcome;
        }

        info!(
            domain = %outcome.domain,
            error = outcome.error.as_deref().unwrap_or(""),
            "RDAP failed, falling back to TCP WHOIS"
        );
        let mut fallback = self.tcp.query(name, record).await;
        fallback.elapsed_ms += outcome.elapsed_ms;
        if !fallback.succeeded {
            fallback.error = Some(format!(
                "RDAP: {}; WHOIS fallback: {}",
                outcome.error.as_deref().unwrap_or("failed"),
                fallback.error.as_deref().unwrap_or("failed")
            ));
        }
        fallback
    }

    /// Look up one domain and return its normalized record.
    pub async fn lookup(&self, input: &str) -> ParsedRecord {
        let (name, record) = self.resolve(input);

        if let Some(problem) = invalid_reason(&name) {
            return ParsedRecord::failure(name.normalized.clone(), name.suffix.clone(), problem, STATUS_FAILED);
        }
        let domain = name.registrable();

        if record.adapter == AdapterKind::None {
            debug!(domain = %domain, "TLD has no lookup service");
            let mut failure = ParsedRecord::failure(
                domain,
                name.suffix.clone(),
                no_service_message(&name.suffix),
                STATUS_NO_SERVICE,
            );
            failure.adapter = Some(AdapterKind::None);
            return failure;
        }

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&domain) {
                debug!(domain = %domain, "record served from cache");
                return hit;
            }
        }

        let outcome = self.run_query(&name, &record).await;
        let parsed = self.parse_outcome(&name, &record, &outcome);

        if let Some(cache) = &self.cache {
            if parsed.parse_success && parsed.status_code == STATUS_OK {
                cache.set(&domain, parsed.clone(), self.config.cache_ttl);
            }
        }
        parsed
    }

    /// Turn a query outcome into a record with the matching parser.
    fn parse_outcome(&self, name: &DomainName, record: &TldRecord, outcome: &QueryOutcome) -> ParsedRecord {
        let domain = name.registrable();

        // Failure envelopes are never parsed: their wording could read as "not found"
        if !outcome.succeeded {
            let mut failure = ParsedRecord::failure(
                domain,
                name.suffix.clone(),
                outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "Lookup failed".to_string()),
                STATUS_FAILED,
            )
            .with_raw_text(outcome.raw_payload.clone());
            failure.adapter = Some(outcome.adapter);
            return failure;
        }

        let ctx = ParseContext::new(&name.suffix).with_record(record);
        let primary: &dyn ParseHandler = match outcome.adapter {
            AdapterKind::Rdap => &self.rdap_parser,
            _ => &self.text_parser,
        };

        let mut parsed = primary.parse(&domain, &outcome.raw_payload, &ctx);
        if !parsed.parse_success && primary.kind() != ParserKind::Text {
            let generic = self.text_parser.parse(&domain, &outcome.raw_payload, &ctx);
            if generic.parse_success {
                debug!(domain = %domain, "generic parser recovered the payload");
                parsed = generic;
            }
        }
        parsed.adapter = Some(outcome.adapter);
        parsed
    }

    /// Look up many domains with bounded concurrency.
    ///
    /// Results are in input order; a failing domain never affects others.
    pub async fn lookup_many(&self, inputs: &[String]) -> Vec<ParsedRecord> {
        self.processor()
            .run(inputs.to_vec(), |input| async move { self.lookup(&input).await })
            .await
    }

    /// Like [`lookup_many`](Self::lookup_many), yielding records as they finish.
    pub fn lookup_stream<'a>(
        &'a self,
        inputs: Vec<String>,
    ) -> Pin<Box<dyn Stream<Item = ParsedRecord> + Send + 'a>> {
        self.processor()
            .stream(inputs, move |input| async move { self.lookup(&input).await })
    }

    fn processor(&self) -> ConcurrentProcessor {
        ConcurrentProcessor::new(self.config.concurrency).with_pacing(self.config.pacing)
    }
}

fn invalid_reason(name: &DomainName) -> Option<String> {
    if name.normalized.is_empty() {
        return Some("Invalid domain '': empty input".to_string());
    }
    if name.suffix.is_empty() || name.prefix.is_empty() {
        return Some(format!(
            "Invalid domain '{}': expected a name with a TLD, e.g. example.com",
            name.normalized
        ));
    }
    None
}

fn no_service_message(tld: &str) -> String {
    format!("No WHOIS service is available for .{} domains", tld)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Handler double answering from a fixed payload.
    struct FixedHandler {
        adapter: AdapterKind,
        payload: &'static str,
        succeeded: bool,
        calls: AtomicUsize,
    }

    impl FixedHandler {
        fn new(adapter: AdapterKind, payload: &'static str, succeeded: bool) -> Arc<Self> {
            Arc::new(Self {
                adapter,
                payload,
                succeeded,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl QueryHandler for FixedHandler {
        fn adapter(&self) -> AdapterKind {
            self.adapter
        }

        async fn query(&self, domain: &DomainName, _record: &TldRecord) -> QueryOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeeded {
                QueryOutcome::success(domain.registrable(), self.adapter, "fixed", self.payload, Duration::ZERO)
            } else {
                QueryOutcome::failure(
                    domain.registrable(),
                    self.adapter,
                    "fixed",
                    self.payload,
                    "upstream down",
                    Duration::ZERO,
                )
            }
        }
    }

    fn dispatcher(records: Vec<TldRecord>) -> WhoisDispatcher {
        WhoisDispatcher::with_config(LookupConfig::default().with_bootstrap(false))
            .unwrap()
            .with_registry(Arc::new(StaticTldRegistry::from_records(records)))
    }

    #[tokio::test]
    async fn test_none_adapter_short_circuits() {
        let tcp = FixedHandler::new(AdapterKind::Tcp, "unused", true);
        let dispatcher = dispatcher(vec![TldRecord::none("zz")]).with_query_handler(tcp.clone());

        let record = dispatcher.lookup("example.zz").await;
        assert_eq!(record.status_code, STATUS_NO_SERVICE);
        assert!(!record.parse_success);
        assert!(!record.is_available);
        assert_eq!(tcp.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tcp_payload_goes_to_text_parser() {
        let tcp = FixedHandler::new(AdapterKind::Tcp, "Domain Name: example.zz\nRegistrar: Fixed Registrar\n", true);
        let dispatcher = dispatcher(vec![TldRecord::tcp("zz", "whois.zz")]).with_query_handler(tcp);

        let record = dispatcher.lookup("https://www.Example.zz/path").await;
        assert!(record.parse_success);
        assert_eq!(record.domain_name, "example.zz");
        assert_eq!(record.adapter, Some(AdapterKind::Tcp));
        assert_eq!(record.formatted.registrar.name(), Some("Fixed Registrar"));
    }

    #[tokio::test]
    async fn test_rdap_failure_falls_back_to_tcp() {
        let rdap = FixedHandler::new(AdapterKind::Rdap, "{\"error\":\"down\"}", false);
        let tcp = FixedHandler::new(AdapterKind::Tcp, "Domain Name: example.zz\nRegistrar: Via Fallback\n", true);
        let dispatcher = dispatcher(vec![TldRecord::rdap("zz", "").with_fallback_host("whois.zz")])
            .with_query_handler(rdap.clone())
            .with_query_handler(tcp.clone());

        let record = dispatcher.lookup("example.zz").await;
        assert_eq!(rdap.calls.load(Ordering::SeqCst), 1);
        assert_eq!(tcp.calls.load(Ordering::SeqCst), 1);
        assert_eq!(record.adapter, Some(AdapterKind::Tcp));
        assert_eq!(record.formatted.registrar.name(), Some("Via Fallback"));
    }

    #[tokio::test]
    async fn test_no_fallback_without_tcp_host() {
        let rdap = FixedHandler::new(AdapterKind::Rdap, "{\"error\":\"down\"}", false);
        let tcp = FixedHandler::new(AdapterKind::Tcp, "unused", true);
        let dispatcher = dispatcher(vec![TldRecord::rdap("zz", "")])
            .with_query_handler(rdap)
            .with_query_handler(tcp.clone());

        let record = dispatcher.lookup("example.zz").await;
        assert_eq!(tcp.calls.load(Ordering::SeqCst), 0);
        assert_eq!(record.status_code, STATUS_FAILED);
        assert_eq!(record.error.as_deref(), Some("upstream down"));
    }

    #[tokio::test]
    async fn test_failure_envelope_is_not_parsed() {
        // The envelope wording would otherwise match a "not found" phrase
        let tcp = FixedHandler::new(AdapterKind::Tcp, "No WHOIS data found for example.zz: domain not found", false);
        let dispatcher = dispatcher(vec![TldRecord::tcp("zz", "whois.zz")]).with_query_handler(tcp);

        let record = dispatcher.lookup("example.zz").await;
        assert!(!record.is_available);
        assert!(!record.parse_success);
        assert_eq!(record.status_code, STATUS_FAILED);
        assert!(record.raw_text.unwrap().contains("No WHOIS data"));
    }

    #[tokio::test]
    async fn test_rdap_parse_failure_retries_generic_parser() {
        let rdap = FixedHandler::new(AdapterKind::Rdap, "Domain Name: example.zz\nRegistrar: Plain Text\n", true);
        let dispatcher = dispatcher(vec![TldRecord::rdap("zz", "")]).with_query_handler(rdap);

        let record = dispatcher.lookup("example.zz").await;
        assert!(record.parse_success);
        assert_eq!(record.formatted.registrar.name(), Some("Plain Text"));
        assert_eq!(record.adapter, Some(AdapterKind::Rdap));
    }

    #[tokio::test]
    async fn test_unknown_tld_guesses_nic_host() {
        let dispatcher = dispatcher(Vec::new());
        let (name, record) = dispatcher.resolve("example.qq");
        assert_eq!(name.suffix, "qq");
        assert_eq!(record.adapter, AdapterKind::Tcp);
        assert_eq!(record.host, "whois.nic.qq");
    }

    #[tokio::test]
    async fn test_invalid_input_fails_without_query() {
        let tcp = FixedHandler::new(AdapterKind::Tcp, "unused", true);
        let dispatcher = dispatcher(Vec::new()).with_query_handler(tcp.clone());

        let record = dispatcher.lookup("localhost").await;
        assert!(!record.parse_success);
        assert!(record.error.unwrap().contains("Invalid domain"));
        assert_eq!(tcp.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_lookups() {
        let tcp = FixedHandler::new(AdapterKind::Tcp, "Domain Name: example.zz\nRegistrar: Cached\n", true);
        let cache = Arc::new(MemoryCache::new());
        let dispatcher = dispatcher(vec![TldRecord::tcp("zz", "whois.zz")])
            .with_query_handler(tcp.clone())
            .with_cache(cache.clone());

        let first = dispatcher.lookup("example.zz").await;
        let second = dispatcher.lookup("EXAMPLE.zz").await;
        assert_eq!(first, second);
        assert_eq!(tcp.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_many_keeps_order() {
        let tcp = FixedHandler::new(AdapterKind::Tcp, "Domain Name: x\nRegistrar: Any\n", true);
        let dispatcher = dispatcher(vec![TldRecord::tcp("zz", "whois.zz"), TldRecord::none("yy")])
            .with_query_handler(tcp);

        let inputs = vec!["a.zz".to_string(), "b.yy".to_string(), "c.zz".to_string()];
        let records = dispatcher.lookup_many(&inputs).await;
        let names: Vec<&str> = records.iter().map(|r| r.domain_name.as_str()).collect();
        assert_eq!(names, vec!["a.zz", "b.yy", "c.zz"]);
        assert_eq!(records[1].status_code, STATUS_NO_SERVICE);
    }
}
