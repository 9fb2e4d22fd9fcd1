//! End-to-end tests against local WHOIS and RDAP doubles.
//!
//! Nothing here touches the public internet: TCP WHOIS servers are
//! `TcpListener`s on 127.0.0.1 and RDAP endpoints are wiremock servers.

use domain_whois_lib::protocols::BootstrapSnapshot;
use domain_whois_lib::{
    AdapterKind, LookupConfig, MemoryCache, RecordCache, StaticTldRegistry, TldRecord,
    WhoisDispatcher, STATUS_FAILED, STATUS_NO_SERVICE, STATUS_OK,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// WHOIS server answering every query with a registered-domain record.
async fn registered_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (read, mut write) = socket.into_split();
                let mut reader = BufReader::new(read);
                let mut line = String::new();
                let _ = reader.read_line(&mut line).await;
                let domain = line.trim().to_uppercase();
                let reply = format!(
                    "Domain Name: {}\r\n\
                     Registrar: Example Registrar, Inc.\r\n\
                     Creation Date: 2020-01-15T00:00:00Z\r\n\
                     Registry Expiry Date: 2030-01-15T00:00:00Z\r\n\
                     Name Server: NS1.EXAMPLE.NET\r\n\
                     Registrant Name: REDACTED FOR PRIVACY\r\n",
                    domain
                );
                let _ = write.write_all(reply.as_bytes()).await;
            });
        }
    });
    addr
}

/// WHOIS server that accepts connections and never answers.
async fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

fn offline_config() -> LookupConfig {
    LookupConfig::default()
        .with_bootstrap(false)
        .with_whois_timeout(Duration::from_millis(300))
        .with_rdap_timeout(Duration::from_secs(2))
        .with_whois_retry_delay(Duration::from_millis(10))
        .with_rdap_backoff(Duration::from_millis(10), Duration::from_millis(20))
        .with_max_retries(0)
}

fn dispatcher(config: LookupConfig, records: Vec<TldRecord>) -> WhoisDispatcher {
    WhoisDispatcher::with_config(config)
        .unwrap()
        .with_registry(Arc::new(StaticTldRegistry::from_records(records)))
}

fn rdap_body(name: &str) -> serde_json::Value {
    json!({
        "objectClassName": "domain",
        "handle": "2336799_DOMAIN_ZZ-VRSN",
        "ldhName": name.to_uppercase(),
        "status": ["client transfer prohibited"],
        "events": [
            {"eventAction": "registration", "eventDate": "1995-08-14T04:00:00Z"},
            {"eventAction": "expiration", "eventDate": "2030-08-13T04:00:00Z"}
        ],
        "entities": [{
            "objectClassName": "entity",
            "roles": ["registrar"],
            "vcardArray": ["vcard", [
                ["version", {}, "text", "4.0"],
                ["fn", {}, "text", "RDAP Registrar LLC"]
            ]]
        }],
        "nameservers": [
            {"objectClassName": "nameserver", "ldhName": "A.NS.ZZ"}
        ]
    })
}

#[tokio::test]
async fn test_tcp_lookup_end_to_end() {
    let good = registered_server().await;
    let dispatcher = dispatcher(offline_config(), vec![TldRecord::tcp("test", good)]);

    let record = dispatcher.lookup("WWW.Example.TEST").await;

    assert!(record.parse_success, "error: {:?}", record.error);
    assert_eq!(record.status_code, STATUS_OK);
    assert_eq!(record.domain_name, "example.test");
    assert_eq!(record.adapter, Some(AdapterKind::Tcp));
    assert!(!record.is_available);
    assert_eq!(record.formatted.domain.name.as_deref(), Some("example.test"));
    assert_eq!(record.formatted.registrar.name(), Some("Example Registrar, Inc."));
    assert_eq!(
        record.formatted.domain.created.as_ref().map(|d| d.utc.as_str()),
        Some("2020-01-15T00:00:00.000Z")
    );
    assert_eq!(record.formatted.domain.name_servers, vec!["ns1.example.net"]);
    assert_eq!(record.formatted.registrant.name(), None);
}

#[tokio::test]
async fn test_batch_isolates_a_silent_server() {
    let good = registered_server().await;
    let silent = silent_server().await;
    let config = offline_config().with_concurrency(10);
    let dispatcher = dispatcher(
        config,
        vec![TldRecord::tcp("test", good), TldRecord::tcp("slow", silent)],
    );

    let mut inputs: Vec<String> = (0..49).map(|i| format!("domain{}.test", i)).collect();
    inputs.insert(17, "stuck.slow".to_string());

    let records = dispatcher.lookup_many(&inputs).await;
    assert_eq!(records.len(), 50);

    for (input, record) in inputs.iter().zip(&records) {
        assert_eq!(&record.domain_name, input);
        if input == "stuck.slow" {
            assert!(!record.parse_success);
            assert!(!record.is_available);
            assert_eq!(record.status_code, STATUS_FAILED);
            let error = record.error.as_deref().unwrap_or("");
            assert!(error.starts_with("Timeout after"), "unexpected error: {}", error);
        } else {
            assert!(record.parse_success, "{} failed: {:?}", input, record.error);
            assert_eq!(record.formatted.domain.name.as_deref(), Some(input.as_str()));
        }
    }
}

#[tokio::test]
async fn test_rdap_404_means_available() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/domain/free.zz"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dispatcher = dispatcher(offline_config(), vec![TldRecord::rdap("zz", server.uri())]);
    let record = dispatcher.lookup("free.zz").await;

    assert!(record.is_available);
    assert_eq!(record.adapter, Some(AdapterKind::Rdap));
    assert!(record.formatted.domain.name.is_none());
    assert!(record.formatted.registrar.name().is_none());
}

#[tokio::test]
async fn test_rdap_lookup_maps_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/domain/taken.zz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rdap_body("taken.zz")))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = dispatcher(offline_config(), vec![TldRecord::rdap("zz", server.uri())]);
    let record = dispatcher.lookup("taken.zz").await;

    assert!(record.parse_success, "error: {:?}", record.error);
    assert!(!record.is_available);
    assert_eq!(record.formatted.domain.name.as_deref(), Some("taken.zz"));
    assert_eq!(record.formatted.registrar.name(), Some("RDAP Registrar LLC"));
    assert_eq!(record.formatted.domain.status, vec!["client transfer prohibited"]);
    assert_eq!(
        record.formatted.domain.expired.as_ref().map(|d| d.utc.as_str()),
        Some("2030-08-13T04:00:00.000Z")
    );
}

#[tokio::test]
async fn test_stale_bootstrap_still_resolves() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/domain/example.zz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rdap_body("example.zz")))
        .mount(&server)
        .await;

    // Snapshot fetched long ago, pointing .zz at the mock server
    let mut snapshot = BootstrapSnapshot::from_registry_json(&json!({
        "services": [[["zz"], [format!("{}/", server.uri())]]]
    }))
    .unwrap();
    snapshot.fetched_at = 1_000;
    let dir = tempfile::tempdir().unwrap();
    let cache_file = dir.path().join("bootstrap.json");
    std::fs::write(&cache_file, serde_json::to_string(&snapshot).unwrap()).unwrap();

    // The bootstrap source itself is unreachable
    let config = offline_config()
        .with_bootstrap(true)
        .with_bootstrap_url("http://127.0.0.1:1/rdap/dns.json")
        .with_bootstrap_cache_file(&cache_file);
    let dispatcher = dispatcher(config, vec![TldRecord::rdap("zz", "")]);

    let record = dispatcher.lookup("example.zz").await;
    assert!(record.parse_success, "error: {:?}", record.error);
    assert_eq!(record.formatted.domain.name.as_deref(), Some("example.zz"));

    let bootstrap = dispatcher.bootstrap().unwrap();
    assert_eq!(bootstrap.current().unwrap().fetched_at, 1_000);
}

#[tokio::test]
async fn test_bootstrap_refresh_is_persisted() {
    let registry = MockServer::start().await;
    let rdap = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rdap/dns.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "version": "1.0",
            "services": [[["zz", "yy"], [format!("{}/", rdap.uri())]]]
        })))
        .expect(1)
        .mount(&registry)
        .await;
    Mock::given(method("GET"))
        .and(path("/domain/fresh.zz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rdap_body("fresh.zz")))
        .mount(&rdap)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache_file = dir.path().join("nested").join("bootstrap.json");
    let config = offline_config()
        .with_bootstrap(true)
        .with_bootstrap_url(format!("{}/rdap/dns.json", registry.uri()))
        .with_bootstrap_cache_file(&cache_file);
    let dispatcher = dispatcher(config, vec![TldRecord::rdap("zz", "")]);

    let record = dispatcher.lookup("fresh.zz").await;
    assert!(record.parse_success, "error: {:?}", record.error);

    let saved: BootstrapSnapshot =
        serde_json::from_str(&std::fs::read_to_string(&cache_file).unwrap()).unwrap();
    assert_eq!(saved.tld_count(), 2);
}

#[tokio::test]
async fn test_rdap_failure_falls_back_to_tcp() {
    let good = registered_server().await;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let record = TldRecord::rdap("zz", server.uri()).with_fallback_host(good);
    let dispatcher = dispatcher(offline_config(), vec![record]);

    let parsed = dispatcher.lookup("fallback.zz").await;
    assert!(parsed.parse_success, "error: {:?}", parsed.error);
    assert_eq!(parsed.adapter, Some(AdapterKind::Tcp));
    assert_eq!(parsed.formatted.registrar.name(), Some("Example Registrar, Inc."));
}

#[tokio::test]
async fn test_rdap_failure_without_fallback_reports_error() {
    let good = registered_server().await;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let record = TldRecord::rdap("zz", server.uri()).with_fallback_host(good);
    let config = offline_config().with_tcp_fallback(false);
    let dispatcher = dispatcher(config, vec![record]);

    let parsed = dispatcher.lookup("nofallback.zz").await;
    assert!(!parsed.parse_success);
    assert!(!parsed.is_available);
    assert_eq!(parsed.adapter, Some(AdapterKind::Rdap));
    assert!(parsed.error.unwrap().contains("503"));
}

#[tokio::test]
async fn test_none_adapter_is_offline_404() {
    let dispatcher = dispatcher(offline_config(), vec![TldRecord::none("es")]);

    let record = dispatcher.lookup("example.es").await;
    assert_eq!(record.status_code, STATUS_NO_SERVICE);
    assert_eq!(record.adapter, Some(AdapterKind::None));
    assert!(!record.is_available);
    assert!(record.error.is_some());
    assert_eq!(record.formatted.registrant.key, "Registrant");
}

#[tokio::test]
async fn test_cache_serves_second_lookup() {
    let good = registered_server().await;
    let cache = Arc::new(MemoryCache::new());
    let dispatcher = dispatcher(offline_config(), vec![TldRecord::tcp("test", good)])
        .with_cache(cache.clone());

    let first = dispatcher.lookup("cached.test").await;
    assert!(first.parse_success);
    assert!(cache.get("cached.test").is_some());

    let second = dispatcher.lookup("cached.test").await;
    assert_eq!(first, second);
}
