//! Plaintext WHOIS over TCP port 43.
//!
//! One exchange is: connect, write `"<domain>\r\n"`, read until the server
//! closes. The whole exchange runs under a single wall-clock timeout, and
//! failed or suspiciously terse answers are retried once against an
//! alternate server for the TLD.

use super::QueryHandler;
use crate::error::WhoisError;
use crate::types::{AdapterKind, DomainName, LookupConfig, QueryOutcome, TldRecord};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Responses are truncated at this many bytes.
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// "Not found" answers shorter than this may come from the wrong server.
const SHORT_RESPONSE_CHARS: usize = 200;

/// Backup servers for TLDs whose primary is known to be flaky.
const BACKUP_SERVERS: &[(&str, &[&str])] = &[
    ("com", &["whois.verisign-grs.com", "whois.internic.net"]),
    ("net", &["whois.verisign-grs.com", "whois.internic.net"]),
    ("org", &["whois.pir.org", "whois.publicinterestregistry.net"]),
    ("io", &["whois.nic.io", "whois.iana.org"]),
    ("cc", &["whois.nic.cc", "ccwhois.verisign-grs.com"]),
    ("co", &["whois.nic.co", "whois.iana.org"]),
    ("ai", &["whois.nic.ai", "whois.offshore.ai"]),
];

/// Generic phrases used to spot a terse "not found" answer.
const NOT_FOUND_HINTS: &[&str] = &[
    "no match",
    "not found",
    "no data found",
    "domain not found",
    "no entries found",
    "not found in database",
    "domain not exist",
    "no information available",
    "no object found",
];

const RATE_LIMIT_HINTS: &[&str] = &[
    "rate limit exceeded",
    "too many requests",
    "try again later",
    "quota exceeded",
    "limit exceeded",
    "throttled",
    "rate-limited",
];

/// TCP WHOIS query handler.
#[derive(Debug, Clone)]
pub struct WhoisTcpHandler {
    timeout: Duration,
    port: u16,
    max_retries: u32,
    retry_delay: Duration,
    backups: HashMap<String, Vec<String>>,
}

impl Default for WhoisTcpHandler {
    fn default() -> Self {
        Self::new(&LookupConfig::default())
    }
}

impl WhoisTcpHandler {
    pub fn new(config: &LookupConfig) -> Self {
        let backups = BACKUP_SERVERS
            .iter()
            .map(|(tld, servers)| {
                (
                    tld.to_string(),
                    servers.iter().map(|s| s.to_string()).collect(),
                )
            })
            .collect();

        Self {
            timeout: config.whois_timeout,
            port: config.whois_port,
            max_retries: config.whois_max_retries,
            retry_delay: config.whois_retry_delay,
            backups,
        }
    }

    /// Replace the backup server list of `tld`.
    pub fn with_backup_servers<T, I, S>(mut self, tld: T, servers: I) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backups.insert(
            tld.into().to_lowercase(),
            servers.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Next server to try for `tld`, skipping everything in `tried`.
    ///
    /// Backup servers come first, then the `whois.nic.<tld>` guess.
    pub fn alternate_server(&self, tld: &str, tried: &HashSet<String>) -> Option<String> {
        let tld = tld.to_lowercase();
        if let Some(server) = self
            .backups
            .get(&tld)
            .and_then(|servers| servers.iter().find(|s| !tried.contains(s.as_str())))
        {
            return Some(server.clone());
        }

        let guess = format!("whois.nic.{}", tld);
        if tried.contains(&guess) {
            None
        } else {
            Some(guess)
        }
    }

    /// One timed exchange with `server` (`host` or `host:port`).
    pub async fn query_server(&self, server: &str, domain: &str) -> Result<String, WhoisError> {
        let (host, port) = split_host_port(server, self.port);
        debug!(server = %server, domain = %domain, "WHOIS query");

        match tokio::time::timeout(self.timeout, exchange(&host, port, domain)).await {
            Ok(result) => result,
            Err(_) => Err(WhoisError::timeout(
                format!("WHOIS query to {}", server),
                self.timeout,
            )),
        }
    }
}

async fn exchange(host: &str, port: u16, domain: &str) -> Result<String, WhoisError> {
    let mut stream = TcpStream::connect((host, port)).await.map_err(|e| {
        WhoisError::network_with_source(format!("Cannot connect to {}:{}", host, port), e.to_string())
    })?;

    stream.write_all(format!("{}\r\n", domain).as_bytes()).await?;

    let mut buffer = Vec::with_capacity(8 * 1024);
    let mut chunk = [0u8; 8 * 1024];
    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        let room = MAX_RESPONSE_BYTES - buffer.len();
        buffer.extend_from_slice(&chunk[..read.min(room)]);
        if buffer.len() >= MAX_RESPONSE_BYTES {
            warn!(host, domain, "WHOIS response truncated at {} bytes", MAX_RESPONSE_BYTES);
            break;
        }
    }

    Ok(clean_response(&buffer))
}

/// Split `host:port`, falling back to `default_port`.
///
/// Bare IPv6 literals are left alone; use `[addr]:port` to set a port.
pub fn split_host_port(server: &str, default_port: u16) -> (String, u16) {
    let server = server.trim();
    if let Some(rest) = server.strip_prefix('[') {
        if let Some((addr, port)) = rest.split_once("]:") {
            if let Ok(port) = port.parse() {
                return (addr.to_string(), port);
            }
        }
        return (rest.trim_end_matches(']').to_string(), default_port);
    }
    match server.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (server.to_string(), default_port),
        },
        _ => (server.to_string(), default_port),
    }
}

/// Lossy UTF-8 decode with C0 control characters removed (CR and LF kept).
pub fn clean_response(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| !matches!(*c, '\u{0}'..='\u{9}' | '\u{b}'..='\u{c}' | '\u{e}'..='\u{1f}'))
        .collect()
}

fn looks_not_found(text: &str, record: &TldRecord) -> bool {
    let lower = text.to_lowercase();
    NOT_FOUND_HINTS.iter().any(|hint| lower.contains(hint))
        || record
            .availability_patterns
            .iter()
            .any(|p| lower.contains(&p.to_lowercase()))
}

fn looks_rate_limited(text: &str) -> bool {
    let lower = text.to_lowercase();
    RATE_LIMIT_HINTS.iter().any(|hint| lower.contains(hint))
}

#[async_trait]
impl QueryHandler for WhoisTcpHandler {
    fn adapter(&self) -> AdapterKind {
        AdapterKind::Tcp
    }

    async fn query(&self, domain: &DomainName, record: &TldRecord) -> QueryOutcome {
        let started = Instant::now();
        let name = domain.registrable();
        let tld = if domain.suffix.is_empty() {
            record.tld.to_lowercase()
        } else {
            domain.suffix.to_lowercase()
        };

        let mut server = record
            .tcp_host()
            .map(String::from)
            .unwrap_or_else(|| format!("whois.nic.{}", tld));
        let mut tried = HashSet::new();
        let mut attempt = 0u32;
        // Short "not found" answer kept while an alternate server is asked
        let mut earlier: Option<(String, String)> = None;

        let error = loop {
            tried.insert(server.clone());

            let error = match self.query_server(&server, &name).await {
                Ok(text) if !text.trim().is_empty() => {
                    if looks_rate_limited(&text) {
                        warn!(server = %server, domain = %name, "WHOIS server appears to rate limit us");
                    }

                    let terse = text.chars().count() < SHORT_RESPONSE_CHARS && looks_not_found(&text, record);
                    if terse && attempt < self.max_retries {
                        if let Some(next) = self.alternate_server(&tld, &tried) {
                            info!(
                                domain = %name,
                                from = %server,
                                to = %next,
                                "short not-found answer, asking alternate server"
                            );
                            earlier = Some((server, text));
                            server = next;
                            attempt += 1;
                            continue;
                        }
                    }
                    return QueryOutcome::success(&name, AdapterKind::Tcp, server, text, started.elapsed());
                }
                Ok(_) => WhoisError::protocol(&server, "Empty response"),
                Err(e) => e,
            };

            if let Some((earlier_server, text)) = earlier.take() {
                debug!(domain = %name, server = %server, error = %error, "alternate failed, keeping earlier answer");
                return QueryOutcome::success(&name, AdapterKind::Tcp, earlier_server, text, started.elapsed());
            }

            if attempt < self.max_retries && error.is_retryable() {
                if let Some(next) = self.alternate_server(&tld, &tried) {
                    info!(
                        domain = %name,
                        failed = %server,
                        next = %next,
                        error = %error,
                        "WHOIS query failed, retrying on alternate server"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    server = next;
                    attempt += 1;
                    continue;
                }
            }
            break error;
        };

        warn!(domain = %name, server = %server, error = %error, "WHOIS query failed");
        let envelope = format!(
            "No WHOIS data found for {} (last server tried: {}). Error: {}",
            name, server, error
        );
        QueryOutcome::failure(
            name,
            AdapterKind::Tcp,
            server,
            envelope,
            error.to_string(),
            started.elapsed(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    /// Serve `reply` to every connection and report the request lines seen.
    async fn serve(reply: &'static str) -> (String, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let (read, mut write) = socket.into_split();
                    let mut line = String::new();
                    let mut reader = BufReader::new(read);
                    let _ = reader.read_line(&mut line).await;
                    let _ = tx.send(line);
                    let _ = write.write_all(reply.as_bytes()).await;
                });
            }
        });
        (addr, rx)
    }

    /// An address nothing listens on.
    async fn closed_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        addr
    }

    fn domain(name: &str, suffix: &str) -> DomainName {
        DomainName {
            raw: format!("{}.{}", name, suffix),
            normalized: format!("{}.{}", name, suffix),
            prefix: name.to_string(),
            suffix: suffix.to_string(),
            ..DomainName::default()
        }
    }

    fn handler(retries: u32) -> WhoisTcpHandler {
        let config = LookupConfig::default()
            .with_whois_timeout(Duration::from_millis(500))
            .with_whois_retry_delay(Duration::from_millis(10))
            .with_max_retries(retries);
        WhoisTcpHandler::new(&config)
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("whois.nic.io", 43), ("whois.nic.io".to_string(), 43));
        assert_eq!(split_host_port("127.0.0.1:4343", 43), ("127.0.0.1".to_string(), 4343));
        assert_eq!(split_host_port("[::1]:4343", 43), ("::1".to_string(), 4343));
        assert_eq!(split_host_port("::1", 43), ("::1".to_string(), 43));
        assert_eq!(split_host_port("host:notaport", 43), ("host:notaport".to_string(), 43));
    }

    #[test]
    fn test_clean_response_strips_control_chars() {
        let cleaned = clean_response(b"Domain\x00 Name:\x07 a.io\r\n\tStatus: ok\x1b\n");
        assert_eq!(cleaned, "Domain Name: a.io\r\nStatus: ok\n");
        assert_eq!(clean_response(&[0x66, 0xff, 0x6f]), "f\u{fffd}o");
    }

    #[test]
    fn test_alternate_server_order() {
        let handler = WhoisTcpHandler::default();
        let mut tried = HashSet::new();
        tried.insert("whois.verisign-grs.com".to_string());
        assert_eq!(
            handler.alternate_server("com", &tried).as_deref(),
            Some("whois.internic.net")
        );
        tried.insert("whois.internic.net".to_string());
        assert_eq!(handler.alternate_server("com", &tried).as_deref(), Some("whois.nic.com"));
        tried.insert("whois.nic.com".to_string());
        assert_eq!(handler.alternate_server("com", &tried), None);

        assert_eq!(
            handler.alternate_server("xyz", &HashSet::new()).as_deref(),
            Some("whois.nic.xyz")
        );
    }

    #[tokio::test]
    async fn test_query_sends_domain_line() {
        let (addr, mut requests) = serve("Domain Name: EXAMPLE.ZZ\r\nRegistrar: Test Registrar\r\n").await;
        let record = TldRecord::tcp("zz", addr.clone());

        let outcome = handler(0).query(&domain("example", "zz"), &record).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.server, addr);
        assert!(outcome.raw_payload.contains("Test Registrar"));
        assert_eq!(requests.recv().await.unwrap(), "example.zz\r\n");
    }

    #[tokio::test]
    async fn test_silent_server_times_out_with_envelope() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let handler = WhoisTcpHandler::new(
            &LookupConfig::default()
                .with_whois_timeout(Duration::from_millis(150))
                .with_max_retries(0),
        );
        let outcome = handler.query(&domain("slow", "zz"), &TldRecord::tcp("zz", addr.clone())).await;

        assert!(!outcome.succeeded);
        assert!(outcome.raw_payload.contains("slow.zz"));
        assert!(outcome.raw_payload.contains(&addr));
        assert!(outcome.error.unwrap().starts_with("Timeout after"));
    }

    #[tokio::test]
    async fn test_short_not_found_retries_alternate() {
        let (primary, _) = serve("No match for \"EXAMPLE.ZZ\".\r\n").await;
        let (backup, _) = serve("Domain Name: EXAMPLE.ZZ\r\nRegistrar: Real Registrar\r\n").await;

        let handler = handler(1).with_backup_servers("zz", vec![backup.clone()]);
        let outcome = handler
            .query(&domain("example", "zz"), &TldRecord::tcp("zz", primary))
            .await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.server, backup);
        assert!(outcome.raw_payload.contains("Real Registrar"));
    }

    #[tokio::test]
    async fn test_failed_alternate_keeps_earlier_answer() {
        let (primary, _) = serve("No match for \"EXAMPLE.ZZ\".\r\n").await;
        let dead = closed_addr().await;

        let handler = handler(1).with_backup_servers("zz", vec![dead]);
        let outcome = handler
            .query(&domain("example", "zz"), &TldRecord::tcp("zz", primary.clone()))
            .await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.server, primary);
        assert!(outcome.raw_payload.starts_with("No match for"));
    }

    #[tokio::test]
    async fn test_connection_error_moves_to_backup() {
        let dead = closed_addr().await;
        let (backup, _) = serve("Domain Name: EXAMPLE.ZZ\r\n").await;

        let handler = handler(1).with_backup_servers("zz", vec![backup.clone()]);
        let outcome = handler.query(&domain("example", "zz"), &TldRecord::tcp("zz", dead)).await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.server, backup);
    }

    #[tokio::test]
    async fn test_response_is_capped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut line = [0u8; 64];
                let _ = socket.read(&mut line).await;
                let payload = vec![b'a'; MAX_RESPONSE_BYTES + 512 * 1024];
                let _ = socket.write_all(&payload).await;
            }
        });

        let handler = WhoisTcpHandler::new(
            &LookupConfig::default()
                .with_whois_timeout(Duration::from_secs(5))
                .with_max_retries(0),
        );
        let text = handler.query_server(&addr, "big.zz").await.unwrap();
        assert_eq!(text.len(), MAX_RESPONSE_BYTES);
    }
}
