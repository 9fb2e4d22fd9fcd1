//! Terminal display for domain-whois.
//!
//! Styled record blocks, streaming result lines, the spinner, summaries and
//! the TLD listing. Uses only the `console` crate; status chatter goes to
//! stderr so stdout carries results alone.

use console::{pad_str, style, Alignment, Term};
use domain_whois_lib::{
    AdapterKind, ContactBlock, DateField, ParsedRecord, QueryOutcome, TldRecord, STATUS_NO_SERVICE,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::{Args, ErrorStats};

// ── Spinner ──────────────────────────────────────────────────────────────────

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// An async braille-dot spinner that writes to stderr so stdout stays clean.
pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Spinner {
    pub fn start(message: String) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let handle = tokio::spawn(async move {
            let term = Term::stderr();
            let mut idx = 0usize;
            while running_clone.load(Ordering::Relaxed) {
                let frame = SPINNER_FRAMES[idx % SPINNER_FRAMES.len()];
                let _ = term.clear_line();
                let _ = term.write_str(&format!("{} {}", style(frame).cyan(), message));
                idx += 1;
                tokio::time::sleep(Duration::from_millis(80)).await;
            }
            let _ = term.clear_line();
        });

        Self {
            running,
            handle: Some(handle),
        }
    }

    /// Stop the spinner and clear the line.
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.await;
        }
    }
}

pub fn stderr_is_term() -> bool {
    Term::stderr().is_term()
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), message);
}

// ── Header ───────────────────────────────────────────────────────────────────

pub fn print_header(domain_count: usize, concurrency: usize) {
    println!(
        "{} {} {}",
        style("domain-whois").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!(
            "- Looking up {} domain{}",
            domain_count,
            if domain_count == 1 { "" } else { "s" }
        ))
        .dim(),
    );
    println!("{}", style(format!("Concurrency: {}", concurrency)).dim());
    println!();
}

// ── Status ───────────────────────────────────────────────────────────────────

fn status_text(record: &ParsedRecord) -> &'static str {
    if record.is_available {
        "AVAILABLE"
    } else if record.is_reserved {
        "RESERVED"
    } else if record.parse_success {
        "REGISTERED"
    } else if record.status_code == STATUS_NO_SERVICE {
        "NO SERVICE"
    } else {
        "UNKNOWN"
    }
}

fn status_label(record: &ParsedRecord) -> console::StyledObject<&'static str> {
    let text = status_text(record);
    match text {
        "AVAILABLE" => style(text).green().bold(),
        "RESERVED" => style(text).magenta().bold(),
        "REGISTERED" => style(text).red().bold(),
        _ => style(text).yellow(),
    }
}

/// One line per record, for streaming output.
///
/// If `counter` is Some((current, total)), a progress prefix like `[3/8]` is shown.
pub fn print_result_line(record: &ParsedRecord, debug: bool, counter: Option<(usize, usize)>) {
    let padded = pad_str(&record.domain_name, 30, Alignment::Left, Some(".."));
    let prefix = match counter {
        Some((cur, total)) => format!("{} ", style(format!("[{}/{}]", cur, total)).dim()),
        None => String::new(),
    };

    let detail = if record.parse_success {
        summary_info(record)
            .map(|info| format!("  {}", style(info).dim()))
            .unwrap_or_default()
    } else {
        format!("  {}", style(brief_error(record)).dim())
    };

    println!(
        "  {}{}  {}{}",
        prefix,
        style(&padded).white(),
        status_label(record),
        detail
    );

    if debug {
        if let (Some(adapter), Some(error)) = (record.adapter, record.error.as_deref()) {
            println!("    {} via {}: {}", style("└─").dim(), adapter, error);
        }
    }
}

/// Full record block for batch output.
pub fn print_record(record: &ParsedRecord, debug: bool) {
    println!(
        "{}  {}",
        style(&record.domain_name).bold(),
        status_label(record)
    );

    if !record.parse_success {
        if let Some(error) = &record.error {
            println!("  {}", style(error).yellow());
        }
        if debug {
            if let Some(raw) = &record.raw_text {
                println!("  {}", style(raw).dim());
            }
        }
        println!();
        return;
    }

    let domain = &record.formatted.domain;
    print_field("Domain", domain.name.as_deref());
    print_field("Registry ID", domain.id.as_deref());
    print_date("Created", domain.created.as_ref());
    print_date("Updated", domain.updated.as_ref());
    print_date("Expires", domain.expired.as_ref());
    print_date("Transferred", domain.transfer.as_ref());
    if !domain.status.is_empty() {
        print_field("Status", Some(domain.status.join(", ").as_str()));
    }
    if !domain.name_servers.is_empty() {
        print_field("Name servers", Some(domain.name_servers.join(", ").as_str()));
    }
    if let Some(signed) = domain.dnssec {
        print_field("DNSSEC", Some(if signed { "signed" } else { "unsigned" }));
    }

    for block in [
        &record.formatted.registrar,
        &record.formatted.registrant,
        &record.formatted.administrative,
        &record.formatted.technical,
        &record.formatted.billing,
    ] {
        print_contact(block);
    }

    if debug {
        for (key, value) in &domain.extra {
            print_field(key, Some(value.as_str()));
        }
        if let Some(adapter) = record.adapter {
            println!("  {}", style(format!("via {}", adapter)).dim());
        }
    }
    println!();
}

fn print_field(label: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        println!("  {} {}", style(format!("{:<14}", label)).cyan(), value);
    }
}

fn print_date(label: &str, date: Option<&DateField>) {
    if let Some(date) = date {
        if date.utc == date.raw {
            print_field(label, Some(date.utc.as_str()));
        } else {
            print_field(label, Some(format!("{} ({})", date.utc, date.raw).as_str()));
        }
    }
}

fn print_contact(block: &ContactBlock) {
    if block.is_empty() {
        return;
    }
    println!("  {}", style(&block.key).bold());
    for (field, value) in &block.fields {
        println!("    {} {}", style(format!("{:<12}", field)).dim(), value);
    }
}

// ── Raw output ───────────────────────────────────────────────────────────────

pub fn print_raw(outcome: &QueryOutcome) {
    let server = if outcome.server.is_empty() {
        "-".to_string()
    } else {
        outcome.server.clone()
    };
    println!(
        "{} {}",
        style(format!("% {}", outcome.domain)).bold(),
        style(format!("({} via {}, {}ms)", server, outcome.adapter, outcome.elapsed_ms)).dim()
    );
    if let Some(error) = &outcome.error {
        println!("{}", style(error).yellow());
    }
    println!("{}", outcome.raw_payload.trim_end());
    println!();
}

// ── TLD listing ──────────────────────────────────────────────────────────────

pub fn print_tld_list(records: &[&TldRecord]) {
    println!();
    println!("{}", style("Known TLDs:").yellow().bold());
    println!();

    for record in records {
        let target = match record.adapter {
            AdapterKind::None => "-".to_string(),
            AdapterKind::Rdap => match (record.rdap_override(), record.tcp_host()) {
                (Some(base), _) => base.to_string(),
                (None, Some(host)) => format!("bootstrap (fallback {})", host),
                (None, None) => "bootstrap".to_string(),
            },
            AdapterKind::Tcp => record.host.clone(),
        };
        println!(
            "  {} {}  {}",
            style(format!("{:<10}", record.tld)).green().bold(),
            style(format!("{:<5}", record.adapter.to_string())).cyan(),
            target,
        );
    }

    println!();
    println!("{} TLDs", records.len());
}

// ── Summary ──────────────────────────────────────────────────────────────────

pub fn print_summary(
    total: usize,
    available: usize,
    registered: usize,
    unknown: usize,
    duration: Duration,
) {
    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );
    println!(
        "  {} domain{} in {:.1}s  {}  {}  {}  {}  {}  {}",
        style(total).bold(),
        if total == 1 { "" } else { "s" },
        duration.as_secs_f64(),
        style("|").dim(),
        style(format!("{} available", available)).green(),
        style("|").dim(),
        style(format!("{} registered", registered)).red(),
        style("|").dim(),
        style(format!("{} unknown", unknown)).yellow(),
    );
}

/// Print a categorized error summary using colors.
pub fn print_error_summary(error_stats: &ErrorStats, args: &Args) {
    println!("  {}", style("Some domains could not be looked up:").yellow());

    let format_list = |domains: &[String], max_show: usize| -> String {
        if domains.len() <= max_show {
            domains.join(", ")
        } else {
            let shown = &domains[..max_show];
            format!("{}, ... and {} more", shown.join(", "), domains.len() - max_show)
        }
    };

    for (label, domains) in [
        ("timeout", &error_stats.timeouts),
        ("network error", &error_stats.network_errors),
        ("TLD without service", &error_stats.no_service),
        ("parsing error", &error_stats.parsing_errors),
        ("other error", &error_stats.other_errors),
    ] {
        if domains.is_empty() {
            continue;
        }
        println!(
            "  {} {} {}{}: {}",
            style("•").dim(),
            domains.len(),
            label,
            if domains.len() == 1 { "" } else { "s" },
            format_list(domains, 5),
        );
    }

    if !args.debug {
        println!(
            "  {} {}",
            style("•").dim(),
            style("Re-run with --debug for the full error messages").dim(),
        );
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Registrar and expiry, when known.
pub fn summary_info(record: &ParsedRecord) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(registrar) = record.formatted.registrar.name() {
        parts.push(format!("Registrar: {}", registrar));
    }
    if let Some(expires) = &record.formatted.domain.expired {
        parts.push(format!("Expires: {}", expires.utc));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// Extract a brief error reason from a failed record.
fn brief_error(record: &ParsedRecord) -> &'static str {
    if record.status_code == STATUS_NO_SERVICE {
        return "(no WHOIS service)";
    }
    match &record.error {
        Some(msg) => {
            let m = msg.to_lowercase();
            if m.contains("timeout") || m.contains("timed out") {
                "(timeout)"
            } else if m.contains("network") || m.contains("connect") {
                "(network error)"
            } else if m.contains("invalid domain") {
                "(invalid domain)"
            } else if m.contains("parse") || m.contains("json") {
                "(parsing error)"
            } else {
                "(error)"
            }
        }
        None => "(unknown status)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_whois_lib::STATUS_FAILED;

    fn failed(error: &str) -> ParsedRecord {
        ParsedRecord::failure("a.com", "com", error, STATUS_FAILED)
    }

    #[test]
    fn test_brief_error_categories() {
        assert_eq!(brief_error(&failed("Timeout after 10s during: WHOIS query")), "(timeout)");
        assert_eq!(brief_error(&failed("Network error: connection refused")), "(network error)");
        assert_eq!(
            brief_error(&failed("Invalid domain 'x': expected a name with a TLD")),
            "(invalid domain)"
        );
        assert_eq!(brief_error(&failed("something odd")), "(error)");

        let mut none = failed("No WHOIS service is available for .es domains");
        none.status_code = STATUS_NO_SERVICE;
        assert_eq!(brief_error(&none), "(no WHOIS service)");
    }

    #[test]
    fn test_summary_info() {
        let mut record = ParsedRecord::new("example.com", "com");
        assert_eq!(summary_info(&record), None);

        record.formatted.registrar.set("name", "Example Registrar");
        record.formatted.domain.expired = Some(DateField {
            raw: "2030-01-15".to_string(),
            utc: "2030-01-15T00:00:00.000Z".to_string(),
        });
        assert_eq!(
            summary_info(&record).as_deref(),
            Some("Registrar: Example Registrar, Expires: 2030-01-15T00:00:00.000Z")
        );
    }

    #[test]
    fn test_status_labels() {
        let mut record = ParsedRecord::new("example.com", "com");
        assert_eq!(status_text(&record), "REGISTERED");
        record.is_reserved = true;
        assert_eq!(status_text(&record), "RESERVED");
        record.is_available = true;
        assert_eq!(status_text(&record), "AVAILABLE");
        assert_eq!(status_text(&failed("x")), "UNKNOWN");
    }
}
