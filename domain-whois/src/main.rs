//! Domain WHOIS CLI Application
//!
//! Command-line front end for domain-whois-lib: looks up WHOIS/RDAP
//! registration data and prints one normalized record per domain.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use domain_whois_lib::{
    expand_domain_inputs, load_env_config, parse_duration_string, read_domain_list, ConfigManager,
    EnvConfig, FileConfig, LookupConfig, MemoryCache, ParsedRecord, StaticTldRegistry,
    WhoisDispatcher, STATUS_NO_SERVICE,
};
use futures::StreamExt;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::prelude::*;

/// Bulk runs stop here; larger lists must be split.
pub const MAX_DOMAINS: usize = 50;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for domain-whois
#[derive(Parser, Debug, Default)]
#[command(name = "domain-whois")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Look up WHOIS/RDAP registration data for domains")]
#[command(
    long_about = "Look up WHOIS (TCP/43) and RDAP registration data and print one normalized record per domain.\n\nRDAP servers are discovered through the IANA bootstrap registry; registries without RDAP are asked over TCP WHOIS."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// Domain names to look up (FQDNs, or base names expanded with --tld)
    #[arg(value_name = "DOMAINS", help_heading = "Domain Selection")]
    pub domains: Vec<String>,

    /// TLDs used to expand base names (comma-separated or repeated)
    #[arg(short = 't', long = "tld", value_name = "TLD", value_delimiter = ',', action = clap::ArgAction::Append, help_heading = "Domain Selection")]
    pub tld: Option<Vec<String>>,

    /// Input file with domains (one per line, '#' comments)
    #[arg(
        short = 'f',
        long = "file",
        value_name = "FILE",
        help_heading = "Domain Selection"
    )]
    pub file: Option<PathBuf>,

    /// Print records as JSON
    #[arg(short = 'j', long = "json", help_heading = "Output Format")]
    pub json: bool,

    /// Print the unparsed server response instead of a record
    #[arg(long = "raw", help_heading = "Output Format")]
    pub raw: bool,

    /// Max concurrent lookups (1-100)
    #[arg(short = 'c', long = "concurrency", help_heading = "Performance")]
    pub concurrency: Option<usize>,

    /// Per-request timeout for WHOIS and RDAP ("10s", "1500ms")
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "Performance")]
    pub timeout: Option<String>,

    /// Delay before each lookup in a bulk run ("200ms")
    #[arg(long = "pace", value_name = "DURATION", help_heading = "Performance")]
    pub pace: Option<String>,

    /// Retry budget for both WHOIS and RDAP
    #[arg(long = "retries", value_name = "N", help_heading = "Performance")]
    pub retries: Option<u32>,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,

    /// TLD registry file with [[tld]] tables, layered over the built-in table
    #[arg(long = "tlds", value_name = "FILE", help_heading = "Configuration")]
    pub tlds: Option<PathBuf>,

    /// Disable IANA bootstrap discovery of RDAP servers
    #[arg(long = "no-bootstrap", help_heading = "Protocol")]
    pub no_bootstrap: bool,

    /// Disable the TCP WHOIS fallback after RDAP failures
    #[arg(long = "no-fallback", help_heading = "Protocol")]
    pub no_fallback: bool,

    /// List the TLD registry and exit
    #[arg(long = "list-tlds", help_heading = "Protocol")]
    pub list_tlds: bool,

    /// Show debug logs and per-lookup timing
    #[arg(short = 'd', long = "debug", help_heading = "Configuration")]
    pub debug: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,
}

/// Failed lookups grouped by cause for the closing summary
#[derive(Debug, Default)]
pub(crate) struct ErrorStats {
    pub(crate) timeouts: Vec<String>,
    pub(crate) network_errors: Vec<String>,
    pub(crate) no_service: Vec<String>,
    pub(crate) parsing_errors: Vec<String>,
    pub(crate) other_errors: Vec<String>,
}

impl ErrorStats {
    fn add_record(&mut self, record: &ParsedRecord) {
        if record.parse_success {
            return;
        }
        let domain = record.domain_name.clone();
        if record.status_code == STATUS_NO_SERVICE {
            self.no_service.push(domain);
            return;
        }

        let message = record.error.as_deref().unwrap_or("").to_lowercase();
        if message.contains("timeout") || message.contains("timed out") {
            self.timeouts.push(domain);
        } else if message.contains("network")
            || message.contains("connect")
            || message.contains("request failed")
        {
            self.network_errors.push(domain);
        } else if message.contains("parse") || message.contains("no recognizable") {
            self.parsing_errors.push(domain);
        } else {
            self.other_errors.push(domain);
        }
    }

    fn has_errors(&self) -> bool {
        !self.timeouts.is_empty()
            || !self.network_errors.is_empty()
            || !self.no_service.is_empty()
            || !self.parsing_errors.is_empty()
            || !self.other_errors.is_empty()
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&args);

    if let Err(e) = validate_args(&args) {
        ui::print_error(&e);
        process::exit(1);
    }

    if let Err(e) = run(args).await {
        ui::print_error(&e.to_string());
        process::exit(1);
    }
}

/// Logs go to stderr so JSON on stdout stays clean. `RUST_LOG` wins over flags.
fn init_tracing(args: &Args) {
    let default_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter)
        .try_init();
}

fn validate_args(args: &Args) -> Result<(), String> {
    if args.list_tlds {
        return Ok(());
    }

    if args.domains.is_empty() && args.file.is_none() {
        return Err("You must specify domain names or a file with --file".to_string());
    }

    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 || concurrency > 100 {
            return Err("Concurrency must be between 1 and 100".to_string());
        }
    }

    for (flag, value) in [("--timeout", &args.timeout), ("--pace", &args.pace)] {
        if let Some(raw) = value {
            match parse_duration_string(raw) {
                Some(d) if flag == "--timeout" && d.is_zero() => {
                    return Err("--timeout must be greater than zero".to_string());
                }
                Some(_) => {}
                None => {
                    return Err(format!(
                        "Invalid {} value '{}'. Use a format like '500ms', '5s' or '2m'",
                        flag, raw
                    ));
                }
            }
        }
    }

    Ok(())
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let env = load_env_config();
    let file_config = load_file_config(&args, &env)?;
    let registry = build_registry(&args, &env, &file_config)?;

    if args.list_tlds {
        ui::print_tld_list(&registry.records());
        return Ok(());
    }

    let config = build_config(&args, &env, &file_config)?;
    let domains = get_domains(&args)?;
    info!(count = domains.len(), concurrency = config.concurrency, "starting lookups");

    let dispatcher = WhoisDispatcher::with_config(config)?
        .with_registry(Arc::new(registry))
        .with_parser_tables(file_config.alias_table(), file_config.protected_words())
        .with_cache(Arc::new(MemoryCache::new()));

    if args.raw {
        return run_raw(&dispatcher, &domains, &args).await;
    }

    if domains.len() > 1 && !args.json {
        run_streaming(&dispatcher, &domains, &args).await
    } else {
        run_batch(&dispatcher, &domains, &args).await
    }
}

/// Explicit `--config`, then `DW_CONFIG`, then discovery.
fn load_file_config(args: &Args, env: &EnvConfig) -> Result<FileConfig, Box<dyn std::error::Error>> {
    let manager = ConfigManager::new();
    let explicit = args.config.as_ref().or(env.config.as_ref());

    let file_config = match explicit {
        Some(path) => {
            debug!(path = %path.display(), "using explicit config file");
            manager
                .load_file(path)
                .map_err(|e| format!("Failed to load config file '{}': {}", path.display(), e))?
        }
        None => manager.discover_and_load()?,
    };
    Ok(file_config)
}

/// Built-in table, then config `[[tld]]` records, then the `--tlds`/`DW_TLDS` file.
fn build_registry(
    args: &Args,
    env: &EnvConfig,
    file_config: &FileConfig,
) -> Result<StaticTldRegistry, Box<dyn std::error::Error>> {
    let mut registry = StaticTldRegistry::builtin()
        .merge(StaticTldRegistry::from_records(file_config.tld.clone()));

    if let Some(path) = args.tlds.as_ref().or(env.tlds.as_ref()) {
        let overlay = StaticTldRegistry::load_file(path)?;
        debug!(path = %path.display(), records = overlay.len(), "loaded TLD registry overlay");
        registry = registry.merge(overlay);
    }
    Ok(registry)
}

/// Defaults, then config file, then `DW_*` variables, then flags.
fn build_config(
    args: &Args,
    env: &EnvConfig,
    file_config: &FileConfig,
) -> Result<LookupConfig, Box<dyn std::error::Error>> {
    let config = file_config.apply_to(LookupConfig::default())?;
    let config = env.apply_to(config);
    Ok(apply_cli_args(config, args))
}

fn apply_cli_args(mut config: LookupConfig, args: &Args) -> LookupConfig {
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if let Some(timeout) = args.timeout.as_deref().and_then(parse_duration_string) {
        config = config.with_timeout(timeout);
    }
    if let Some(pace) = args.pace.as_deref().and_then(parse_duration_string) {
        config = config.with_pacing(pace);
    }
    if let Some(retries) = args.retries {
        config = config.with_max_retries(retries);
    }
    // Flags only ever switch features off; absence keeps config/env values
    if args.no_bootstrap {
        config = config.with_bootstrap(false);
    }
    if args.no_fallback {
        config = config.with_tcp_fallback(false);
    }
    config
}

/// Positional domains plus `--file`, expanded, de-duplicated and capped.
fn get_domains(args: &Args) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut inputs = args.domains.clone();
    if let Some(path) = &args.file {
        inputs.extend(read_domain_list(path)?);
    }

    let domains = expand_domain_inputs(&inputs, &args.tld);
    if domains.is_empty() {
        return Err("No valid domains to look up".into());
    }
    if domains.len() > MAX_DOMAINS {
        return Err(format!(
            "Too many domains ({}). At most {} domains can be looked up per run",
            domains.len(),
            MAX_DOMAINS
        )
        .into());
    }
    Ok(domains)
}

/// Collect every record, then print them together.
async fn run_batch(
    dispatcher: &WhoisDispatcher,
    domains: &[String],
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();
    let spinner = (!args.json && ui::stderr_is_term())
        .then(|| ui::Spinner::start(format!("Looking up {}...", domains.join(", "))));

    let records = dispatcher.lookup_many(domains).await;

    if let Some(spinner) = spinner {
        spinner.stop().await;
    }

    if args.json {
        let json = if records.len() == 1 {
            serde_json::to_string_pretty(&records[0])?
        } else {
            serde_json::to_string_pretty(&records)?
        };
        println!("{}", json);
        return Ok(());
    }

    for record in &records {
        ui::print_record(record, args.debug);
    }
    if records.len() > 1 {
        print_closing_summary(&records, started, args);
    }
    Ok(())
}

/// Print one line per domain as lookups finish.
async fn run_streaming(
    dispatcher: &WhoisDispatcher,
    domains: &[String],
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();
    ui::print_header(domains.len(), dispatcher.config().concurrency);

    let total = domains.len();
    let mut records = Vec::with_capacity(total);
    let mut stream = dispatcher.lookup_stream(domains.to_vec());
    while let Some(record) = stream.next().await {
        ui::print_result_line(&record, args.debug, Some((records.len() + 1, total)));
        records.push(record);
    }

    println!();
    print_closing_summary(&records, started, args);
    Ok(())
}

/// `--raw`: the query step only, no parsing.
async fn run_raw(
    dispatcher: &WhoisDispatcher,
    domains: &[String],
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut outcomes = Vec::with_capacity(domains.len());
    for domain in domains {
        outcomes.push(dispatcher.query(domain).await);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        for outcome in &outcomes {
            ui::print_raw(outcome);
        }
    }
    Ok(())
}

fn print_closing_summary(records: &[ParsedRecord], started: Instant, args: &Args) {
    let mut stats = ErrorStats::default();
    for record in records {
        stats.add_record(record);
    }

    let available = records.iter().filter(|r| r.is_available).count();
    let taken = records
        .iter()
        .filter(|r| r.parse_success && !r.is_available)
        .count();
    ui::print_summary(
        records.len(),
        available,
        taken,
        records.len() - available - taken,
        started.elapsed(),
    );
    if stats.has_errors() {
        println!();
        ui::print_error_summary(&stats, args);
    }
}
