// domain-whois/tests/cli_integration.rs
//
// Every test here runs offline: lookups only target TLDs served by the
// `none` adapter, which answers without a network call.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::{NamedTempFile, TempDir};

const DW_VARS: &[&str] = &[
    "DW_CONCURRENCY",
    "DW_PACING",
    "DW_WHOIS_TIMEOUT",
    "DW_RDAP_TIMEOUT",
    "DW_MAX_RETRIES",
    "DW_BOOTSTRAP",
    "DW_BOOTSTRAP_CACHE",
    "DW_TCP_FALLBACK",
    "DW_CONFIG",
    "DW_TLDS",
];

/// Command isolated from the user's config files and environment.
fn domain_whois(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("domain-whois").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env_remove("RUST_LOG");
    for var in DW_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// Helper to create a test file with the given content
fn create_test_file(content: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("Failed to create temp file");
    fs::write(file.path(), content).expect("Failed to write to temp file");
    file
}

#[test]
fn test_help_lists_flags() {
    let home = TempDir::new().unwrap();
    domain_whois(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--json"))
        .stdout(predicate::str::contains("--raw"))
        .stdout(predicate::str::contains("--list-tlds"))
        .stdout(predicate::str::contains("--no-fallback"))
        .stdout(predicate::str::contains("--tlds"));
}

#[test]
fn test_version() {
    let home = TempDir::new().unwrap();
    domain_whois(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_no_input_is_an_error() {
    let home = TempDir::new().unwrap();
    domain_whois(&home)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("You must specify domain names"));
}

#[test]
fn test_invalid_concurrency() {
    let home = TempDir::new().unwrap();
    domain_whois(&home)
        .args(["example.es", "--concurrency", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Concurrency must be between 1 and 100"));
}

#[test]
fn test_invalid_timeout() {
    let home = TempDir::new().unwrap();
    domain_whois(&home)
        .args(["example.es", "--timeout", "soon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid --timeout value"));
}

#[test]
fn test_list_tlds_builtin() {
    let home = TempDir::new().unwrap();
    domain_whois(&home)
        .arg("--list-tlds")
        .assert()
        .success()
        .stdout(predicate::str::contains("com"))
        .stdout(predicate::str::contains("whois.verisign-grs.com"))
        .stdout(predicate::str::contains("co.uk"));
}

#[test]
fn test_list_tlds_with_registry_file() {
    let home = TempDir::new().unwrap();
    let registry = create_test_file(
        r#"
[[tld]]
tld = "zz"
adapter = "tcp"
host = "whois.nic.zz"
"#,
    );

    domain_whois(&home)
        .args(["--list-tlds", "--tlds"])
        .arg(registry.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("zz"))
        .stdout(predicate::str::contains("whois.nic.zz"));
}

#[test]
fn test_invalid_registry_file_fails() {
    let home = TempDir::new().unwrap();
    let registry = create_test_file("[[tld]]\ntld = \"zz\"\nadapter = \"tcp\"\nhost = \"https://rdap.zz\"\n");

    domain_whois(&home)
        .args(["--list-tlds", "--tlds"])
        .arg(registry.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("host is a URL"));
}

#[test]
fn test_none_adapter_lookup_json() {
    let home = TempDir::new().unwrap();
    domain_whois(&home)
        .args(["example.es", "--json", "--no-bootstrap"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"domain_name\": \"example.es\""))
        .stdout(predicate::str::contains("\"status_code\": 404"))
        .stdout(predicate::str::contains("\"adapter\": \"none\""))
        .stdout(predicate::str::contains("\"is_available\": false"));
}

#[test]
fn test_none_adapter_lookup_text() {
    let home = TempDir::new().unwrap();
    domain_whois(&home)
        .arg("example.es")
        .assert()
        .success()
        .stdout(predicate::str::contains("example.es"))
        .stdout(predicate::str::contains("NO SERVICE"));
}

#[test]
fn test_raw_mode() {
    let home = TempDir::new().unwrap();
    domain_whois(&home)
        .args(["example.es", "--raw"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No WHOIS service is available for .es domains"));
}

#[test]
fn test_file_input_with_comments() {
    let home = TempDir::new().unwrap();
    let list = create_test_file("# bulk list\none.es\n\ntwo.es  # trailing\n#three.es\n");

    let output = domain_whois(&home)
        .args(["--json", "--file"])
        .arg(list.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = records
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["domain_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["one.es", "two.es"]);
}

#[test]
fn test_streaming_summary_for_multiple_domains() {
    let home = TempDir::new().unwrap();
    domain_whois(&home)
        .args(["one", "two", "-t", "es"])
        .assert()
        .success()
        .stdout(predicate::str::contains("one.es"))
        .stdout(predicate::str::contains("two.es"))
        .stdout(predicate::str::contains("2 domains in"))
        .stdout(predicate::str::contains("TLD without service"));
}

#[test]
fn test_bulk_cap() {
    let home = TempDir::new().unwrap();
    let domains: Vec<String> = (0..51).map(|i| format!("d{}.es", i)).collect();

    domain_whois(&home)
        .args(&domains)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Too many domains (51)"));
}

#[test]
fn test_config_file_registry_records() {
    let home = TempDir::new().unwrap();
    let config = create_test_file(
        r#"
[defaults]
concurrency = 4

[[tld]]
tld = "zz"
adapter = "none"
"#,
    );

    domain_whois(&home)
        .args(["example.zz", "--json", "--config"])
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status_code\": 404"));
}

#[test]
fn test_local_config_is_discovered() {
    let home = TempDir::new().unwrap();
    fs::write(
        home.path().join("domain-whois.toml"),
        "[[tld]]\ntld = \"zz\"\nadapter = \"none\"\n",
    )
    .unwrap();

    domain_whois(&home)
        .args(["--list-tlds"])
        .assert()
        .success()
        .stdout(predicate::str::contains("zz"));
}

#[test]
fn test_invalid_config_file_fails() {
    let home = TempDir::new().unwrap();
    let config = create_test_file("[defaults]\nconcurrency = 500\n");

    domain_whois(&home)
        .args(["example.es", "--config"])
        .arg(config.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Concurrency must be between 1 and 100"));
}

#[test]
fn test_env_config_path() {
    let home = TempDir::new().unwrap();
    let config = create_test_file("[[tld]]\ntld = \"zz\"\nadapter = \"none\"\n");

    domain_whois(&home)
        .env("DW_CONFIG", config.path())
        .args(["example.zz", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"adapter\": \"none\""));
}

#[test]
fn test_invalid_env_values_are_ignored() {
    let home = TempDir::new().unwrap();
    domain_whois(&home)
        .env("DW_CONCURRENCY", "lots")
        .env("DW_WHOIS_TIMEOUT", "never")
        .args(["example.es", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status_code\": 404"));
}
