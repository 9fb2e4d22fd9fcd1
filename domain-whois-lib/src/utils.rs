//! Helpers for turning user input into a list of lookup targets.

use crate::error::WhoisError;
use std::fs;
use std::path::Path;

/// Read domains from a file, one per line.
///
/// Blank lines and `#` comments (whole-line or trailing) are skipped.
pub fn read_domain_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>, WhoisError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        WhoisError::file_error(
            path.to_string_lossy(),
            format!("Failed to read domain list: {}", e),
        )
    })?;

    let domains = parse_domain_list(&content);
    if domains.is_empty() {
        return Err(WhoisError::file_error(
            path.to_string_lossy(),
            "No domains found in file",
        ));
    }
    Ok(domains)
}

/// Parse domain list text; see [`read_domain_list`].
pub fn parse_domain_list(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let line = match line.find('#') {
                Some(idx) => &line[..idx],
                None => line,
            };
            let line = line.trim();
            (!line.is_empty()).then(|| line.to_string())
        })
        .collect()
}

/// Expand and de-duplicate domain inputs.
///
/// Inputs containing a dot are kept as given. A bare name is expanded with
/// each of `tlds`, or `.com` when none are given. Order of first appearance
/// is preserved.
pub fn expand_domain_inputs(domains: &[String], tlds: &Option<Vec<String>>) -> Vec<String> {
    let mut results: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !results.iter().any(|d| d.eq_ignore_ascii_case(&candidate)) {
            results.push(candidate);
        }
    };

    for domain in domains {
        let trimmed = domain.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.contains('.') {
            push(trimmed.to_string());
            continue;
        }

        if !is_valid_base_name(trimmed) {
            continue;
        }
        match tlds {
            Some(tld_list) => {
                for tld in tld_list {
                    let tld = tld.trim().trim_start_matches('.');
                    if !tld.is_empty() {
                        push(format!("{}.{}", trimmed, tld));
                    }
                }
            }
            None => push(format!("{}.com", trimmed)),
        }
    }

    results
}

/// Whether a bare label is worth expanding with TLDs.
pub(crate) fn is_valid_base_name(label: &str) -> bool {
    if label.is_empty() || label.starts_with('-') || label.ends_with('-') {
        return false;
    }
    label.chars().all(|c| c.is_alphanumeric() || c == '-')
}
