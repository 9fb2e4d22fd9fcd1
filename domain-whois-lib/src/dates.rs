//! Registry date normalization.
//!
//! WHOIS servers print dates in dozens of layouts, often without a zone.
//! [`DateNormalizer`] turns them into `YYYY-MM-DDTHH:MM:SS.mmmZ`, using the
//! TLD's declared timezone for naive values, and hands back the input
//! untouched when nothing matches.

use crate::types::TimezoneHint;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::collections::HashMap;
use std::sync::RwLock;

/// Memo entries kept before the memo is reset.
const MEMO_LIMIT: usize = 4096;

lazy_static::lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref ZONE_SUFFIX: Regex = Regex::new(
        r"(?i)[\s(]*(?:GMT|UTC)\s*(?P<off>[+-]\s*\d{1,2}(?::?\d{2})?)?\s*\)?\s*$"
    ).unwrap();
    static ref PARENTHETICAL: Regex = Regex::new(r"\s*\([^)]*\)").unwrap();
    static ref TRAILING_OFFSET: Regex = Regex::new(
        r"(?i)^(?P<body>.*\d:\d{2}(?::\d{2})?(?:[.,]\d+)?)\s*(?P<off>z|[+-]\d{2}(?::?\d{2})?)$"
    ).unwrap();
    static ref MISSING_SECONDS: Regex = Regex::new(r"(?:^|[\sT])\d{1,2}:\d{2}$").unwrap();
    static ref COMPACT_DATE: Regex = Regex::new(r"^(\d{4})(\d{2})(\d{2})(\s.*)?$").unwrap();
    static ref STRICT_ISO: Regex = Regex::new(
        r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})$"
    ).unwrap();
}

/// Layouts with a time component, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y.%m.%d %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%m-%d-%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
    "%Y-%b-%d %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%b %d %Y %H:%M:%S",
    "%a %b %d %H:%M:%S %Y",
    "%a %b %d %Y %H:%M:%S",
];

/// Date-only layouts, tried in order after the time layouts.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%m-%d-%Y",
    "%m/%d/%Y",
    "%d-%b-%Y",
    "%Y-%b-%d",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%a %b %d %Y",
];

/// Parse a UTC offset into minutes east of UTC.
///
/// Accepts "+8", "-3.5", "+05:30", "-0800", "+08", "Z", optionally behind a
/// "UTC"/"GMT" label. Offsets beyond ±14h are rejected.
pub fn parse_utc_offset(raw: &str) -> Option<i32> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let upper = compact.to_ascii_uppercase();
    let body = upper.trim_start_matches("UTC").trim_start_matches("GMT");
    if body == "Z" {
        return Some(0);
    }
    if body.is_empty() {
        return None;
    }

    let (sign, digits) = match body.as_bytes()[0] {
        b'+' => (1, &body[1..]),
        b'-' => (-1, &body[1..]),
        _ => (1, body),
    };
    if digits.is_empty() {
        return None;
    }

    const MAX_MINUTES: u32 = 14 * 60;
    let clock = |h: &str, m: &str| -> Option<u32> {
        let (h, m) = (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?);
        if m >= 60 {
            return None;
        }
        h.checked_mul(60)?.checked_add(m)
    };

    let minutes = if let Some((h, m)) = digits.split_once(':') {
        clock(h, m)?
    } else if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        clock(&digits[..2], &digits[2..])?
    } else {
        let hours = digits.parse::<f64>().ok()?;
        if !hours.is_finite() || hours < 0.0 || hours * 60.0 > MAX_MINUTES as f64 {
            return None;
        }
        (hours * 60.0).round() as u32
    };

    if minutes > MAX_MINUTES {
        return None;
    }
    Some(sign * minutes as i32)
}

/// A parsed date before any registry timezone is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParsedDate {
    /// The input carried its own offset
    Absolute(DateTime<Utc>),
    /// Wall-clock time with no zone information
    Naive(NaiveDateTime),
}

/// Input after cleanup, split into the zone-free body and any explicit offset.
#[derive(Debug)]
struct CleanedDate {
    /// Whitespace-collapsed input with zone labels removed
    full: String,
    /// `full` without a trailing offset, seconds padded
    body: String,
    /// Minutes east of UTC, when the input stated it
    offset: Option<i32>,
}

fn clean(raw: &str) -> CleanedDate {
    let mut text = WHITESPACE.replace_all(raw.trim(), " ").to_string();
    let mut offset = None;

    if let Some(caps) = ZONE_SUFFIX.captures(&text) {
        offset = match caps.name("off") {
            Some(off) => parse_utc_offset(off.as_str()),
            None => Some(0),
        };
        let start = caps.get(0).map(|m| m.start()).unwrap_or(text.len());
        text.truncate(start);
    }

    text = PARENTHETICAL.replace_all(&text, "").trim().to_string();

    if let Some(caps) = COMPACT_DATE.captures(&text) {
        text = format!(
            "{}-{}-{}{}",
            &caps[1],
            &caps[2],
            &caps[3],
            caps.get(4).map(|m| m.as_str()).unwrap_or("")
        );
    }

    let mut body = text.clone();
    if let Some(caps) = TRAILING_OFFSET.captures(&text) {
        if let Some(parsed) = caps.name("off").and_then(|m| parse_utc_offset(m.as_str())) {
            offset = Some(parsed);
            body = caps["body"].trim().to_string();
        }
    }

    if MISSING_SECONDS.is_match(&body) {
        body.push_str(":00");
    }

    CleanedDate {
        full: text,
        body,
        offset,
    }
}

fn parse_with(body: &str, format: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(body, format) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(body, format)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn apply_offset(naive: NaiveDateTime, minutes: i32) -> Option<DateTime<Utc>> {
    FixedOffset::east_opt(minutes * 60)?
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_cleaned(cleaned: &CleanedDate, custom_format: Option<&str>) -> Option<ParsedDate> {
    if STRICT_ISO.is_match(&cleaned.full) {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&cleaned.full) {
            return Some(ParsedDate::Absolute(dt.with_timezone(&Utc)));
        }
    }

    let naive = custom_format
        .and_then(|format| parse_with(&cleaned.body, format))
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(&cleaned.body, format).ok())
        })
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(&cleaned.body, format).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        });

    if let Some(naive) = naive {
        return match cleaned.offset {
            Some(minutes) => apply_offset(naive, minutes).map(ParsedDate::Absolute),
            None => Some(ParsedDate::Naive(naive)),
        };
    }

    DateTime::parse_from_rfc2822(&cleaned.full)
        .or_else(|_| DateTime::parse_from_rfc3339(&cleaned.full))
        .ok()
        .map(|dt| ParsedDate::Absolute(dt.with_timezone(&Utc)))
}

/// Resolve a wall-clock time using the registry's zone, or UTC without one.
fn localize(naive: NaiveDateTime, hint: Option<&TimezoneHint>) -> DateTime<Utc> {
    if let Some(hint) = hint {
        let zone = hint
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .and_then(|name| name.parse::<Tz>().ok());
        if let Some(tz) = zone {
            if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
                return dt.with_timezone(&Utc);
            }
        }
        if let Some(dt) = hint.offset_minutes().and_then(|m| apply_offset(naive, m)) {
            return dt;
        }
    }
    Utc.from_utc_datetime(&naive)
}

fn render(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Converts registry date strings to UTC ISO-8601.
///
/// Successful parses are memoized per input string; the memo holds the
/// zone-independent parse, so one normalizer serves every TLD.
#[derive(Debug, Default)]
pub struct DateNormalizer {
    memo: RwLock<HashMap<String, ParsedDate>>,
}

impl DateNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize `raw` using the TLD's timezone hint.
    ///
    /// Naive values are read as local time of the hinted zone (named zone
    /// first, then fixed offset). Unparseable input is returned unchanged.
    pub fn format_date(&self, raw: &str, hint: Option<&TimezoneHint>) -> String {
        let custom_format = hint
            .and_then(|h| h.format.as_deref())
            .filter(|f| !f.trim().is_empty());

        match self.parse(raw, custom_format) {
            Some(ParsedDate::Absolute(dt)) => render(dt),
            Some(ParsedDate::Naive(naive)) => render(localize(naive, hint)),
            None => raw.to_string(),
        }
    }

    /// TLD-agnostic variant: naive values are taken as UTC.
    pub fn format_date_utc(&self, raw: &str) -> String {
        self.format_date(raw, None)
    }

    /// Number of memoized inputs.
    pub fn memo_len(&self) -> usize {
        self.memo.read().map(|memo| memo.len()).unwrap_or(0)
    }

    fn parse(&self, raw: &str, custom_format: Option<&str>) -> Option<ParsedDate> {
        let key = match custom_format {
            Some(format) => format!("{}\u{0}{}", format, raw),
            None => raw.to_string(),
        };

        if let Ok(memo) = self.memo.read() {
            if let Some(parsed) = memo.get(&key) {
                return Some(*parsed);
            }
        }

        let parsed = parse_cleaned(&clean(raw), custom_format)?;

        if let Ok(mut memo) = self.memo.write() {
            if memo.len() >= MEMO_LIMIT {
                memo.clear();
            }
            memo.insert(key, parsed);
        }
        Some(parsed)
    }
}
