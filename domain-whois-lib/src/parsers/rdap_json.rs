//! Maps RDAP domain responses (RFC 9083) onto [`ParsedRecord`].

use super::{push_unique, strip_status_url, ParseContext, ParseHandler, ParserKind};
use crate::dates::DateNormalizer;
use crate::types::{ContactBlock, DateField, FormattedWhois, ParsedRecord, STATUS_FAILED};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Top-level members consumed explicitly; anything else scalar becomes
/// a `custom_*` extra.
const KNOWN_MEMBERS: &[&str] = &[
    "objectClassName",
    "handle",
    "ldhName",
    "unicodeName",
    "status",
    "events",
    "entities",
    "nameservers",
    "secureDNS",
    "notices",
    "remarks",
    "links",
    "port43",
    "rdapConformance",
    "lang",
    "publicIds",
    "variants",
    "network",
    "errorCode",
    "title",
    "description",
    "customProperties",
];

/// Contact slot an RDAP entity role maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Registrar,
    Registrant,
    Administrative,
    Technical,
    Billing,
    Abuse,
}

impl Slot {
    fn from_role(role: &str) -> Option<Self> {
        match role.to_ascii_lowercase().as_str() {
            "registrar" | "sponsor" => Some(Slot::Registrar),
            "registrant" => Some(Slot::Registrant),
            "administrative" | "admin" => Some(Slot::Administrative),
            "technical" | "tech" => Some(Slot::Technical),
            "billing" | "bill" => Some(Slot::Billing),
            "abuse" => Some(Slot::Abuse),
            _ => None,
        }
    }
}

/// Fields read out of one entity's jCard.
#[derive(Debug, Default)]
struct VcardFields {
    name: Option<String>,
    organization: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    url: Option<String>,
}

impl VcardFields {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.organization.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.address.is_none()
            && self.url.is_none()
    }

    fn write_into(self, block: &mut ContactBlock) {
        let pairs = [
            ("name", self.name),
            ("organization", self.organization),
            ("email", self.email),
            ("phone", self.phone),
            ("address", self.address),
            ("url", self.url),
        ];
        for (field, value) in pairs {
            if let Some(value) = value {
                block.set(field, value);
            }
        }
    }
}

/// RDAP JSON parser.
#[derive(Debug, Clone, Default)]
pub struct RdapParser {
    dates: Arc<DateNormalizer>,
}

impl RdapParser {
    pub fn new(dates: Arc<DateNormalizer>) -> Self {
        Self { dates }
    }

    fn date_field(&self, raw: &str, ctx: &ParseContext<'_>) -> DateField {
        DateField {
            raw: raw.to_string(),
            utc: self.dates.format_date(raw, ctx.timezone()),
        }
    }

    fn apply_events(&self, events: &[Value], formatted: &mut FormattedWhois, ctx: &ParseContext<'_>) {
        for event in events {
            let action = str_member(event, "eventAction").map(str::to_lowercase);
            let date = str_member(event, "eventDate");
            let (action, date) = match (action, date) {
                (Some(action), Some(date)) if !date.trim().is_empty() => (action, date.trim()),
                _ => continue,
            };

            let domain = &mut formatted.domain;
            if action == "registration" {
                domain.created = Some(self.date_field(date, ctx));
            } else if action == "last changed" {
                domain.updated = Some(self.date_field(date, ctx));
            } else if action.starts_with("last update") {
                if domain.updated.is_none() {
                    domain.updated = Some(self.date_field(date, ctx));
                }
            } else if action.contains("expiration") || action.contains("expiry") {
                domain.expired = Some(self.date_field(date, ctx));
            } else if action.contains("transfer") {
                domain.transfer = Some(self.date_field(date, ctx));
            }
        }
    }
}

fn str_member<'v>(value: &'v Value, key: &str) -> Option<&'v str> {
    value.get(key).and_then(Value::as_str)
}

fn array_member<'v>(value: &'v Value, key: &str) -> &'v [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Flatten a jCard value (string, number or nested array) into text parts.
fn flatten_text(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() {
                out.push(s.to_string());
            }
        }
        Value::Number(n) => out.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|item| flatten_text(item, out)),
        _ => {}
    }
}

fn joined_text(value: &Value, separator: &str) -> Option<String> {
    let mut parts = Vec::new();
    flatten_text(value, &mut parts);
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(separator))
    }
}

/// Read the well-known properties from an entity's `vcardArray`.
fn read_vcard(entity: &Value) -> VcardFields {
    let mut fields = VcardFields::default();
    let properties = match entity
        .get("vcardArray")
        .and_then(Value::as_array)
        .and_then(|card| card.get(1))
        .and_then(Value::as_array)
    {
        Some(properties) => properties,
        None => return fields,
    };

    for property in properties {
        let parts = match property.as_array() {
            Some(parts) if parts.len() >= 4 => parts,
            _ => continue,
        };
        let name = parts[0].as_str().unwrap_or_default().to_ascii_lowercase();
        let params = &parts[1];
        let value = &parts[3];

        match name.as_str() {
            "fn" => fields.name = joined_text(value, " "),
            "org" => fields.organization = joined_text(value, " "),
            "email" => {
                if fields.email.is_none() {
                    fields.email = joined_text(value, "");
                }
            }
            "tel" => {
                if fields.phone.is_none() {
                    fields.phone = joined_text(value, "")
                        .map(|tel| tel.trim_start_matches("tel:").to_string());
                }
            }
            "adr" => {
                let label = params.get("label").and_then(|label| joined_text(label, " "));
                fields.address = label
                    .map(|label| label.replace('\n', ", "))
                    .or_else(|| joined_text(value, ", "));
            }
            "url" => fields.url = joined_text(value, ""),
            _ => {}
        }
    }
    fields
}

fn slot_block(formatted: &mut FormattedWhois, slot: Slot) -> &mut ContactBlock {
    match slot {
        Slot::Registrar | Slot::Abuse => &mut formatted.registrar,
        Slot::Registrant => &mut formatted.registrant,
        Slot::Administrative => &mut formatted.administrative,
        Slot::Technical => &mut formatted.technical,
        Slot::Billing => &mut formatted.billing,
    }
}

/// Abuse contacts land on the registrar block as `abuse_email`/`abuse_phone`.
fn apply_abuse(entity: &Value, formatted: &mut FormattedWhois) {
    let card = read_vcard(entity);
    if let Some(email) = card.email {
        formatted.registrar.set("abuse_email", email);
    }
    if let Some(phone) = card.phone {
        formatted.registrar.set("abuse_phone", phone);
    }
}

fn apply_public_ids(entity: &Value, block: &mut ContactBlock) {
    for id in array_member(entity, "publicIds") {
        let (kind, identifier) = match (str_member(id, "type"), str_member(id, "identifier")) {
            (Some(kind), Some(identifier)) => (kind, identifier),
            _ => continue,
        };
        if kind.eq_ignore_ascii_case("IANA Registrar ID") {
            block.set("iana_id", identifier);
        } else {
            let key: String = kind
                .to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("_");
            block.set(format!("id_{}", key), identifier);
        }
    }
}

/// Walk an entity and its nested entities, filling contact blocks.
fn apply_entity(entity: &Value, parent: Option<Slot>, formatted: &mut FormattedWhois) {
    let slots: Vec<Slot> = array_member(entity, "roles")
        .iter()
        .filter_map(Value::as_str)
        .filter_map(Slot::from_role)
        .collect();

    for slot in &slots {
        if *slot == Slot::Abuse {
            // Top-level abuse entities still describe the registrar's desk
            if parent.is_none() || parent == Some(Slot::Registrar) {
                apply_abuse(entity, formatted);
            }
            continue;
        }

        let card = read_vcard(entity);
        let handle = str_member(entity, "handle").filter(|h| !h.trim().is_empty());
        let block = slot_block(formatted, *slot);
        if card.is_empty() {
            if let Some(handle) = handle {
                block.set("name", handle);
            }
        } else {
            card.write_into(block);
        }
        if let Some(handle) = handle {
            block.set("handle", handle);
        }
        if *slot == Slot::Registrar {
            apply_public_ids(entity, block);
        }
        for (key, value) in custom_properties(entity) {
            block.set(key, value);
        }
    }

    let nested_parent = slots.first().copied().or(parent);
    for child in array_member(entity, "entities") {
        apply_entity(child, nested_parent, formatted);
    }
}

/// Join a notice or remark into "title: line line".
fn describe(notice: &Value) -> Option<String> {
    let title = str_member(notice, "title").map(str::trim).filter(|t| !t.is_empty());
    let description = notice
        .get("description")
        .and_then(|d| joined_text(d, " "));
    match (title, description) {
        (Some(title), Some(description)) => Some(format!("{}: {}", title, description)),
        (Some(title), None) => Some(title.to_string()),
        (None, Some(description)) => Some(description),
        (None, None) => None,
    }
}

/// `customProperties` entries as `custom_<key>` pairs.
fn custom_properties(value: &Value) -> Vec<(String, String)> {
    let properties = match value.get("customProperties").and_then(Value::as_object) {
        Some(properties) => properties,
        None => return Vec::new(),
    };
    properties
        .iter()
        .filter_map(|(key, value)| {
            let text = scalar_text(value).or_else(|| match value {
                Value::String(_) => None,
                other => Some(other.to_string()),
            })?;
            Some((format!("custom_{}", key), text))
        })
        .collect()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Message for an error body, if this is one.
fn error_message(object: &Map<String, Value>) -> Option<String> {
    if object.contains_key("objectClassName") {
        return None;
    }
    if let Some(error) = object.get("error") {
        return Some(scalar_text(error).unwrap_or_else(|| error.to_string()));
    }
    let code = object.get("errorCode").and_then(Value::as_u64)?;
    if code == 404 {
        return None;
    }
    let title = object
        .get("title")
        .and_then(scalar_text)
        .unwrap_or_else(|| "RDAP error".to_string());
    Some(format!("{} (HTTP {})", title, code))
}

impl ParseHandler for RdapParser {
    fn kind(&self) -> ParserKind {
        ParserKind::RdapJson
    }

    fn parse(&self, domain: &str, raw: &str, ctx: &ParseContext<'_>) -> ParsedRecord {
        let json: Value = match serde_json::from_str(raw) {
            Ok(json) => json,
            Err(e) => {
                return ParsedRecord::failure(
                    domain,
                    ctx.tld,
                    format!("Invalid RDAP JSON: {}", e),
                    STATUS_FAILED,
                )
                .with_raw_text(raw);
            }
        };
        let object = match json.as_object() {
            Some(object) => object,
            None => {
                return ParsedRecord::failure(
                    domain,
                    ctx.tld,
                    "RDAP response is not a JSON object",
                    STATUS_FAILED,
                )
                .with_raw_text(raw);
            }
        };

        if let Some(message) = error_message(object) {
            return ParsedRecord::failure(domain, ctx.tld, message, STATUS_FAILED).with_raw_text(raw);
        }

        let mut record = ParsedRecord::new(domain, ctx.tld).with_raw_text(raw);

        let statuses: Vec<String> = match json.get("status") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
            _ => Vec::new(),
        };
        let lowered: Vec<String> = statuses.iter().map(|s| s.to_lowercase()).collect();

        let not_found = json.get("errorCode").and_then(Value::as_u64) == Some(404)
            || lowered.iter().any(|s| s.contains("not found") || s.contains("inactive"));
        if not_found {
            debug!(domain, "RDAP response signals an unregistered domain");
            record.is_available = true;
            return record;
        }
        if lowered.iter().any(|s| s.contains("reserved")) {
            record.is_reserved = true;
        }

        let formatted = &mut record.formatted;
        if let Some(name) = str_member(&json, "ldhName").or_else(|| str_member(&json, "unicodeName")) {
            formatted.domain.name = Some(name.to_lowercase());
        }
        if let Some(handle) = str_member(&json, "handle") {
            formatted.domain.id = Some(handle.to_string());
        }
        for status in &statuses {
            let status = strip_status_url(status);
            push_unique(&mut formatted.domain.status, status.to_string());
        }

        for nameserver in array_member(&json, "nameservers") {
            let host = str_member(nameserver, "ldhName").or_else(|| str_member(nameserver, "hostName"));
            if let Some(host) = host {
                push_unique(&mut formatted.domain.name_servers, host.trim().to_lowercase());
            }
        }

        if let Some(signed) = json
            .get("secureDNS")
            .and_then(|s| s.get("delegationSigned"))
            .and_then(Value::as_bool)
        {
            formatted.domain.dnssec = Some(signed);
        }

        self.apply_events(array_member(&json, "events"), formatted, ctx);

        for entity in array_member(&json, "entities") {
            apply_entity(entity, None, formatted);
        }

        if let Some(port43) = str_member(&json, "port43") {
            formatted.registrar.set("whois_server", port43);
        }

        for (index, notice) in array_member(&json, "notices").iter().enumerate() {
            if let Some(text) = describe(notice) {
                formatted.domain.extra.insert(format!("notice_{}", index), text);
            }
        }
        for (index, remark) in array_member(&json, "remarks").iter().enumerate() {
            if let Some(text) = describe(remark) {
                formatted.domain.extra.insert(format!("remark_{}", index), text);
            }
        }
        for (key, value) in object {
            if KNOWN_MEMBERS.contains(&key.as_str()) || key == "vcardArray" {
                continue;
            }
            if let Some(text) = scalar_text(value) {
                formatted.domain.extra.insert(format!("custom_{}", key), text);
            }
        }
        for (key, text) in custom_properties(&json) {
            formatted.domain.extra.insert(key, text);
        }

        if formatted.domain.is_empty() && formatted.registrar.is_empty() && !record.is_reserved {
            record.parse_success = false;
            record.error = Some("RDAP response carries no domain data".to_string());
        }
        record
    }
}
