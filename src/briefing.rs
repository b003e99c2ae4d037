//! Plain-text technician briefing for one ticket.

use chrono::{DateTime, NaiveDateTime};

use crate::model::issue::Issue;
use crate::model::mapping::ProjectMapping;
use crate::schedule::SCHEDULED_DATE;
use crate::util::display::normalize_opt;

const TEMPLATE: &str = "\
Ticket {key}
{project_name}

Support
Contact name: {contact_name}
Contact e-mail/phone: {contact_info}

SERVICE TYPE: {service_type}
Store: {store}
POS: {pdv}
Asset: {asset}
Model: {model}
Serial: {serial}
Hostname: {hostname}
Description/Scope: {description}

Please ask the technician to photograph the site before touching anything

Address: {address}
State: {state}
City: {city}
District: {district}
Zip code: {zipcode}
Complement: {complement}

Items the technician must carry
Notebook running Windows 10 or later with a built-in ethernet port.
Mobile phone with 4G/5G signal.
Console cable
PuTTY installed.
AnyDesk installed.
01 power strip.
02 RJ45 network cables.

Date/Time - Scheduled: {scheduled_date} {scheduled_time}
";

/// Logical field names substituted into the template, in template order.
pub const LOGICAL_FIELDS: [&str; 19] = [
    "contact_name",
    "contact_info",
    "service_type",
    "store",
    "pdv",
    "asset",
    "model",
    "serial",
    "hostname",
    "description",
    "address",
    "state",
    "city",
    "district",
    "zipcode",
    "complement",
    "problem",
    SCHEDULED_DATE,
    "scheduled_time",
];

/// Field ids worth asking the search API for: every mapped logical field plus
/// the standard ones the template reads directly.
pub fn requested_fields(mapping: &ProjectMapping) -> Vec<String> {
    let mut fields: Vec<String> = ["summary", "created", "project"]
        .into_iter()
        .map(String::from)
        .collect();
    for logical in LOGICAL_FIELDS {
        if let Some(id) = mapping.resolve(logical) {
            if !fields.iter().any(|f| f == id) {
                fields.push(id.to_string());
            }
        }
    }
    fields
}

fn lookup(issue: &Issue, mapping: &ProjectMapping, logical: &str) -> String {
    normalize_opt(mapping.resolve(logical).and_then(|id| issue.field(id)))
}

/// Split a timestamp into `YYYY-MM-DD` and `HH:MM`. `None` if it is not one.
fn split_timestamp(value: &str) -> Option<(String, String)> {
    let value = value.trim();
    let parsed = DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.naive_local())
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z").map(|dt| dt.naive_local()))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M"))
        .ok()?;
    Some((
        parsed.format("%Y-%m-%d").to_string(),
        parsed.format("%H:%M").to_string(),
    ))
}

/// Fill the template. Every line is always present; anything unmapped or
/// missing on the issue renders as an empty string.
pub fn render(issue: &Issue, mapping: &ProjectMapping) -> String {
    let mut description = lookup(issue, mapping, "description");
    if description.is_empty() {
        description = lookup(issue, mapping, "problem");
    }
    if description.is_empty() {
        description = issue.summary().unwrap_or_default().to_string();
    }

    let mut scheduled_date = lookup(issue, mapping, SCHEDULED_DATE);
    let mut scheduled_time = lookup(issue, mapping, "scheduled_time");
    if !scheduled_date.is_empty() && scheduled_time.is_empty() {
        if let Some((date, time)) = split_timestamp(&scheduled_date) {
            scheduled_date = date;
            scheduled_time = time;
        }
    }

    let mut out = TEMPLATE
        .replace("{key}", &issue.key)
        .replace("{project_name}", issue.project_name().unwrap_or_default())
        .replace("{description}", &description)
        .replace("{scheduled_date}", &scheduled_date)
        .replace("{scheduled_time}", &scheduled_time);
    for logical in LOGICAL_FIELDS {
        let placeholder = format!("{{{logical}}}");
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, &lookup(issue, mapping, logical));
        }
    }
    out
}
