//! Purchase timestamp canonicalization.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

/// Formats tried, in order, when the configuration does not list its own.
///
/// Two-digit-year variants precede four-digit ones because `%Y` would also
/// accept `25` as the year 25.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%d.%m.%y %H:%M:%S",
    "%d.%m.%y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%y %H:%M:%S",
    "%d/%m/%y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d.%m.%y",
    "%d.%m.%Y",
    "%Y-%m-%d",
    "%d/%m/%y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d %Y",
    "%b %d %Y",
];

pub fn default_formats() -> Vec<String> {
    DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect()
}

fn parse_candidate(candidate: &str, formats: &[String]) -> Option<NaiveDateTime> {
    for format in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(candidate, format) {
            return Some(dt);
        }
        if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// Parse a free-form purchase timestamp.
///
/// Words trailing the timestamp (`Uhr`, `PM local`) are tolerated: the
/// longest leading run of whitespace-separated tokens that matches a format
/// wins. Date-only matches get midnight. Offsets in RFC 3339 input are
/// dropped in favour of the local wall time printed on the receipt.
pub fn canonicalize(raw: &str, formats: &[String]) -> Option<NaiveDateTime> {
    let cleaned = raw.replace(',', " ");
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    let first = tokens.first()?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(first) {
        return Some(dt.naive_local());
    }

    (1..=tokens.len())
        .rev()
        .find_map(|n| parse_candidate(&tokens[..n].join(" "), formats))
}
