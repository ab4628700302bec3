//! Model response parsing.
//!
//! Models are asked for JSON but answer with whatever they like: fenced
//! blocks, JSON wrapped in prose, trailing commas, output cut off mid-item,
//! or plain `label: value` lines. Structured decoding is tried first; when it
//! yields nothing usable, line heuristics fill the gaps.

use bilbot_core::{ModelFailureKind, ModelOutcome, RawModelResponse};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::amount::parse_amount;
use crate::currency::{detect_hint, parse_explicit};
use crate::intermediate::{DraftItem, IntermediateRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("no extractable data in model response")]
    NoExtractableData,
    #[error("model produced no response: {0}")]
    ModelFailed(ModelFailureKind),
}

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\n?(.*?)(?:```|$)").unwrap());
static TRAILING_COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap());
static BULLET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:[-*•·]\s+|\d{1,2}[.)]\s+)").unwrap());
static PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());
static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d(?:[\d.,']*\d)?").unwrap());
static PRICE_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\d\s]{0,4}\s*-?\s*\d[\d.,']*\s*[^\d\s]{0,4}$").unwrap()
});
static DATE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d{1,2}[./-]\d{1,2}[./-]\d{2,4}|\d{4}-\d{2}-\d{2})\b").unwrap()
});
static TOTAL_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:grand total|total|amount due|sum|summe|gesamt|zu zahlen)\b").unwrap()
});
static PAYMENT_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:credit card|debit card|american express|apple pay|google pay|ec[- ]karte|cash|card|visa|mastercard|maestro|amex|paypal|girocard|contactless)\b",
    )
    .unwrap()
});

const ITEM_LIST_KEYS: &[&str] = &["items", "line_items", "lineItems", "products", "articles", "positions"];
const STORE_KEYS: &[&str] = &["store_name", "store", "storeName", "merchant", "merchant_name", "vendor", "shop"];
const PAYMENT_KEYS: &[&str] = &["payment_method", "paymentMethod", "payment", "payment_type", "paid_with"];
const DATE_KEYS: &[&str] = &["purchase_date", "date", "purchaseDate"];
const TIME_KEYS: &[&str] = &["purchase_time", "time", "purchaseTime"];
const DATETIME_KEYS: &[&str] = &[
    "purchase_date_time",
    "purchase_datetime",
    "purchaseDateTime",
    "datetime",
    "date_time",
    "timestamp",
];
const TOTAL_KEYS: &[&str] = &[
    "total_amount",
    "total",
    "total_amount_paid",
    "totalAmount",
    "grand_total",
    "amount_due",
    "total_paid",
    "sum",
];
const CURRENCY_KEYS: &[&str] = &["currency", "currency_code", "currencyCode"];
const ITEM_NAME_KEYS: &[&str] = &["item", "name", "description", "product", "title", "article"];
const ITEM_PRICE_KEYS: &[&str] = &["price", "unit_price", "unitPrice", "amount", "total", "cost", "line_total", "value"];

const TOTAL_LABELS: &[&str] = &[
    "total",
    "total amount",
    "total amount paid",
    "total paid",
    "total price",
    "total due",
    "total to pay",
    "grand total",
    "amount due",
    "amount",
    "sum",
    "summe",
    "gesamt",
    "gesamtbetrag",
    "gesamtsumme",
    "endbetrag",
    "betrag",
    "zu zahlen",
];
const STORE_LABELS: &[&str] = &["store", "store name", "merchant", "vendor", "shop", "market", "retailer", "seller"];
const PAYMENT_LABELS: &[&str] = &[
    "payment",
    "payment method",
    "payment type",
    "paid with",
    "paid by",
    "method of payment",
    "zahlungsart",
    "zahlungsmethode",
    "bezahlt mit",
];
const DATE_LABELS: &[&str] = &["date", "purchase date", "receipt date", "transaction date", "datum"];
const TIME_LABELS: &[&str] = &["time", "purchase time", "transaction time", "uhrzeit"];
const DATETIME_LABELS: &[&str] = &[
    "date time",
    "datetime",
    "date/time",
    "date & time",
    "purchase date time",
    "purchase datetime",
    "timestamp",
];
const CURRENCY_LABELS: &[&str] = &["currency", "currency code", "currency used", "währung"];
const IGNORED_LABELS: &[&str] = &[
    "items",
    "item",
    "line items",
    "products",
    "name",
    "description",
    "price",
    "unit price",
    "quantity",
    "qty",
    "receipt",
    "note",
    "notes",
    "balance",
];
const IGNORED_WORDS: &[&str] = &[
    "subtotal", "tax", "taxes", "vat", "mwst", "ust", "change", "rückgeld", "tendered", "given", "net",
    "netto",
];

/// Turn a model response into an [`IntermediateRecord`].
pub fn parse_response(response: &RawModelResponse) -> Result<IntermediateRecord, ParseFailure> {
    match &response.outcome {
        ModelOutcome::Success { text } => parse_text(text),
        ModelOutcome::Failure { kind, .. } => Err(ParseFailure::ModelFailed(*kind)),
    }
}

/// Parse model output text.
///
/// Fails with [`ParseFailure::NoExtractableData`] unless at least one item
/// or a parseable total was recovered.
pub fn parse_text(text: &str) -> Result<IntermediateRecord, ParseFailure> {
    let mut record = structured(text).unwrap_or_default();
    if !record.has_extractable_data() {
        record.merge_missing(from_lines(text));
    }
    if record.currency_hint.is_none() {
        record.currency_hint = detect_hint(text);
    }

    if record.has_extractable_data() {
        Ok(record)
    } else {
        Err(ParseFailure::NoExtractableData)
    }
}

// ---------------------------------------------------------------------------
// Structured decoding
// ---------------------------------------------------------------------------

fn structured(text: &str) -> Option<IntermediateRecord> {
    let mut candidates: Vec<&str> = FENCE_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    candidates.push(text);

    candidates
        .into_iter()
        .flat_map(decoded_values)
        .filter_map(|value| record_from_value(&value))
        .find(IntermediateRecord::has_any_field)
}

/// Every JSON value recoverable from `candidate`, best guess first.
fn decoded_values(candidate: &str) -> Vec<Value> {
    let trimmed = candidate.trim();
    if let Ok(value @ (Value::Object(_) | Value::Array(_))) = serde_json::from_str::<Value>(trimmed) {
        return vec![value];
    }

    let scan = scan_blocks(trimmed);
    let mut values: Vec<Value> = scan.blocks.iter().filter_map(|b| decode_block(b)).collect();
    if let Some(repaired) = scan.unclosed.and_then(repair_truncated) {
        values.extend(decode_block(&repaired));
    }
    values
}

fn decode_block(block: &str) -> Option<Value> {
    let value = serde_json::from_str::<Value>(block).ok().or_else(|| {
        let relaxed = TRAILING_COMMA_RE.replace_all(block, "$1");
        serde_json::from_str::<Value>(&relaxed).ok()
    })?;
    matches!(value, Value::Object(_) | Value::Array(_)).then_some(value)
}

struct BlockScan<'a> {
    blocks: Vec<&'a str>,
    unclosed: Option<&'a str>,
}

/// Split `text` into top-level `{...}` / `[...]` blocks, honouring strings.
fn scan_blocks(text: &str) -> BlockScan<'_> {
    let mut blocks = Vec::new();
    let mut stack: Vec<char> = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if stack.is_empty() {
            match c {
                '{' => stack.push('}'),
                '[' => stack.push(']'),
                _ => continue,
            }
            start = i;
            continue;
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                    if stack.is_empty() {
                        blocks.push(&text[start..i + c.len_utf8()]);
                    }
                } else {
                    stack.clear();
                }
            }
            _ => {}
        }
    }

    BlockScan {
        blocks,
        unclosed: (!stack.is_empty()).then(|| &text[start..]),
    }
}

/// Close a JSON fragment that was cut off, dropping the incomplete tail.
fn repair_truncated(fragment: &str) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut cut: Option<(usize, Vec<char>)> = None;

    for (i, c) in fragment.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) || stack.is_empty() {
                    return None;
                }
                cut = Some((i + 1, stack.clone()));
            }
            ',' => cut = Some((i, stack.clone())),
            _ => {}
        }
    }

    let (end, open) = cut?;
    let mut repaired = fragment[..end].trim_end().to_string();
    repaired.extend(open.iter().rev());
    Some(repaired)
}

fn is_placeholder(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "" | "null" | "none" | "n/a" | "na" | "unknown" | "not available" | "not visible" | "-" | "?"
    )
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !is_placeholder(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        map.iter()
            .find(|(k, v)| k.eq_ignore_ascii_case(key) && !v.is_null())
            .map(|(_, v)| v)
    })
}

fn text_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .and_then(|(_, v)| scalar_text(v))
    })
}

fn looks_like_receipt(map: &Map<String, Value>) -> bool {
    [ITEM_LIST_KEYS, STORE_KEYS, TOTAL_KEYS, DATE_KEYS, DATETIME_KEYS]
        .iter()
        .any(|keys| field(map, keys).is_some())
}

fn record_from_value(value: &Value) -> Option<IntermediateRecord> {
    match value {
        Value::Object(map) => {
            // {"receipt": {...}}
            let map = match map.values().next() {
                Some(Value::Object(inner)) if map.len() == 1 && !looks_like_receipt(map) => inner,
                _ => map,
            };
            Some(record_from_object(map))
        }
        Value::Array(list) => {
            if let [Value::Object(inner)] = list.as_slice() {
                if looks_like_receipt(inner) {
                    return Some(record_from_object(inner));
                }
            }
            Some(IntermediateRecord {
                items: list.iter().filter_map(item_from_value).collect(),
                ..Default::default()
            })
        }
        _ => None,
    }
}

fn record_from_object(map: &Map<String, Value>) -> IntermediateRecord {
    let items = field(map, ITEM_LIST_KEYS)
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(item_from_value).collect())
        .unwrap_or_default();

    let raw_datetime = join_datetime(
        text_field(map, DATE_KEYS),
        text_field(map, TIME_KEYS),
        text_field(map, DATETIME_KEYS),
    );

    IntermediateRecord {
        items,
        store: text_field(map, STORE_KEYS),
        payment_method: text_field(map, PAYMENT_KEYS),
        raw_datetime,
        raw_total: text_field(map, TOTAL_KEYS),
        currency_hint: text_field(map, CURRENCY_KEYS).and_then(|c| parse_explicit(&c)),
    }
}

fn item_from_value(value: &Value) -> Option<DraftItem> {
    match value {
        Value::Object(map) => {
            let raw_price = text_field(map, ITEM_PRICE_KEYS)?;
            let unit_price = parse_amount(&raw_price, None)?;
            let currency_hint = text_field(map, CURRENCY_KEYS)
                .and_then(|c| parse_explicit(&c))
                .or_else(|| detect_hint(&raw_price));
            Some(DraftItem {
                description: text_field(map, ITEM_NAME_KEYS).unwrap_or_else(|| "Unnamed item".to_string()),
                unit_price,
                raw_price,
                currency_hint,
            })
        }
        Value::String(line) => {
            let (label, price) = split_label(line)?;
            draft_item(label, price)
        }
        Value::Array(pair) if pair.len() >= 2 => {
            let description = scalar_text(&pair[0])?;
            let raw_price = scalar_text(&pair[1])?;
            let unit_price = parse_amount(&raw_price, None)?;
            Some(DraftItem {
                description,
                unit_price,
                currency_hint: detect_hint(&raw_price),
                raw_price,
            })
        }
        _ => None,
    }
}

fn join_datetime(date: Option<String>, time: Option<String>, combined: Option<String>) -> Option<String> {
    match (date, time, combined) {
        (Some(d), Some(t), _) => Some(format!("{d} {t}")),
        (_, _, Some(c)) => Some(c),
        (Some(d), None, None) => Some(d),
        // A time of day alone does not date a receipt.
        (None, _, None) => None,
    }
}

// ---------------------------------------------------------------------------
// Line heuristics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelKind {
    Total,
    Store,
    Payment,
    Date,
    Time,
    DateTime,
    Currency,
    Ignored,
    Other,
}

fn clean_line(raw: &str) -> String {
    let stripped: String = raw.chars().filter(|c| !matches!(c, '"' | '*' | '`')).collect();
    let trimmed = stripped.trim().trim_end_matches(',').trim();
    BULLET_RE.replace(trimmed, "").trim().to_string()
}

/// Split `label: value`, `label - value`, or `label = value`.
fn split_label(line: &str) -> Option<(&str, &str)> {
    if let Some(idx) = line.find(':') {
        let (label, value) = (line[..idx].trim(), line[idx + 1..].trim());
        if label.chars().any(char::is_alphabetic) {
            return Some((label, value));
        }
    }
    for sep in [" - ", " – ", " = ", "\t"] {
        if let Some(idx) = line.rfind(sep) {
            let (label, value) = (line[..idx].trim(), line[idx + sep.len()..].trim());
            if label.chars().any(char::is_alphabetic) {
                return Some((label, value));
            }
        }
    }
    None
}

fn normalize_label(label: &str) -> String {
    PAREN_RE
        .replace_all(label, "")
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn classify_label(label: &str) -> LabelKind {
    let normalized = normalize_label(label);
    let l = normalized.as_str();
    if TOTAL_LABELS.contains(&l) {
        LabelKind::Total
    } else if STORE_LABELS.contains(&l) {
        LabelKind::Store
    } else if PAYMENT_LABELS.contains(&l) {
        LabelKind::Payment
    } else if DATETIME_LABELS.contains(&l) {
        LabelKind::DateTime
    } else if DATE_LABELS.contains(&l) {
        LabelKind::Date
    } else if TIME_LABELS.contains(&l) {
        LabelKind::Time
    } else if CURRENCY_LABELS.contains(&l) {
        LabelKind::Currency
    } else if IGNORED_LABELS.contains(&l)
        || l.starts_with("sub")
        || l.split(' ').any(|w| IGNORED_WORDS.contains(&w))
    {
        LabelKind::Ignored
    } else {
        LabelKind::Other
    }
}

fn draft_item(description: &str, raw_price: &str) -> Option<DraftItem> {
    if description.is_empty() || !PRICE_VALUE_RE.is_match(raw_price) || DATE_TOKEN_RE.is_match(raw_price) {
        return None;
    }
    let unit_price = parse_amount(raw_price, None)?;
    Some(DraftItem {
        description: description.to_string(),
        unit_price,
        raw_price: raw_price.to_string(),
        currency_hint: detect_hint(raw_price),
    })
}

fn fill(slot: &mut Option<String>, value: &str) {
    if slot.is_none() && !is_placeholder(value) {
        *slot = Some(value.trim().to_string());
    }
}

fn from_lines(text: &str) -> IntermediateRecord {
    let mut record = IntermediateRecord::default();
    let (mut date, mut time, mut combined) = (None, None, None);
    let mut labelled_currency = None;
    let mut seen_currency = None;

    for raw_line in text.lines() {
        let line = clean_line(raw_line);
        if !line.chars().any(char::is_alphanumeric) {
            continue;
        }
        if seen_currency.is_none() {
            seen_currency = detect_hint(&line);
        }

        let Some((label, value)) = split_label(&line) else {
            scan_unlabelled(&line, &mut record, &mut combined);
            continue;
        };

        match classify_label(label) {
            LabelKind::Total => {
                if record.raw_total.is_none() && parse_amount(value, None).is_some() {
                    record.raw_total = Some(value.to_string());
                }
            }
            LabelKind::Store => fill(&mut record.store, value),
            LabelKind::Payment => fill(&mut record.payment_method, value),
            LabelKind::Date => fill(&mut date, value),
            LabelKind::Time => fill(&mut time, value),
            LabelKind::DateTime => fill(&mut combined, value),
            LabelKind::Currency => {
                if labelled_currency.is_none() {
                    labelled_currency = parse_explicit(value);
                }
            }
            LabelKind::Ignored => {}
            LabelKind::Other => record.items.extend(draft_item(label, value)),
        }
    }

    record.raw_datetime = join_datetime(date, time, combined);
    record.currency_hint = labelled_currency.or(seen_currency);
    record
}

/// Keyword scan for lines without a `label: value` shape.
fn scan_unlabelled(line: &str, record: &mut IntermediateRecord, combined: &mut Option<String>) {
    let lower = line.to_lowercase();

    if record.raw_total.is_none() && !lower.contains("subtotal") {
        if let Some(keyword) = TOTAL_KEYWORD_RE.find(line) {
            if let Some(amount) = AMOUNT_RE.find(&line[keyword.end()..]) {
                record.raw_total = Some(amount.as_str().to_string());
                return;
            }
        }
    }

    if combined.is_none() {
        if let Some(m) = DATE_TOKEN_RE.find(line) {
            *combined = Some(line[m.start()..].trim().to_string());
            return;
        }
    }

    if record.payment_method.is_none() {
        if let Some(m) = PAYMENT_KEYWORD_RE.find(line) {
            record.payment_method = Some(m.as_str().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::CurrencyHint;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn fenced_json_with_aliases() {
        let text = r#"Here is the data:
```json
{
  "store": "REWE Markt",
  "line_items": [
    {"name": "Milch", "price": "1,29 €"},
    {"name": "Brot", "price": 2.49}
  ],
  "purchase_date_time": "28.04.2025 12:01:24",
  "total": "3,78",
  "currency": "eur",
  "payment": "Girocard"
}
```"#;
        let record = parse_text(text).unwrap();
        assert_eq!(record.store.as_deref(), Some("REWE Markt"));
        assert_eq!(record.items.len(), 2);
        assert_eq!(record.items[0].unit_price, d("1.29"));
        assert_eq!(record.items[0].currency_hint, Some(CurrencyHint::Symbol("€".into())));
        assert_eq!(record.items[1].unit_price, d("2.49"));
        assert_eq!(record.raw_datetime.as_deref(), Some("28.04.2025 12:01:24"));
        assert_eq!(record.raw_total.as_deref(), Some("3,78"));
        assert_eq!(record.currency_hint, Some(CurrencyHint::Code("EUR".into())));
        assert_eq!(record.payment_method.as_deref(), Some("Girocard"));
    }

    #[test]
    fn json_inside_prose_with_trailing_comma() {
        let text = r#"Sure! {"items": [{"item": "Cake {large}", "price": "3.00"},], "total_amount": "3.00",} Hope this helps."#;
        let record = parse_text(text).unwrap();
        assert_eq!(record.items.len(), 1);
        assert_eq!(record.items[0].description, "Cake {large}");
        assert_eq!(record.raw_total.as_deref(), Some("3.00"));
    }

    #[test]
    fn separate_date_and_time_are_joined() {
        let text = r#"{"purchase_date": "28.04.2025", "purchase_time": "12:01:24 Uhr", "total_amount": 5}"#;
        let record = parse_text(text).unwrap();
        assert_eq!(record.raw_datetime.as_deref(), Some("28.04.2025 12:01:24 Uhr"));
    }

    #[test]
    fn truncated_json_keeps_complete_items() {
        let text = r#"{"store_name": "Aldi", "items": [{"item": "Milk", "price": "1.50"}, {"item": "Bre"#;
        let record = parse_text(text).unwrap();
        assert_eq!(record.store.as_deref(), Some("Aldi"));
        assert_eq!(record.items.len(), 1);
        assert_eq!(record.items[0].description, "Milk");
    }

    #[test]
    fn items_as_strings_and_pairs() {
        let record = parse_text(r#"{"items": ["Milk: 1.50", ["Bread", "2.00"]]}"#).unwrap();
        assert_eq!(record.items.len(), 2);
        assert_eq!(record.items[0].description, "Milk");
        assert_eq!(record.items[1].unit_price, d("2.00"));
    }

    #[test]
    fn wrapped_receipt_object() {
        let record = parse_text(r#"{"receipt": {"store": "Lidl", "total": "9.99"}}"#).unwrap();
        assert_eq!(record.store.as_deref(), Some("Lidl"));
        assert_eq!(record.raw_total.as_deref(), Some("9.99"));
    }

    #[test]
    fn null_fields_are_absent() {
        let record = parse_text(r#"{"store_name": null, "payment_method": "N/A", "total_amount": "4.00"}"#).unwrap();
        assert!(record.store.is_none());
        assert!(record.payment_method.is_none());
    }

    #[test]
    fn plain_label_lines() {
        let text = "Store: Rewe\n\
                    - Milk: 1,29 €\n\
                    - Bread - 2,49 €\n\
                    Subtotal: 3,78 €\n\
                    MwSt 7%: 0,25 €\n\
                    **Total:** 3,78 €\n\
                    Date: 28.04.2025\n\
                    Time: 12:01\n\
                    Payment method: Card";
        let record = parse_text(text).unwrap();
        assert_eq!(record.store.as_deref(), Some("Rewe"));
        let names: Vec<_> = record.items.iter().map(|i| i.description.as_str()).collect();
        assert_eq!(names, vec!["Milk", "Bread"]);
        assert_eq!(record.raw_total.as_deref(), Some("3,78 €"));
        assert_eq!(record.raw_datetime.as_deref(), Some("28.04.2025 12:01"));
        assert_eq!(record.payment_method.as_deref(), Some("Card"));
        assert_eq!(record.currency_hint, Some(CurrencyHint::Symbol("€".into())));
    }

    #[test]
    fn unlabelled_keyword_lines() {
        let text = "Receipt from the corner shop\nPaid by VISA\nTOTAL EUR 12.50 (3 items)\n28.04.2025 18:30 thank you";
        let record = parse_text(text).unwrap();
        assert_eq!(record.raw_total.as_deref(), Some("12.50"));
        assert_eq!(record.payment_method.as_deref(), Some("VISA"));
        assert_eq!(record.raw_datetime.as_deref(), Some("28.04.2025 18:30 thank you"));
        assert_eq!(record.currency_hint, Some(CurrencyHint::Code("EUR".into())));
    }

    #[test]
    fn noise_has_no_extractable_data() {
        assert_eq!(
            parse_text("I'm sorry, I cannot read this receipt. The image is too blurry."),
            Err(ParseFailure::NoExtractableData)
        );
        assert_eq!(parse_text(""), Err(ParseFailure::NoExtractableData));
        assert_eq!(parse_text(r#"{"note": "blurry"}"#), Err(ParseFailure::NoExtractableData));
    }

    #[test]
    fn metadata_without_amounts_is_not_enough() {
        let text = r#"{"store_name": "Rewe", "purchase_date": "28.04.2025"}"#;
        assert_eq!(parse_text(text), Err(ParseFailure::NoExtractableData));
    }

    #[test]
    fn model_failure_passes_through() {
        let response = RawModelResponse::failure("ollama", "qwen", ModelFailureKind::Timeout, "slow", 120_000);
        assert_eq!(
            parse_response(&response),
            Err(ParseFailure::ModelFailed(ModelFailureKind::Timeout))
        );
    }

    #[test]
    fn repair_closes_open_containers() {
        let repaired = repair_truncated(r#"{"a": [1, 2, 3"#).unwrap();
        assert_eq!(repaired, r#"{"a": [1, 2]}"#);
        assert!(repair_truncated(r#"{"a": 1}"#).is_none());
    }
}
