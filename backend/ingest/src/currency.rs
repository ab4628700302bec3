//! Currency detection and resolution to ISO 4217 codes.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// What the receipt says about its currency before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CurrencyHint {
    /// An explicit three-letter code.
    Code(String),
    /// A symbol such as `€` or `kr`, possibly shared by several currencies.
    Symbol(String),
}

/// Symbols in detection order; multi-character prefixed forms come before
/// the bare `$`.
const SYMBOLS: &[(&str, &[&str])] = &[
    ("US$", &["USD"]),
    ("CA$", &["CAD"]),
    ("AU$", &["AUD"]),
    ("NZ$", &["NZD"]),
    ("HK$", &["HKD"]),
    ("C$", &["CAD"]),
    ("A$", &["AUD"]),
    ("S$", &["SGD"]),
    ("R$", &["BRL"]),
    ("€", &["EUR"]),
    ("£", &["GBP"]),
    ("₹", &["INR"]),
    ("₽", &["RUB"]),
    ("₩", &["KRW"]),
    ("₺", &["TRY"]),
    ("₴", &["UAH"]),
    ("₪", &["ILS"]),
    ("₫", &["VND"]),
    ("₱", &["PHP"]),
    ("฿", &["THB"]),
    ("₦", &["NGN"]),
    ("$", &["USD", "CAD", "AUD", "NZD", "MXN", "SGD", "HKD"]),
    ("¥", &["JPY", "CNY"]),
    ("￥", &["JPY", "CNY"]),
];

/// Letter symbols; only matched as whole words.
const WORD_SYMBOLS: &[(&str, &[&str])] = &[
    ("kr", &["SEK", "NOK", "DKK", "ISK"]),
    ("zł", &["PLN"]),
    ("kč", &["CZK"]),
];

const NAMES: &[(&str, &str)] = &[
    ("euro", "EUR"),
    ("euros", "EUR"),
    ("sterling", "GBP"),
    ("yen", "JPY"),
    ("yuan", "CNY"),
    ("renminbi", "CNY"),
    ("rmb", "CNY"),
    ("franc", "CHF"),
    ("francs", "CHF"),
    ("franken", "CHF"),
    ("rupee", "INR"),
    ("rupees", "INR"),
    ("ruble", "RUB"),
    ("rubles", "RUB"),
    ("rouble", "RUB"),
    ("baht", "THB"),
    ("zloty", "PLN"),
    ("lira", "TRY"),
    ("hryvnia", "UAH"),
    ("shekel", "ILS"),
    ("forint", "HUF"),
];

const KNOWN_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CNY", "CHF", "CAD", "AUD", "NZD", "HKD", "SGD", "SEK", "NOK",
    "DKK", "ISK", "PLN", "CZK", "HUF", "RON", "BGN", "RUB", "UAH", "TRY", "ILS", "INR", "KRW",
    "THB", "VND", "PHP", "IDR", "MYR", "BRL", "MXN", "ARS", "CLP", "COP", "ZAR", "NGN", "AED",
    "SAR", "EGP", "RSD", "GEL", "KZT",
];

/// A three-letter upper-case word directly before or after a number.
static CODE_NEAR_AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d[\d.,']*\s*\(?\s*([A-Z]{3})\b|\b([A-Z]{3})\s*\)?\s*[-\x{2212}]?\d").unwrap()
});

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphabetic()).filter(|w| !w.is_empty())
}

fn table_lookup(symbol: &str) -> Option<&'static [&'static str]> {
    SYMBOLS
        .iter()
        .chain(WORD_SYMBOLS.iter())
        .find(|(s, _)| s.to_lowercase() == symbol.to_lowercase())
        .map(|(_, codes)| *codes)
}

fn code_near_amount(text: &str) -> Option<&str> {
    CODE_NEAR_AMOUNT_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str())
        .find(|code| KNOWN_CODES.contains(code))
}

/// Scan free text for a currency indication.
///
/// Upper-case ISO codes win over symbols, symbols over currency names. A code
/// only counts when it sits next to an amount, so store names such as
/// "CAD Supplies" are not read as currencies.
pub fn detect_hint(text: &str) -> Option<CurrencyHint> {
    if let Some(code) = code_near_amount(text) {
        return Some(CurrencyHint::Code(code.to_string()));
    }

    if let Some((symbol, _)) = SYMBOLS.iter().find(|(s, _)| text.contains(s)) {
        return Some(CurrencyHint::Symbol(symbol.to_string()));
    }

    for word in words(text) {
        let lower = word.to_lowercase();
        if let Some((symbol, _)) = WORD_SYMBOLS.iter().find(|(s, _)| *s == lower) {
            return Some(CurrencyHint::Symbol(symbol.to_string()));
        }
        if let Some((_, code)) = NAMES.iter().find(|(n, _)| *n == lower) {
            return Some(CurrencyHint::Code(code.to_string()));
        }
        if lower == "dollar" || lower == "dollars" {
            return Some(CurrencyHint::Symbol("$".to_string()));
        }
    }

    None
}

/// Interpret a value that is explicitly labelled as the currency.
///
/// Any three ASCII letters are taken as a code, in any case.
pub fn parse_explicit(value: &str) -> Option<CurrencyHint> {
    let trimmed = value.trim().trim_end_matches('.');
    if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(CurrencyHint::Code(trimmed.to_ascii_uppercase()));
    }
    if let Some(code) = words(trimmed).find(|w| KNOWN_CODES.contains(w)) {
        return Some(CurrencyHint::Code(code.to_string()));
    }
    detect_hint(trimmed).or_else(|| {
        table_lookup(trimmed).map(|_| CurrencyHint::Symbol(trimmed.to_lowercase()))
    })
}

/// Resolve a hint to an ISO code.
///
/// `overrides` maps symbols to codes and is consulted before the built-in
/// table. A symbol shared by several currencies resolves to `fallback`.
/// Returns `None` when the hint cannot be resolved without the fallback.
pub fn resolve(hint: &CurrencyHint, overrides: &HashMap<String, String>) -> Option<String> {
    match hint {
        CurrencyHint::Code(code) => Some(code.to_ascii_uppercase()),
        CurrencyHint::Symbol(symbol) => {
            if let Some(code) = overrides.get(symbol).or_else(|| {
                overrides
                    .iter()
                    .find(|(k, _)| k.to_lowercase() == symbol.to_lowercase())
                    .map(|(_, v)| v)
            }) {
                return Some(code.to_ascii_uppercase());
            }
            match table_lookup(symbol) {
                Some([single]) => Some(single.to_string()),
                _ => None,
            }
        }
    }
}
