//! Log Redaction
//!
//! Scrubs bot tokens, API keys, and bearer tokens from strings before they
//! reach the logs.

use once_cell::sync::Lazy;
use regex::Regex;

static TELEGRAM_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{6,12}:[A-Za-z0-9_-]{30,}").unwrap());
static API_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(sk-[A-Za-z0-9_-]{20,})|(Bearer\s+[A-Za-z0-9\-\._~+/]+=*)").unwrap()
});

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = TELEGRAM_TOKEN_RE.replace_all(input, "[REDACTED_BOT_TOKEN]");
    API_KEY_RE.replace_all(&redacted, "[REDACTED_TOKEN]").into_owned()
}
