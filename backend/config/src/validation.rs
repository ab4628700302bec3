//! Config validation with path-qualified errors and warnings.

use crate::schema::{BilboConfig, ModelProviderKind};
use chrono::format::{Item, StrftimeItems};
use thiserror::Error;

/// Longest accepted per-identity cooldown: one day.
pub const MAX_COOLDOWN_SECS: u64 = 86_400;

#[derive(Debug, Error)]
#[error("config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError { path: path.into(), message: message.into() });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError { path: path.into(), message: message.into() });
    }
}

pub fn validate(config: &BilboConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_rate_limiting(config, &mut report);
    validate_model(config, &mut report);
    validate_extraction(config, &mut report);
    validate_telegram(config, &mut report);
    report
}

fn validate_rate_limiting(config: &BilboConfig, report: &mut ValidationReport) {
    let rl = &config.rate_limiting;
    if rl.enabled && rl.global_per_minute == 0 {
        report.error("rate_limiting.global_per_minute", "must be >= 1 when rate limiting is enabled");
    }
    if rl.per_user_seconds > MAX_COOLDOWN_SECS {
        report.error(
            "rate_limiting.per_user_seconds",
            format!("must be at most {MAX_COOLDOWN_SECS} seconds"),
        );
    }
    if !rl.enabled {
        report.warn("rate_limiting.enabled", "rate limiting is disabled");
    }
}

fn validate_model(config: &BilboConfig, report: &mut ValidationReport) {
    let model = &config.model;
    if model.timeout_secs == 0 {
        report.error("model.timeout_secs", "must be > 0");
    }
    if model.max_image_dimension < 64 {
        report.error("model.max_image_dimension", "must be at least 64 pixels");
    }
    if model.provider == ModelProviderKind::OpenAi
        && model.api_key.as_deref().map(str::is_empty).unwrap_or(true)
    {
        report.error("model.api_key", "OpenAI provider requires an API key");
    }
}

fn validate_extraction(config: &BilboConfig, report: &mut ValidationReport) {
    let ex = &config.extraction;
    if !is_currency_code(&ex.fallback_currency) {
        report.error(
            "extraction.fallback_currency",
            format!("'{}' is not a three-letter currency code", ex.fallback_currency),
        );
    }
    if !(0.0..1.0).contains(&ex.relative_tolerance) {
        report.error("extraction.relative_tolerance", "must be in [0, 1)");
    }
    if ex.absolute_tolerance < 0.0 {
        report.error("extraction.absolute_tolerance", "must be >= 0");
    }
    for (i, fmt) in ex.date_formats.iter().enumerate() {
        if fmt.trim().is_empty() || StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
            report.error(format!("extraction.date_formats[{i}]"), format!("invalid format '{fmt}'"));
        }
    }
    for (symbol, code) in &ex.currency_symbols {
        if !is_currency_code(code) {
            report.error(
                format!("extraction.currency_symbols.{symbol}"),
                format!("'{code}' is not a three-letter currency code"),
            );
        }
    }
}

fn validate_telegram(config: &BilboConfig, report: &mut ValidationReport) {
    if config.telegram.token.as_deref().map(str::is_empty).unwrap_or(true) {
        report.warn("telegram.token", "no bot token configured; `serve` will not start");
    }
}

fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}
