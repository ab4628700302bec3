//! `bilbot check-config`: report where the config came from and what is wrong with it.

use std::path::Path;

use anyhow::Result;

use bilbot_config::{find_config_file, load_config, validate, BilboConfig};
use bilbot_logging::redact_sensitive_data;

use crate::terminal_output::{note_error, note_info, note_success, note_warn};

pub async fn run(explicit: Option<&Path>) -> Result<()> {
    println!("\n🔍 Checking BilboT configuration...\n");

    let config = match find_config_file(explicit) {
        Some(path) => {
            note_info(&format!("Using {}", path.display()));
            match load_config(&path).await {
                Ok(config) => config,
                Err(e) => {
                    note_error(&redact_sensitive_data(&format!("{:#}", e)));
                    anyhow::bail!("configuration could not be loaded");
                }
            }
        }
        None => {
            note_warn("No config file found; using built-in defaults");
            BilboConfig::default()
        }
    };

    print_summary(&config);

    let report = validate(&config);
    for warning in &report.warnings {
        note_warn(&format!("{}: {}", warning.path, warning.message));
    }
    for error in &report.errors {
        note_error(&format!("{}: {}", error.path, error.message));
    }

    println!();
    if report.is_valid() {
        note_success("Configuration is valid.");
        Ok(())
    } else {
        anyhow::bail!("{} configuration error(s)", report.errors.len())
    }
}

fn print_summary(config: &BilboConfig) {
    let model = config.model.model.as_deref().unwrap_or("provider default");
    println!("  Model:         {:?} / {}", config.model.provider, model);
    println!(
        "  Rate limits:   {} ({}s per user, {}/min global)",
        if config.rate_limiting.enabled { "on" } else { "off" },
        config.rate_limiting.per_user_seconds,
        config.rate_limiting.global_per_minute
    );
    println!("  Currency:      {} fallback", config.extraction.fallback_currency);
    println!("  Database:      {}", config.database.path);
    println!("  Images:        {}", config.image_storage.base_path);
    println!(
        "  Telegram:      {}",
        if config.telegram.token.as_deref().is_some_and(|t| !t.is_empty()) { "token set" } else { "no token" }
    );
    println!();
}
