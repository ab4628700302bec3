//! `bilbot-config`: BilboT runtime configuration.
//!
//! Provides:
//! - Typed config schema with defaults for every section
//! - YAML (and JSON) loading with a fixed lookup order
//! - `${ENV_VAR}` substitution for secrets
//! - Validation with errors and warnings

pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use env::{resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, find_config_file, load_config};
pub use schema::{
    AdmissionScope, BilboConfig, DatabaseConfig, ExtractionConfig, ImageStorageConfig,
    LoggingConfig, ModelConfig, ModelProviderKind, PreprocessingConfig, RateLimitConfig,
    TelegramConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::Result;
use std::path::Path;

/// Locate, load, and validate the config.
///
/// `explicit` wins over every other lookup location. Validation errors are
/// logged and also returned as a failure so callers never run with a
/// config they cannot honour.
pub async fn load_and_prepare(explicit: Option<&Path>) -> Result<BilboConfig> {
    let path = find_config_file(explicit);
    let config = match &path {
        Some(p) => load_config(p).await?,
        None => {
            tracing::debug!("No config file found; using defaults");
            BilboConfig::default()
        }
    };

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if let Some(first) = report.errors.into_iter().next() {
        return Err(first.into());
    }

    Ok(config)
}
