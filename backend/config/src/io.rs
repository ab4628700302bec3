//! Config file discovery and loading.

use crate::env::resolve_env_vars;
use crate::schema::BilboConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Env var naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "BILBOT_CONFIG";

/// Per-user config directory (`~/.config/bilbot` on Linux).
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("bilbot"))
        .unwrap_or_else(|| PathBuf::from(".bilbot"))
}

/// Resolve which config file to load.
///
/// Priority: explicit path > `BILBOT_CONFIG` > `./config.yaml` >
/// `./config.json` > `<config dir>/config.yaml`. Explicit and env paths are
/// returned even when missing so the load reports the error.
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    if let Ok(p) = std::env::var(CONFIG_ENV_VAR) {
        if !p.is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    [
        PathBuf::from("config.yaml"),
        PathBuf::from("config.json"),
        config_dir().join("config.yaml"),
    ]
    .into_iter()
    .find(|p| p.exists())
}

/// Read, env-substitute, and deserialize a config file.
pub async fn load_config(path: &Path) -> Result<BilboConfig> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = parse_config(&raw)
        .with_context(|| format!("Failed to load config at: {}", path.display()))?;
    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Parse YAML or JSON text into a config, resolving `${VAR}` references.
pub fn parse_config(raw: &str) -> Result<BilboConfig> {
    let value: serde_json::Value = if raw.trim().is_empty() {
        serde_json::Value::Object(Default::default())
    } else {
        serde_yaml::from_str(raw).context("Invalid YAML/JSON")?
    };
    let value = resolve_env_vars(&value)?;
    serde_json::from_value(value).context("Config does not match schema")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_default() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.database.path, "data/receipts.db");
    }

    #[test]
    fn wrong_type_is_error() {
        let err = parse_config("rate_limiting:\n  per_user_seconds: soon\n").unwrap_err();
        assert!(format!("{err:#}").contains("schema"));
    }

    #[tokio::test]
    async fn loads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "extraction:\n  fallback_currency: EUR\n").unwrap();
        let cfg = load_config(&path).await.unwrap();
        assert_eq!(cfg.extraction.fallback_currency, "EUR");
    }

    #[test]
    fn explicit_path_wins() {
        let p = Path::new("/nonexistent/custom.yaml");
        assert_eq!(find_config_file(Some(p)), Some(p.to_path_buf()));
    }
}
