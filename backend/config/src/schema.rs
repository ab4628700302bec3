//! BilboT configuration schema.
//!
//! Keys are snake_case so existing `config.json` files keep working.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BilboConfig {
    pub telegram: TelegramConfig,
    pub rate_limiting: RateLimitConfig,
    pub model: ModelConfig,
    pub extraction: ExtractionConfig,
    pub database: DatabaseConfig,
    pub image_storage: ImageStorageConfig,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Telegram
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token; usually `${TELEGRAM_BOT_TOKEN}`.
    pub token: Option<String>,
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

/// How admission identities are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionScope {
    /// One cooldown per user across every chat.
    #[default]
    User,
    /// One cooldown per user per chat.
    UserInChat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Minimum seconds between two admitted messages from one identity.
    pub per_user_seconds: u64,
    /// Maximum admitted messages across all identities per rolling minute.
    pub global_per_minute: u32,
    pub scope: AdmissionScope,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_user_seconds: 10,
            global_per_minute: 60,
            scope: AdmissionScope::User,
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProviderKind {
    #[default]
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: ModelProviderKind,
    /// Model name; falls back to the provider's default when unset.
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Context window requested from Ollama.
    pub max_context: u32,
    /// Longest image side sent to the model, in pixels.
    pub max_image_dimension: u32,
    pub preprocessing: PreprocessingConfig,
}

/// Optional clean-up applied to receipt photos before the model sees them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Grayscale, light denoise and contrast stretch.
    pub enhance: bool,
    /// Straighten text lines tilted by up to a few degrees.
    pub deskew: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProviderKind::Ollama,
            model: None,
            base_url: None,
            api_key: None,
            timeout_secs: 120,
            max_context: 8192,
            max_image_dimension: 1200,
            preprocessing: PreprocessingConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Currency used when the receipt gives no hint or an ambiguous symbol.
    pub fallback_currency: String,
    /// Allowed total/item-sum disagreement as a fraction of the total.
    pub relative_tolerance: f64,
    /// Allowed total/item-sum disagreement in currency units.
    pub absolute_tolerance: f64,
    /// Ordered chrono format strings; empty means the built-in list.
    pub date_formats: Vec<String>,
    /// Symbol → ISO code overrides (e.g. `"$": "CAD"`).
    pub currency_symbols: HashMap<String, String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            fallback_currency: "USD".to_string(),
            relative_tolerance: 0.01,
            absolute_tolerance: 0.01,
            date_formats: Vec::new(),
            currency_symbols: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage, logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "data/receipts.db".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageStorageConfig {
    pub base_path: String,
}

impl Default for ImageStorageConfig {
    fn default() -> Self {
        Self { base_path: "data/images".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace` | `debug` | `info` | `warn` | `error`, or a full filter directive.
    pub level: String,
    /// Emit JSON lines on the console instead of human-readable output.
    pub json: bool,
    /// When set, also write a daily-rotated NDJSON file here.
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false, dir: None }
    }
}
