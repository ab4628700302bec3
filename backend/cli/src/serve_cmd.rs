//! `bilbot serve`: run the Telegram bot until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use bilbot_channels::{ChannelAdapter, TelegramAdapter, TelegramContext};
use bilbot_config::BilboConfig;
use bilbot_core::ReceiptStore;
use bilbot_ingest::ReceiptPipeline;
use bilbot_logging::redact_sensitive_data;
use bilbot_storage::{ImageStore, SqliteReceiptStore};
use bilbot_vision::build_model;

/// How often idle admission entries are dropped.
const ADMISSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

pub async fn run(config: BilboConfig) -> Result<()> {
    let token = config
        .telegram
        .token
        .clone()
        .filter(|t| !t.is_empty())
        .context("telegram.token is not configured")?;

    info!(
        db = %config.database.path,
        images = %config.image_storage.base_path,
        provider = ?config.model.provider,
        "Starting BilboT"
    );

    let store = Arc::new(
        SqliteReceiptStore::open(&config.database.path).context("Failed to open receipt database")?,
    );
    let images = Arc::new(ImageStore::new(&config.image_storage.base_path));
    let model = build_model(&config.model)
        .map_err(|e| anyhow::anyhow!(redact_sensitive_data(&format!("{:#}", e))))?;

    let receipts: Arc<dyn ReceiptStore> = store.clone();
    let pipeline = Arc::new(ReceiptPipeline::from_config(&config, model, receipts));

    let admission = Arc::clone(pipeline.admission());
    let cleanup = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ADMISSION_CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            admission.cleanup(chrono::Utc::now()).await;
        }
    });

    let adapter = TelegramAdapter::new(token, TelegramContext { pipeline, store, images });
    info!(adapter = adapter.name(), "Channel adapter registered");

    let result = adapter.start().await;
    cleanup.abort();
    if let Err(e) = &result {
        error!("Telegram adapter failed: {:#}", e);
    }
    result
}
