//! `bilbot process <image>`: one image through model, parser and derivation.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use bilbot_config::BilboConfig;
use bilbot_core::{ImagePayload, ReceiptStore};
use bilbot_ingest::ReceiptPipeline;
use bilbot_storage::SqliteReceiptStore;
use bilbot_vision::build_model;

use crate::terminal_output::note_success;

pub async fn run(config: &BilboConfig, image: &Path, output: Option<&Path>) -> Result<()> {
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read image {}", image.display()))?;
    let payload = ImagePayload::new(bytes, mime_for(image));
    info!(path = %image.display(), size = payload.len(), "Processing receipt image");

    let model = build_model(&config.model)?;
    // Nothing is persisted; the pipeline only needs a store to be constructed.
    let scratch: Arc<dyn ReceiptStore> = Arc::new(SqliteReceiptStore::in_memory()?);
    let pipeline = ReceiptPipeline::from_config(config, model, scratch);

    let record = pipeline.extract(&payload).await?;
    let json = serde_json::to_string_pretty(&record)?;

    match output {
        Some(path) => {
            tokio::fs::write(path, json.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            note_success(&format!("Receipt written to {}", path.display()));
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for(Path::new("a/receipt.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("receipt.webp")), "image/webp");
        assert_eq!(mime_for(Path::new("receipt.jpeg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("receipt")), "image/jpeg");
    }
}
