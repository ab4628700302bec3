//! `bilbot corners <image>`: ask the model for the document corners, then
//! crop and straighten the page.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::info;

use bilbot_config::{BilboConfig, ModelConfig, PreprocessingConfig};
use bilbot_vision::{build_model, straighten_document};

use crate::preprocess_cmd::sibling_path;
use crate::terminal_output::{note_info, note_success};

pub async fn run(config: &BilboConfig, image: &Path, output: Option<&Path>, report: Option<&Path>) -> Result<()> {
    // Corner coordinates refer to the exact image sent, so the backend must not reshape it.
    let model_config = ModelConfig { preprocessing: PreprocessingConfig::default(), ..config.model.clone() };
    let model = build_model(&model_config)?;

    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read image {}", image.display()))?;
    note_info(&format!("Detecting document corners with {} ({})", model.name(), model.model()));
    info!(path = %image.display(), size = bytes.len(), "Straightening document");

    let page = straighten_document(model.as_ref(), bytes, config.model.max_image_dimension).await?;

    let target = output.map(Path::to_path_buf).unwrap_or_else(|| sibling_path(image, "deskewed"));
    tokio::fs::write(&target, &page.jpeg)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;

    let summary = json!({
        "success": true,
        "corners": page.corners,
        "original_image": image.display().to_string(),
        "deskewed_image": target.display().to_string(),
        "width": page.width,
        "height": page.height,
    });
    let text = serde_json::to_string_pretty(&summary)?;
    match report {
        Some(path) => {
            tokio::fs::write(path, text.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            note_success(&format!("Straightened page written to {}, report to {}", target.display(), path.display()));
        }
        None => println!("{text}"),
    }
    Ok(())
}
