//! `bilbot preprocess <image>`: the photo clean-up the model would see, written to disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use bilbot_config::BilboConfig;
use bilbot_vision::{preprocess_bytes, PrepareOptions};

use crate::terminal_output::note_success;

/// Flags switch steps on; the configured steps always run.
pub async fn run(config: &BilboConfig, image: &Path, output: Option<&Path>, enhance: bool, deskew: bool) -> Result<()> {
    let mut options = PrepareOptions::from_config(&config.model);
    options.enhance |= enhance;
    options.deskew |= deskew;

    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read image {}", image.display()))?;
    info!(path = %image.display(), enhance = options.enhance, deskew = options.deskew, "Preprocessing image");

    let jpeg = tokio::task::spawn_blocking(move || preprocess_bytes(&bytes, &options)).await??;

    let target = output.map(Path::to_path_buf).unwrap_or_else(|| sibling_path(image, "preprocessed"));
    tokio::fs::write(&target, &jpeg)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;
    note_success(&format!("Preprocessed image written to {}", target.display()));
    Ok(())
}

/// `dir/receipt.png` → `dir/receipt_<suffix>.jpg`
pub fn sibling_path(image: &Path, suffix: &str) -> PathBuf {
    let stem = image.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    image.with_file_name(format!("{stem}_{suffix}.jpg"))
}
