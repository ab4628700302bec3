//! Telegram Media Handler
//!
//! Locates the receipt image in an incoming message and downloads it.

use anyhow::{Context, Result};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileMeta, PhotoSize};
use tracing::debug;

/// The file to fetch for a receipt message.
#[derive(Debug, Clone)]
pub struct ImageAttachment<'a> {
    pub file: &'a FileMeta,
    pub mime_type: String,
}

/// Photo or image document carried by `msg`, if any.
///
/// Telegram sends several sizes of every photo; the largest one is used.
pub fn image_attachment(msg: &Message) -> Option<ImageAttachment<'_>> {
    if let Some(photo) = msg.photo().and_then(largest_photo) {
        return Some(ImageAttachment { file: &photo.file, mime_type: "image/jpeg".to_string() });
    }

    let document = msg.document()?;
    let mime_type = document.mime_type.as_ref()?.essence_str().to_string();
    is_image_mime(&mime_type).then(|| ImageAttachment { file: &document.file, mime_type })
}

pub fn largest_photo(photos: &[PhotoSize]) -> Option<&PhotoSize> {
    photos.iter().max_by_key(|p| area(p.width, p.height))
}

fn area(width: u32, height: u32) -> u64 {
    u64::from(width) * u64::from(height)
}

pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type.to_ascii_lowercase().starts_with("image/")
}

/// Download a Telegram file into memory.
pub async fn download(bot: &Bot, file: &FileMeta) -> Result<Vec<u8>> {
    let remote = bot
        .get_file(file.id.clone())
        .await
        .context("Failed to resolve Telegram file")?;

    let mut bytes = Vec::new();
    bot.download_file(&remote.path, &mut bytes)
        .await
        .context("Failed to download Telegram file")?;
    debug!(path = %remote.path, size = bytes.len(), "Downloaded Telegram file");
    Ok(bytes)
}
