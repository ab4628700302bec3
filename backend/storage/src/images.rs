use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use bilbot_core::{GroupId, Identity};

/// Receipt images on disk, one directory per day.
pub struct ImageStore {
    base: PathBuf,
}

impl ImageStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// `<base>/YYYY/MM/DD/receipt_<user>_<chat>_<message>_<HHMMSS>.jpg`
    pub fn path_for(&self, user: &Identity, chat: &GroupId, message_id: i64, at: DateTime<Utc>) -> PathBuf {
        self.base
            .join(at.format("%Y").to_string())
            .join(at.format("%m").to_string())
            .join(at.format("%d").to_string())
            .join(format!(
                "receipt_{}_{}_{}_{}.jpg",
                user,
                chat,
                message_id,
                at.format("%H%M%S")
            ))
    }

    /// Write `bytes` to the dated path and return it.
    pub async fn save(
        &self,
        user: &Identity,
        chat: &GroupId,
        message_id: i64,
        at: DateTime<Utc>,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = self.path_for(user, chat, message_id, at);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create image directory {}", dir.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write receipt image {}", path.display()))?;
        info!(path = %path.display(), size = bytes.len(), "Saved receipt image");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-05-17T09:04:05Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn dated_layout() {
        let store = ImageStore::new("data/images");
        let path = store.path_for(&Identity::from(42i64), &GroupId::from(-100i64), 7, at());
        assert_eq!(
            path,
            PathBuf::from("data/images/2025/05/17/receipt_42_-100_7_090405.jpg")
        );
    }

    #[tokio::test]
    async fn save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let path = store
            .save(&Identity::from("u1"), &GroupId::from("c1"), 1, at(), &[0xFF, 0xD8])
            .await
            .unwrap();
        assert!(path.starts_with(dir.path().join("2025").join("05").join("17")));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), vec![0xFF, 0xD8]);
    }
}
