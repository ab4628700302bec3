use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{GroupId, Identity, ImagePayload};

/// One inbound image event, as handed over by the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptEvent {
    /// Correlation id for logs.
    pub id: Uuid,
    pub identity: Identity,
    pub group: GroupId,
    pub message_id: i64,
    pub image: ImagePayload,
    pub caption: Option<String>,
    /// Where the transport stored the original image, if it did.
    pub image_ref: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl ReceiptEvent {
    pub fn new(
        identity: Identity,
        group: GroupId,
        message_id: i64,
        image: ImagePayload,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            group,
            message_id,
            image,
            caption: None,
            image_ref: None,
            received_at,
        }
    }

    /// Reuse a correlation id handed out before the image was fetched.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_caption(mut self, caption: Option<String>) -> Self {
        self.caption = caption.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_image_ref(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }
}
