use anyhow::Result;
use async_trait::async_trait;

use crate::receipt::StampedReceipt;
use crate::types::{ImagePayload, ReceiptId};

/// A vision-language model backend that answers a prompt about an image.
///
/// Implementations perform one attempt and return the raw answer text;
/// timeouts and failure tagging are applied by the caller.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Provider name (e.g., "ollama", "openai").
    fn name(&self) -> &str;

    /// Model identifier sent to the provider.
    fn model(&self) -> &str;

    /// Send the image and prompt, returning the model's text answer.
    async fn generate(&self, image: &ImagePayload, prompt: &str) -> Result<String>;
}

/// Persistence gateway for accepted receipts.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Append one receipt. Storing the same (group, message) twice returns
    /// the id of the first write.
    async fn store(&self, receipt: &StampedReceipt) -> Result<ReceiptId>;
}
