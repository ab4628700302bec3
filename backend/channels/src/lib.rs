use async_trait::async_trait;

pub mod replies;
pub mod telegram;
pub mod telegram_commands;
pub mod telegram_media;

pub use telegram::{TelegramAdapter, TelegramContext};
pub use telegram_commands::Command;

/// All chat transports implement this trait.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Human-readable adapter name for logging.
    fn name(&self) -> &str;

    /// Run the adapter until it is shut down.
    async fn start(&self) -> anyhow::Result<()>;
}
