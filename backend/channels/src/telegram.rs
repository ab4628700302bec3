use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bilbot_core::{ChatInfo, ChatKind, GroupId, Identity, ImagePayload, ReceiptEvent, SenderInfo};
use bilbot_ingest::{ProcessOutcome, ReceiptPipeline};
use bilbot_storage::{ImageStore, SqliteReceiptStore};
use chrono::{DateTime, Utc};
use teloxide::dispatching::HandlerExt;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{Chat, ReplyParameters, User};
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::replies;
use crate::telegram_commands::{handle_command, Command};
use crate::telegram_media::{download, image_attachment};
use crate::ChannelAdapter;

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Shared state injected into every handler.
pub struct TelegramContext {
    pub pipeline: Arc<ReceiptPipeline>,
    pub store: Arc<SqliteReceiptStore>,
    pub images: Arc<ImageStore>,
}

pub struct TelegramAdapter {
    bot: Bot,
    context: Arc<TelegramContext>,
}

impl TelegramAdapter {
    pub fn new(token: impl Into<String>, context: TelegramContext) -> Self {
        Self {
            bot: Bot::new(token),
            context: Arc::new(context),
        }
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn name(&self) -> &str { "telegram" }

    async fn start(&self) -> anyhow::Result<()> {
        info!("Starting Telegram adapter");

        let bot = self.bot.clone();
        if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
            warn!("Failed to register Telegram command list: {}", e);
        }

        let handler = Update::filter_message()
            .branch(dptree::entry().filter_command::<Command>().endpoint(handle_command))
            .branch(
                dptree::filter(|msg: Message| image_attachment(&msg).is_some()).endpoint(handle_image),
            );

        Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![self.context.clone()])
            .default_handler(|update| async move {
                tracing::debug!(update_id = ?update.id, "Ignoring Telegram update");
            })
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        info!("Telegram adapter stopped");
        Ok(())
    }
}

/// Photo or image document: admit, download, store, run through the pipeline, reply.
async fn handle_image(bot: Bot, msg: Message, ctx: Arc<TelegramContext>) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let Some(attachment) = image_attachment(&msg) else {
        return Ok(());
    };

    let incoming = IncomingImage {
        identity: Identity::from(user.id.0),
        group: GroupId::from(msg.chat.id.0),
        message_id: i64::from(msg.id.0),
        received_at: msg.date,
        mime_type: attachment.mime_type.clone(),
        caption: msg.caption().map(str::to_string),
    };
    info!(
        identity = %incoming.identity,
        chat_id = %incoming.group,
        message_id = incoming.message_id,
        "Received receipt image"
    );

    let (bot_ref, msg_ref, ctx_ref, file) = (&bot, &msg, ctx.as_ref(), attachment.file);
    let text = ingest_image(ctx_ref, incoming, move || async move {
        remember_sender(ctx_ref, user, msg_ref).await;
        download(bot_ref, file).await
    })
    .await;

    reply(&bot, &msg, text).await?;
    Ok(())
}

/// Transport-independent view of an incoming receipt image.
pub(crate) struct IncomingImage {
    pub identity: Identity,
    pub group: GroupId,
    pub message_id: i64,
    pub received_at: DateTime<Utc>,
    pub mime_type: String,
    pub caption: Option<String>,
}

/// Admission first; `fetch` runs only for admitted senders. Returns the reply text.
pub(crate) async fn ingest_image<F, Fut>(ctx: &TelegramContext, incoming: IncomingImage, fetch: F) -> String
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<u8>>>,
{
    let IncomingImage { identity, group, message_id, received_at, mime_type, caption } = incoming;
    let event_id = Uuid::new_v4();

    if let Err(rejection) = ctx.pipeline.admit(event_id, &identity, &group, received_at).await {
        return replies::rejected(&rejection);
    }

    let bytes = match fetch().await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(identity = %identity, message_id, "Error downloading receipt image: {:#}", e);
            return replies::image_save_failed();
        }
    };

    let path = match ctx.images.save(&identity, &group, message_id, received_at, &bytes).await {
        Ok(path) => path,
        Err(e) => {
            error!(identity = %identity, message_id, "Error saving receipt image: {:#}", e);
            return replies::image_save_failed();
        }
    };

    let event = ReceiptEvent::new(identity, group, message_id, ImagePayload::new(bytes, mime_type), received_at)
        .with_id(event_id)
        .with_caption(caption)
        .with_image_ref(path.display().to_string());

    match ctx.pipeline.process_admitted(event).await {
        ProcessOutcome::Accepted(accepted) => replies::accepted(accepted.receipt_id, &accepted.record),
        ProcessOutcome::Rejected(rejection) => {
            discard_image(path).await;
            replies::rejected(&rejection)
        }
    }
}

/// Upsert the sender and chat rows. Failures are logged, never fatal.
pub(crate) async fn remember_sender(ctx: &TelegramContext, user: &User, msg: &Message) {
    let identity = Identity::from(user.id.0);
    let sender = SenderInfo {
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()),
        last_name: user.last_name.clone(),
    };
    if let Err(e) = ctx.store.save_user(&identity, &sender).await {
        warn!(identity = %identity, "Failed to save user: {:#}", e);
    }

    let group = GroupId::from(msg.chat.id.0);
    let chat = ChatInfo {
        title: msg.chat.title().map(str::to_string),
        kind: chat_kind(&msg.chat),
    };
    if let Err(e) = ctx.store.save_chat(&group, &chat).await {
        warn!(chat_id = %group, "Failed to save chat: {:#}", e);
    }
}

pub(crate) async fn reply(bot: &Bot, msg: &Message, text: String) -> Result<(), teloxide::RequestError> {
    bot.send_message(msg.chat.id, text)
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
    Ok(())
}

fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if chat.is_group() {
        ChatKind::Group
    } else {
        ChatKind::Channel
    }
}

async fn discard_image(path: PathBuf) {
    if let Err(e) = tokio::fs::remove_file(&path).await {
        warn!(path = %path.display(), "Failed to remove image of rejected receipt: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bilbot_core::VisionModel;
    use bilbot_ingest::{AdmissionController, AdmissionPolicy, DerivationPolicy};

    struct FixedModel;

    #[async_trait]
    impl VisionModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed-1"
        }

        async fn generate(&self, _image: &ImagePayload, _prompt: &str) -> anyhow::Result<String> {
            Ok(r#"{"store": "Corner Shop", "items": [{"item": "Bread", "price": "2.50"}], "total": "2.50"}"#.to_string())
        }
    }

    fn context(dir: &std::path::Path) -> TelegramContext {
        let store = Arc::new(SqliteReceiptStore::in_memory().unwrap());
        let admission = Arc::new(AdmissionController::new(AdmissionPolicy::default()));
        let pipeline = ReceiptPipeline::new(admission, Arc::new(FixedModel), store.clone(), DerivationPolicy::default());
        TelegramContext {
            pipeline: Arc::new(pipeline),
            store,
            images: Arc::new(ImageStore::new(dir)),
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-05-17T09:04:05Z").unwrap().with_timezone(&Utc)
    }

    fn incoming(message_id: i64, received_at: DateTime<Utc>) -> IncomingImage {
        IncomingImage {
            identity: Identity::from(42i64),
            group: GroupId::from(-100i64),
            message_id,
            received_at,
            mime_type: "image/jpeg".to_string(),
            caption: Some("groceries".to_string()),
        }
    }

    #[tokio::test]
    async fn rate_limited_image_is_never_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let counter = AtomicUsize::new(0);
        let fetches = &counter;

        let first = ingest_image(&ctx, incoming(1, t0()), move || async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(vec![0xFF, 0xD8, 0xFF])
        })
        .await;
        assert!(first.starts_with("Receipt saved! ID: 1"), "{first}");

        let later = t0() + chrono::Duration::seconds(1);
        let second = ingest_image(&ctx, incoming(2, later), move || async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(vec![0xFF, 0xD8, 0xFF])
        })
        .await;
        assert!(second.contains("Please wait"), "{second}");

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let images = &ctx.images;
        assert!(images.path_for(&Identity::from(42i64), &GroupId::from(-100i64), 1, t0()).exists());
        assert!(!images.path_for(&Identity::from(42i64), &GroupId::from(-100i64), 2, later).exists());
        assert_eq!(ctx.store.receipt_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_download_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        let text = ingest_image(&ctx, incoming(1, t0()), || async {
            Err::<Vec<u8>, _>(anyhow::anyhow!("file is too big"))
        }).await;
        assert_eq!(text, replies::image_save_failed());
        assert_eq!(ctx.store.receipt_count().await.unwrap(), 0);
    }
}
