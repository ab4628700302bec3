//! Telegram Bot Commands
//!
//! `/start`, `/help` and `/list`. Every command passes through the same
//! admission controller as receipt photos.

use std::sync::Arc;

use bilbot_core::{GroupId, Identity};
use bilbot_ingest::AdmissionDecision;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

use crate::replies;
use crate::telegram::{remember_sender, reply, HandlerResult, TelegramContext};

/// Number of receipts shown by `/list`.
pub const LIST_LIMIT: usize = 10;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "BilboT commands:")]
pub enum Command {
    #[command(description = "start the bot and see the welcome message")]
    Start,
    #[command(description = "show this help message")]
    Help,
    #[command(description = "list your stored receipts")]
    List,
}

pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    ctx: Arc<TelegramContext>,
) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let identity = Identity::from(user.id.0);
    let group = GroupId::from(msg.chat.id.0);
    info!(identity = %identity, chat_id = %group, command = ?cmd, "Handling Telegram command");

    let key = ctx.pipeline.admission_key(&identity, &group);
    if let AdmissionDecision::Rejected(reason) = ctx.pipeline.admission().admit(&key, msg.date).await {
        info!(identity = %identity, %reason, "Command rate limited");
        reply(&bot, &msg, replies::rate_limited(&reason)).await?;
        return Ok(());
    }

    let text = match cmd {
        Command::Start => {
            remember_sender(&ctx, user, &msg).await;
            replies::welcome(Some(&user.first_name))
        }
        Command::Help => replies::help(),
        Command::List => match ctx.store.user_receipts(&identity, LIST_LIMIT).await {
            Ok(receipts) => replies::receipt_list(&receipts),
            Err(e) => {
                warn!(identity = %identity, "Failed to load receipts: {:#}", e);
                "Could not load your receipts. Please try again later.".to_string()
            }
        },
    };

    reply(&bot, &msg, text).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("/start", "bilbot_bot").ok(), Some(Command::Start));
        assert_eq!(Command::parse("/help", "bilbot_bot").ok(), Some(Command::Help));
        assert_eq!(Command::parse("/list@bilbot_bot", "bilbot_bot").ok(), Some(Command::List));
    }

    #[test]
    fn unknown_command_is_not_parsed() {
        assert!(Command::parse("/delete", "bilbot_bot").is_err());
    }

    #[test]
    fn descriptions_cover_every_command() {
        let text = Command::descriptions().to_string();
        assert!(text.contains("/start"));
        assert!(text.contains("/help"));
        assert!(text.contains("/list"));
    }
}
