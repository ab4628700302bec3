//! Reply texts sent back to the chat.
//!
//! Plain text only, so user-supplied store names never need escaping.

use bilbot_core::{ReceiptId, ValidatedRecord};
use bilbot_ingest::{RateLimitReason, Rejection, RejectionKind};
use bilbot_storage::ReceiptSummary;

const MAX_LIST_STORE_CHARS: usize = 40;

pub fn welcome(first_name: Option<&str>) -> String {
    let greeting = match first_name {
        Some(name) if !name.trim().is_empty() => format!("👋 Hello, {}!", name.trim()),
        _ => "👋 Hello!".to_string(),
    };
    format!(
        "{greeting}\n\n\
         I'm BilboT, your receipt management assistant. \
         I read your receipt photos and keep track of what you bought.\n\n\
         How to use me:\n\
         • Send me a photo of a receipt to store it\n\
         • Add a caption to include notes about the receipt\n\
         • Use /list to see your stored receipts\n\
         • Use /help to see all available commands\n\n\
         Let's get started! 📸"
    )
}

pub fn help() -> String {
    "BilboT - Receipt Management Bot\n\n\
     Available Commands:\n\
     /start - Start the bot and see welcome message\n\
     /help - Show this help message\n\
     /list - List your stored receipts\n\n\
     How to use:\n\
     • Simply send a photo of a receipt to store it\n\
     • Add a caption to include notes about the receipt\n\
     • Store, date, items and total are read from the image"
        .to_string()
}

pub fn rate_limited(reason: &RateLimitReason) -> String {
    match reason {
        RateLimitReason::Cooldown { .. } => format!(
            "You're sending messages too quickly. Please wait {} seconds before sending another message.",
            reason.retry_after_secs()
        ),
        RateLimitReason::GlobalCeiling { .. } => {
            "The bot is currently receiving too many messages. Please try again later.".to_string()
        }
    }
}

pub fn image_save_failed() -> String {
    "Failed to save receipt image. Please try again.".to_string()
}

pub fn rejected(rejection: &Rejection) -> String {
    match &rejection.kind {
        RejectionKind::RateLimited { reason } => rate_limited(reason),
        RejectionKind::ModelUnavailable => {
            "I couldn't reach the receipt reader right now. Please try again later.".to_string()
        }
        RejectionKind::ModelTimeout => {
            "Reading your receipt took too long. Please try again later.".to_string()
        }
        RejectionKind::NoExtractableData => {
            "I couldn't find any items or a total in that image. Please send a clearer photo of the receipt."
                .to_string()
        }
        RejectionKind::StoreFailed => "Failed to save receipt. Please try again.".to_string(),
    }
}

pub fn accepted(receipt_id: ReceiptId, record: &ValidatedRecord) -> String {
    let mut lines = vec![format!("Receipt saved! ID: {receipt_id}")];
    if let Some(store) = &record.store {
        lines.push(format!("🏪 Store: {store}"));
    }
    if let Some(date) = record.purchased_at_canonical() {
        lines.push(format!("📅 Date: {date}"));
    }
    if !record.items.is_empty() {
        lines.push(format!("🧾 Items: {}", record.items.len()));
    }

    let mut total = format!("💰 Total: {} {}", record.total, record.currency);
    if record.currency_inferred {
        total.push_str(" (currency assumed)");
    }
    lines.push(total);

    if record.reconciliation_mismatch {
        if let Some(sum) = record.items_sum {
            lines.push(format!(
                "⚠️ The items add up to {} {}, which does not match the total.",
                sum, record.currency
            ));
        }
    }
    lines.join("\n")
}

pub fn receipt_list(receipts: &[ReceiptSummary]) -> String {
    if receipts.is_empty() {
        return "You don't have any stored receipts yet. Send me a photo of a receipt to get started!"
            .to_string();
    }

    let mut text = format!("Your Receipts ({}):\n", receipts.len());
    for receipt in receipts {
        let store = receipt
            .store
            .as_deref()
            .map(|s| truncate(s, MAX_LIST_STORE_CHARS))
            .unwrap_or_else(|| "Unknown store".to_string());
        let date = receipt
            .purchased_at
            .clone()
            .unwrap_or_else(|| receipt.received_at.format("%Y-%m-%d %H:%M").to_string());
        let flag = if receipt.reconciliation_mismatch { " ⚠️" } else { "" };

        text.push_str(&format!(
            "\n#{} 🧾 {}\n📅 {} · {} item(s)\n💰 {} {}{}\n",
            receipt.id, store, date, receipt.item_count, receipt.total, receipt.currency, flag
        ));
    }
    text
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bilbot_core::{LineItem, TotalSource};
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::time::Duration;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn record() -> ValidatedRecord {
        ValidatedRecord {
            items: vec![
                LineItem { description: "Bread".into(), unit_price: dec("2.50"), currency: "EUR".into() },
                LineItem { description: "Milk".into(), unit_price: dec("1.00"), currency: "EUR".into() },
            ],
            purchased_at: NaiveDate::from_ymd_opt(2025, 5, 17).and_then(|d| d.and_hms_opt(14, 30, 0)),
            store: Some("Corner Shop".into()),
            payment_method: None,
            total: dec("3.50"),
            currency: "EUR".into(),
            currency_inferred: false,
            reconciliation_mismatch: false,
            total_source: TotalSource::Extracted,
            items_sum: Some(dec("3.50")),
        }
    }

    #[test]
    fn cooldown_reply_names_the_wait() {
        let reason = RateLimitReason::Cooldown { retry_after: Duration::from_millis(7_200) };
        assert_eq!(
            rate_limited(&reason),
            "You're sending messages too quickly. Please wait 8 seconds before sending another message."
        );
    }

    #[test]
    fn global_ceiling_reply_is_generic() {
        let reason = RateLimitReason::GlobalCeiling { retry_after: Duration::from_secs(30) };
        assert!(rate_limited(&reason).contains("too many messages"));
    }

    #[test]
    fn accepted_reply_lists_fields() {
        let text = accepted(7, &record());
        assert!(text.starts_with("Receipt saved! ID: 7"));
        assert!(text.contains("Store: Corner Shop"));
        assert!(text.contains("Date: 2025-05-17 14:30:00"));
        assert!(text.contains("Items: 2"));
        assert!(text.contains("Total: 3.50 EUR"));
        assert!(!text.contains("⚠️"));
    }

    #[test]
    fn accepted_reply_warns_on_mismatch() {
        let mut record = record();
        record.total = dec("5.00");
        record.reconciliation_mismatch = true;
        record.currency_inferred = true;
        let text = accepted(3, &record);
        assert!(text.contains("Total: 5.00 EUR (currency assumed)"));
        assert!(text.contains("items add up to 3.50 EUR"));
    }

    #[test]
    fn rejection_replies() {
        assert_eq!(
            rejected(&Rejection::new(RejectionKind::StoreFailed, "disk full")),
            "Failed to save receipt. Please try again."
        );
        assert!(rejected(&Rejection::no_extractable_data()).contains("clearer photo"));
        let limited = Rejection::rate_limited(RateLimitReason::Cooldown { retry_after: Duration::from_secs(3) });
        assert!(rejected(&limited).contains("wait 3 seconds"));
    }

    #[test]
    fn empty_list() {
        assert!(receipt_list(&[]).starts_with("You don't have any stored receipts yet."));
    }

    #[test]
    fn list_falls_back_to_received_date() {
        let summary = ReceiptSummary {
            id: 12,
            received_at: Utc.with_ymd_and_hms(2025, 5, 18, 8, 15, 0).unwrap(),
            purchased_at: None,
            store: None,
            total: dec("9.99"),
            currency: "USD".into(),
            reconciliation_mismatch: true,
            item_count: 0,
        };
        let text = receipt_list(&[summary]);
        assert!(text.starts_with("Your Receipts (1):"));
        assert!(text.contains("#12"));
        assert!(text.contains("Unknown store"));
        assert!(text.contains("2025-05-18 08:15"));
        assert!(text.contains("9.99 USD ⚠️"));
    }

    #[test]
    fn welcome_uses_first_name() {
        assert!(welcome(Some("Ana")).starts_with("👋 Hello, Ana!"));
        assert!(welcome(None).starts_with("👋 Hello!"));
    }

    #[test]
    fn truncates_long_store_names() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
