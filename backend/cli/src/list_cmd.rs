//! `bilbot list --user <id>`: stored receipts as a table.

use anyhow::{Context, Result};

use bilbot_config::BilboConfig;
use bilbot_core::Identity;
use bilbot_storage::{ReceiptSummary, SqliteReceiptStore};

use crate::terminal_output::{note_info, render_table, Column};

pub async fn run(config: &BilboConfig, user: &str, limit: usize) -> Result<()> {
    let store = SqliteReceiptStore::open(&config.database.path)
        .with_context(|| format!("Failed to open receipt database {}", config.database.path))?;
    let receipts = store.user_receipts(&Identity::new(user), limit).await?;

    if receipts.is_empty() {
        note_info(&format!("No receipts stored for user {user}"));
        return Ok(());
    }
    print!("{}", receipts_table(&receipts));
    Ok(())
}

fn receipts_table(receipts: &[ReceiptSummary]) -> String {
    let columns = [
        Column::right("ID"),
        Column::left("Received"),
        Column::left("Purchased"),
        Column::left("Store").max_width(32),
        Column::right("Items"),
        Column::right("Total"),
        Column::left("Flags"),
    ];
    let rows: Vec<Vec<String>> = receipts
        .iter()
        .map(|r| {
            vec![
                r.id.to_string(),
                r.received_at.format("%Y-%m-%d %H:%M").to_string(),
                r.purchased_at.clone().unwrap_or_else(|| "-".to_string()),
                r.store.clone().unwrap_or_else(|| "-".to_string()),
                r.item_count.to_string(),
                format!("{} {}", r.total, r.currency),
                if r.reconciliation_mismatch { "mismatch".to_string() } else { String::new() },
            ]
        })
        .collect();
    render_table(&columns, &rows)
}
