use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use bilbot_core::{
    ChatInfo, GroupId, Identity, LineItem, ReceiptId, ReceiptStore, SenderInfo, StampedReceipt,
    TotalSource,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        user_id     TEXT PRIMARY KEY,
        username    TEXT,
        first_name  TEXT,
        last_name   TEXT,
        created_at  TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS chats (
        chat_id     TEXT PRIMARY KEY,
        chat_title  TEXT,
        chat_type   TEXT NOT NULL,
        created_at  TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS receipts (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        message_id         INTEGER NOT NULL,
        user_id            TEXT NOT NULL,
        chat_id            TEXT NOT NULL,
        image_path         TEXT,
        received_date      TEXT NOT NULL,
        purchased_at       TEXT,
        store_name         TEXT,
        payment_method     TEXT,
        total_amount       TEXT NOT NULL,
        currency           TEXT NOT NULL DEFAULT 'USD',
        currency_inferred  INTEGER NOT NULL DEFAULT 0,
        total_mismatch     INTEGER NOT NULL DEFAULT 0,
        total_source       TEXT NOT NULL,
        comments           TEXT,
        record_json        TEXT NOT NULL,
        UNIQUE (chat_id, message_id)
    );
    CREATE TABLE IF NOT EXISTS receipt_items (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        receipt_id  INTEGER NOT NULL REFERENCES receipts (id),
        item_name   TEXT NOT NULL,
        item_price  TEXT NOT NULL,
        currency    TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_receipts_user ON receipts (user_id);
    CREATE INDEX IF NOT EXISTS idx_items_receipt ON receipt_items (receipt_id);
";

fn total_source_label(source: TotalSource) -> &'static str {
    match source {
        TotalSource::Extracted => "extracted",
        TotalSource::Computed => "computed",
    }
}

/// One row of `/list` output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptSummary {
    pub id: ReceiptId,
    pub received_at: DateTime<Utc>,
    pub purchased_at: Option<String>,
    pub store: Option<String>,
    pub total: Decimal,
    pub currency: String,
    pub reconciliation_mismatch: bool,
    pub item_count: usize,
}

/// SQLite-backed receipt store.
pub struct SqliteReceiptStore {
    conn: Mutex<Connection>,
}

impl SqliteReceiptStore {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite receipt database")?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA).context("Failed to initialize receipt schema")?;
        info!("Receipt store opened at {:?}", path);
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory database (for tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Insert or refresh a user's profile.
    pub async fn save_user(&self, user: &Identity, info: &SenderInfo) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO users (user_id, username, first_name, last_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                 username = excluded.username,
                 first_name = excluded.first_name,
                 last_name = excluded.last_name",
            params![
                user.as_str(),
                info.username,
                info.first_name,
                info.last_name,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Insert or refresh a chat's metadata.
    pub async fn save_chat(&self, chat: &GroupId, info: &ChatInfo) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO chats (chat_id, chat_title, chat_type, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chat_id) DO UPDATE SET
                 chat_title = excluded.chat_title,
                 chat_type = excluded.chat_type",
            params![chat.as_str(), info.title, info.kind.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Most recent receipts of one user, newest first.
    pub async fn user_receipts(&self, user: &Identity, limit: usize) -> Result<Vec<ReceiptSummary>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.received_date, r.purchased_at, r.store_name, r.total_amount,
                    r.currency, r.total_mismatch,
                    (SELECT COUNT(*) FROM receipt_items i WHERE i.receipt_id = r.id)
             FROM receipts r WHERE r.user_id = ?1
             ORDER BY r.id DESC LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![user.as_str(), limit], |row| {
                let id: i64 = row.get(0)?;
                let received: String = row.get(1)?;
                let purchased_at: Option<String> = row.get(2)?;
                let store: Option<String> = row.get(3)?;
                let total: String = row.get(4)?;
                let currency: String = row.get(5)?;
                let mismatch: bool = row.get(6)?;
                let item_count: usize = row.get(7)?;
                Ok((id, received, purchased_at, store, total, currency, mismatch, item_count))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(id, received, purchased_at, store, total, currency, mismatch, item_count)| {
                Some(ReceiptSummary {
                    id,
                    received_at: DateTime::parse_from_rfc3339(&received).ok()?.with_timezone(&Utc),
                    purchased_at,
                    store,
                    total: Decimal::from_str(&total).ok()?,
                    currency,
                    reconciliation_mismatch: mismatch,
                    item_count,
                })
            })
            .collect();

        Ok(rows)
    }

    /// Line items of one receipt in insertion order.
    pub async fn receipt_items(&self, receipt_id: ReceiptId) -> Result<Vec<LineItem>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT item_name, item_price, currency FROM receipt_items
             WHERE receipt_id = ?1 ORDER BY id ASC",
        )?;
        let items = stmt
            .query_map(params![receipt_id], |row| {
                let name: String = row.get(0)?;
                let price: String = row.get(1)?;
                let currency: String = row.get(2)?;
                Ok((name, price, currency))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(description, price, currency)| {
                Some(LineItem { description, unit_price: Decimal::from_str(&price).ok()?, currency })
            })
            .collect();
        Ok(items)
    }

    /// Count all stored receipts.
    pub async fn receipt_count(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: usize = conn.query_row("SELECT COUNT(*) FROM receipts", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[async_trait]
impl ReceiptStore for SqliteReceiptStore {
    async fn store(&self, receipt: &StampedReceipt) -> Result<ReceiptId> {
        let ctx = &receipt.context;
        let record = &receipt.record;
        let record_json = serde_json::to_string(record)?;

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO receipts (
                 message_id, user_id, chat_id, image_path, received_date, purchased_at,
                 store_name, payment_method, total_amount, currency, currency_inferred,
                 total_mismatch, total_source, comments, record_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                ctx.message_id,
                ctx.identity.as_str(),
                ctx.group.as_str(),
                ctx.image_ref,
                ctx.admitted_at.to_rfc3339(),
                record.purchased_at_canonical(),
                record.store,
                record.payment_method,
                record.total.to_string(),
                record.currency,
                record.currency_inferred,
                record.reconciliation_mismatch,
                total_source_label(record.total_source),
                ctx.caption,
                record_json,
            ],
        )?;

        if inserted == 0 {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM receipts WHERE chat_id = ?1 AND message_id = ?2",
                    params![ctx.group.as_str(), ctx.message_id],
                    |row| row.get(0),
                )
                .optional()?;
            tx.commit()?;
            let id = existing.context("Receipt row vanished after duplicate insert")?;
            debug!(receipt_id = id, message_id = ctx.message_id, "Duplicate receipt; keeping first write");
            return Ok(id);
        }

        let receipt_id = tx.last_insert_rowid();
        for item in &record.items {
            tx.execute(
                "INSERT INTO receipt_items (receipt_id, item_name, item_price, currency)
                 VALUES (?1, ?2, ?3, ?4)",
                params![receipt_id, item.description, item.unit_price.to_string(), item.currency],
            )?;
        }
        tx.commit()?;

        debug!(receipt_id, items = record.items.len(), "Receipt row written");
        Ok(receipt_id)
    }
}
