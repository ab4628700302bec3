use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{GroupId, Identity};

/// Canonical rendering of a purchase timestamp.
pub const PURCHASE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One purchased line on a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub unit_price: Decimal,
    /// ISO 4217 code.
    pub currency: String,
}

/// Where the record's total came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalSource {
    /// Read from the receipt.
    Extracted,
    /// Summed from the line items.
    Computed,
}

/// Canonical, validated receipt.
///
/// `total` is always present. When items exist and no explicit total was
/// extracted, `total` equals the item sum. An extracted total that
/// disagrees with the sum beyond tolerance is kept and flagged with
/// `reconciliation_mismatch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRecord {
    pub items: Vec<LineItem>,
    pub purchased_at: Option<NaiveDateTime>,
    pub store: Option<String>,
    pub payment_method: Option<String>,
    pub total: Decimal,
    pub currency: String,
    pub currency_inferred: bool,
    pub reconciliation_mismatch: bool,
    pub total_source: TotalSource,
    /// Sum of the item prices; `None` when there are no items.
    pub items_sum: Option<Decimal>,
}

impl ValidatedRecord {
    /// Purchase timestamp in [`PURCHASE_TIMESTAMP_FORMAT`].
    pub fn purchased_at_canonical(&self) -> Option<String> {
        self.purchased_at
            .map(|ts| ts.format(PURCHASE_TIMESTAMP_FORMAT).to_string())
    }
}

/// Upstream facts the emitter stamps onto a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptContext {
    pub identity: Identity,
    pub group: GroupId,
    pub message_id: i64,
    pub admitted_at: DateTime<Utc>,
    pub caption: Option<String>,
    pub image_ref: Option<String>,
}

/// A validated record plus its provenance, as handed to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampedReceipt {
    pub context: ReceiptContext,
    pub record: ValidatedRecord,
}
