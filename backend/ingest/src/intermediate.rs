use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount::parse_amount;
use crate::currency::CurrencyHint;

/// One priced line as read from the model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftItem {
    pub description: String,
    /// Price as parsed without knowledge of the receipt's decimal convention.
    pub unit_price: Decimal,
    /// Price text as the model wrote it.
    pub raw_price: String,
    pub currency_hint: Option<CurrencyHint>,
}

/// Loosely-typed fields extracted from a model response, before derivation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntermediateRecord {
    pub items: Vec<DraftItem>,
    pub store: Option<String>,
    pub payment_method: Option<String>,
    pub raw_datetime: Option<String>,
    pub raw_total: Option<String>,
    pub currency_hint: Option<CurrencyHint>,
}

impl IntermediateRecord {
    /// True when any field at all was recovered.
    pub fn has_any_field(&self) -> bool {
        !self.items.is_empty()
            || self.store.is_some()
            || self.payment_method.is_some()
            || self.raw_datetime.is_some()
            || self.raw_total.is_some()
            || self.currency_hint.is_some()
    }

    /// True when the record has at least one item or a parseable total.
    pub fn has_extractable_data(&self) -> bool {
        !self.items.is_empty()
            || self
                .raw_total
                .as_deref()
                .and_then(|t| parse_amount(t, None))
                .is_some()
    }

    /// Fill fields that are still empty from `other`.
    pub fn merge_missing(&mut self, other: IntermediateRecord) {
        if self.items.is_empty() {
            self.items = other.items;
        }
        self.store = self.store.take().or(other.store);
        self.payment_method = self.payment_method.take().or(other.payment_method);
        self.raw_datetime = self.raw_datetime.take().or(other.raw_datetime);
        self.raw_total = self.raw_total.take().or(other.raw_total);
        self.currency_hint = self.currency_hint.take().or(other.currency_hint);
    }
}
