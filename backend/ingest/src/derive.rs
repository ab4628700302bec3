//! Field derivation: turns an [`IntermediateRecord`] into a
//! [`ValidatedRecord`].

use std::collections::HashMap;
use std::str::FromStr;

use bilbot_config::ExtractionConfig;
use bilbot_core::{LineItem, TotalSource, ValidatedRecord};
use rust_decimal::Decimal;
use tracing::debug;

use crate::amount::{infer_convention, parse_amount};
use crate::currency::resolve;
use crate::datetime::{canonicalize, default_formats};
use crate::intermediate::IntermediateRecord;
use crate::rejection::Rejection;

#[derive(Debug, Clone)]
pub struct DerivationPolicy {
    /// ISO code used when the receipt gives no usable currency indication.
    pub fallback_currency: String,
    pub relative_tolerance: Decimal,
    pub absolute_tolerance: Decimal,
    /// Purchase timestamp formats, tried in order.
    pub date_formats: Vec<String>,
    /// Symbol → ISO code, consulted before the built-in symbol table.
    pub symbol_overrides: HashMap<String, String>,
}

impl Default for DerivationPolicy {
    fn default() -> Self {
        Self {
            fallback_currency: "USD".to_string(),
            relative_tolerance: Decimal::new(1, 2),
            absolute_tolerance: Decimal::new(1, 2),
            date_formats: default_formats(),
            symbol_overrides: HashMap::new(),
        }
    }
}

fn decimal_from_f64(value: f64, default: Decimal) -> Decimal {
    Decimal::from_str(&value.to_string()).unwrap_or(default)
}

impl DerivationPolicy {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let defaults = Self::default();
        Self {
            fallback_currency: config.fallback_currency.to_ascii_uppercase(),
            relative_tolerance: decimal_from_f64(config.relative_tolerance, defaults.relative_tolerance),
            absolute_tolerance: decimal_from_f64(config.absolute_tolerance, defaults.absolute_tolerance),
            date_formats: if config.date_formats.is_empty() {
                defaults.date_formats
            } else {
                config.date_formats.clone()
            },
            symbol_overrides: config.currency_symbols.clone(),
        }
    }

    /// `|total - sum| <= max(relative * |total|, absolute)`
    ///
    /// A difference too large to represent is never within tolerance.
    pub fn within_tolerance(&self, total: Decimal, items_sum: Decimal) -> bool {
        let allowed = self
            .relative_tolerance
            .checked_mul(total.abs())
            .unwrap_or(Decimal::MAX)
            .max(self.absolute_tolerance);
        match total.checked_sub(items_sum) {
            Some(diff) => diff.abs() <= allowed,
            None => false,
        }
    }
}

/// `None` when the prices overflow the decimal range.
fn checked_sum(items: &[LineItem]) -> Option<Decimal> {
    items
        .iter()
        .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.unit_price))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Derive the canonical record.
///
/// The decimal convention is inferred once across all prices on the receipt
/// and applied to every amount, so `1.234` next to `3,50` reads as 1234.
pub fn derive(record: IntermediateRecord, policy: &DerivationPolicy) -> Result<ValidatedRecord, Rejection> {
    if !record.has_extractable_data() {
        return Err(Rejection::no_extractable_data());
    }

    let convention = infer_convention(
        record
            .items
            .iter()
            .map(|item| item.raw_price.as_str())
            .chain(record.raw_total.as_deref()),
    );

    let overrides = &policy.symbol_overrides;
    let resolved = record
        .currency_hint
        .as_ref()
        .and_then(|hint| resolve(hint, overrides))
        .or_else(|| {
            record
                .items
                .iter()
                .filter_map(|item| item.currency_hint.as_ref())
                .find_map(|hint| resolve(hint, overrides))
        });
    let currency_inferred = resolved.is_none();
    let currency = resolved.unwrap_or_else(|| policy.fallback_currency.clone());

    let items: Vec<LineItem> = record
        .items
        .into_iter()
        .map(|item| LineItem {
            unit_price: parse_amount(&item.raw_price, convention).unwrap_or(item.unit_price),
            currency: item
                .currency_hint
                .as_ref()
                .and_then(|hint| resolve(hint, overrides))
                .unwrap_or_else(|| currency.clone()),
            description: item.description,
        })
        .collect();

    let items_sum = if items.is_empty() { None } else { checked_sum(&items) };
    let sum_overflowed = !items.is_empty() && items_sum.is_none();
    if sum_overflowed {
        debug!(items = items.len(), "Item prices overflow the decimal range, sum discarded");
    }
    let extracted_total = record.raw_total.as_deref().and_then(|raw| parse_amount(raw, convention));

    let (total, total_source, reconciliation_mismatch) = match (extracted_total, items_sum) {
        (Some(total), Some(sum)) => (total, TotalSource::Extracted, !policy.within_tolerance(total, sum)),
        (Some(total), None) => (total, TotalSource::Extracted, sum_overflowed),
        (None, Some(sum)) => (sum, TotalSource::Computed, false),
        (None, None) => return Err(Rejection::no_extractable_data()),
    };

    let purchased_at = record
        .raw_datetime
        .as_deref()
        .and_then(|raw| canonicalize(raw, &policy.date_formats));
    if purchased_at.is_none() {
        if let Some(raw) = &record.raw_datetime {
            debug!(raw = %raw, "Purchase timestamp did not match any format");
        }
    }

    Ok(ValidatedRecord {
        items,
        purchased_at,
        store: non_empty(record.store),
        payment_method: non_empty(record.payment_method),
        total,
        currency,
        currency_inferred,
        reconciliation_mismatch,
        total_source,
        items_sum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::CurrencyHint;
    use crate::intermediate::DraftItem;
    use crate::rejection::RejectionKind;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn item(description: &str, raw: &str) -> DraftItem {
        DraftItem {
            description: description.into(),
            unit_price: parse_amount(raw, None).unwrap(),
            raw_price: raw.into(),
            currency_hint: None,
        }
    }

    fn record(items: Vec<DraftItem>, raw_total: Option<&str>) -> IntermediateRecord {
        IntermediateRecord {
            items,
            raw_total: raw_total.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn total_is_computed_from_items() {
        let out = derive(record(vec![item("A", "3.50"), item("B", "2.00")], None), &DerivationPolicy::default()).unwrap();
        assert_eq!(out.total, d("5.50"));
        assert_eq!(out.total_source, TotalSource::Computed);
        assert!(!out.reconciliation_mismatch);
        assert_eq!(out.items_sum, Some(d("5.50")));
    }

    #[test]
    fn extracted_total_wins_and_is_flagged() {
        let out = derive(
            record(vec![item("A", "3.50"), item("B", "2.00")], Some("10.00")),
            &DerivationPolicy::default(),
        )
        .unwrap();
        assert_eq!(out.total, d("10.00"));
        assert_eq!(out.total_source, TotalSource::Extracted);
        assert!(out.reconciliation_mismatch);
    }

    #[test]
    fn small_differences_are_tolerated() {
        let policy = DerivationPolicy::default();
        let out = derive(record(vec![item("A", "3.50"), item("B", "2.00")], Some("5.505")), &policy).unwrap();
        assert!(!out.reconciliation_mismatch);

        // 1% of 1000 covers a difference of 5.
        let out = derive(record(vec![item("A", "995.00")], Some("1000.00")), &policy).unwrap();
        assert!(!out.reconciliation_mismatch);

        let out = derive(record(vec![item("A", "3.50")], Some("3.60")), &policy).unwrap();
        assert!(out.reconciliation_mismatch);
    }

    #[test]
    fn total_without_items() {
        let out = derive(record(vec![], Some("12,00 €")), &DerivationPolicy::default()).unwrap();
        assert_eq!(out.total, d("12.00"));
        assert_eq!(out.items_sum, None);
        assert!(!out.reconciliation_mismatch);
    }

    #[test]
    fn fallback_currency_is_marked_inferred() {
        let policy = DerivationPolicy { fallback_currency: "EUR".into(), ..Default::default() };
        let out = derive(record(vec![item("A", "1.00")], None), &policy).unwrap();
        assert_eq!(out.currency, "EUR");
        assert!(out.currency_inferred);
        assert_eq!(out.items[0].currency, "EUR");
    }

    #[test]
    fn explicit_currency_is_not_inferred() {
        let mut rec = record(vec![item("A", "1.00")], None);
        rec.currency_hint = Some(CurrencyHint::Code("GBP".into()));
        let out = derive(rec, &DerivationPolicy::default()).unwrap();
        assert_eq!(out.currency, "GBP");
        assert!(!out.currency_inferred);
    }

    #[test]
    fn ambiguous_symbol_uses_fallback_unless_overridden() {
        let mut rec = record(vec![item("A", "1.00")], None);
        rec.currency_hint = Some(CurrencyHint::Symbol("$".into()));

        let out = derive(rec.clone(), &DerivationPolicy::default()).unwrap();
        assert_eq!(out.currency, "USD");
        assert!(out.currency_inferred);

        let policy = DerivationPolicy {
            symbol_overrides: HashMap::from([("$".to_string(), "CAD".to_string())]),
            ..Default::default()
        };
        let out = derive(rec, &policy).unwrap();
        assert_eq!(out.currency, "CAD");
        assert!(!out.currency_inferred);
    }

    #[test]
    fn receipt_currency_can_come_from_items() {
        let mut euro = item("A", "1,00 €");
        euro.currency_hint = Some(CurrencyHint::Symbol("€".into()));
        let out = derive(record(vec![euro, item("B", "2,00")], None), &DerivationPolicy::default()).unwrap();
        assert_eq!(out.currency, "EUR");
        assert!(!out.currency_inferred);
        assert!(out.items.iter().all(|i| i.currency == "EUR"));
    }

    #[test]
    fn receipt_convention_settles_ambiguous_prices() {
        let out = derive(
            record(vec![item("TV", "1.234"), item("Cable", "3,50"), item("Plug", "2,00")], Some("1.239,50")),
            &DerivationPolicy::default(),
        )
        .unwrap();
        assert_eq!(out.items[0].unit_price, d("1234"));
        assert_eq!(out.total, d("1239.50"));
        assert!(!out.reconciliation_mismatch);
    }

    #[test]
    fn timestamp_is_canonicalized() {
        let mut rec = record(vec![item("A", "1.00")], None);
        rec.raw_datetime = Some("28.04.2025 12:01:24 Uhr".into());
        let out = derive(rec, &DerivationPolicy::default()).unwrap();
        assert_eq!(out.purchased_at_canonical().as_deref(), Some("2025-04-28 12:01:24"));
    }

    #[test]
    fn unparseable_timestamp_is_absent() {
        let mut rec = record(vec![item("A", "1.00")], None);
        rec.raw_datetime = Some("last tuesday".into());
        let out = derive(rec, &DerivationPolicy::default()).unwrap();
        assert!(out.purchased_at.is_none());
    }

    #[test]
    fn empty_record_is_rejected() {
        let err = derive(IntermediateRecord::default(), &DerivationPolicy::default()).unwrap_err();
        assert_eq!(err.kind, RejectionKind::NoExtractableData);
    }

    const MAX: &str = "79228162514264337593543950335";

    #[test]
    fn overflowing_item_sum_without_total_is_rejected() {
        let err = derive(record(vec![item("A", MAX), item("B", MAX)], None), &DerivationPolicy::default()).unwrap_err();
        assert_eq!(err.kind, RejectionKind::NoExtractableData);
    }

    #[test]
    fn overflowing_item_sum_keeps_extracted_total() {
        let out = derive(
            record(vec![item("A", MAX), item("B", MAX)], Some("12.00")),
            &DerivationPolicy::default(),
        )
        .unwrap();
        assert_eq!(out.total, d("12.00"));
        assert_eq!(out.items_sum, None);
        assert!(out.reconciliation_mismatch);
    }

    #[test]
    fn parsed_overflow_does_not_panic() {
        let parsed = crate::parser::parse_text(&format!(
            r#"{{"items":[{{"item":"A","price":"{MAX}"}},{{"item":"B","price":"{MAX}"}}]}}"#
        ))
        .unwrap();
        assert!(derive(parsed, &DerivationPolicy::default()).is_err());
    }

    #[test]
    fn unrepresentable_difference_is_a_mismatch() {
        let policy = DerivationPolicy::default();
        assert!(!policy.within_tolerance(d(MAX), -d(MAX)));
        let out = derive(record(vec![item("A", &format!("-{MAX}"))], Some(MAX)), &policy).unwrap();
        assert!(out.reconciliation_mismatch);
    }

    #[test]
    fn policy_from_config() {
        let config = ExtractionConfig {
            fallback_currency: "eur".into(),
            relative_tolerance: 0.02,
            absolute_tolerance: 0.05,
            ..Default::default()
        };
        let policy = DerivationPolicy::from_config(&config);
        assert_eq!(policy.fallback_currency, "EUR");
        assert_eq!(policy.relative_tolerance, d("0.02"));
        assert_eq!(policy.absolute_tolerance, d("0.05"));
        assert!(!policy.date_formats.is_empty());
    }
}
