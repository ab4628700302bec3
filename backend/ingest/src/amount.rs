//! Monetary amount parsing with decimal-separator disambiguation.
//!
//! Receipts mix `1,234.50` and `1.234,50`. A single separator followed by
//! exactly three digits (`1.234`) is ambiguous; the caller may pass the
//! convention seen elsewhere on the same receipt to settle it, otherwise the
//! separator is read as a decimal point.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d(?:[\d.,']*\d)?").unwrap());

/// Which character marks the decimal point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalConvention {
    /// `1,234.50`
    Dot,
    /// `1.234,50`
    Comma,
}

impl DecimalConvention {
    fn separator(self) -> char {
        match self {
            DecimalConvention::Dot => '.',
            DecimalConvention::Comma => ',',
        }
    }

    fn from_separator(c: char) -> Option<Self> {
        match c {
            '.' => Some(DecimalConvention::Dot),
            ',' => Some(DecimalConvention::Comma),
            _ => None,
        }
    }
}

/// Result of inspecting a bare numeric token.
enum SeparatorReading {
    /// No separator present.
    Integer,
    /// This character is the decimal point; the others are grouping.
    Decimal(char),
    /// Every separator is a thousands separator.
    Grouping(char),
    /// One separator followed by exactly three digits.
    Ambiguous(char),
}

/// First numeric token in `raw` and whether it carries a minus sign.
fn first_number(raw: &str) -> Option<(&str, bool)> {
    let m = NUMBER_RE.find(raw)?;
    let prefix = &raw[..m.start()];
    let negative = prefix.contains('-') || prefix.contains('\u{2212}');
    Some((m.as_str(), negative))
}

fn read_separators(token: &str) -> SeparatorReading {
    let seps: Vec<(usize, char)> = token
        .char_indices()
        .filter(|(_, c)| *c == '.' || *c == ',')
        .collect();

    let Some(&(last_idx, last)) = seps.last() else {
        return SeparatorReading::Integer;
    };

    if seps.iter().any(|(_, c)| *c != last) {
        return SeparatorReading::Decimal(last);
    }

    let groups: Vec<&str> = token.split(last).collect();
    let integer_part = groups[0].trim_start_matches('\'');

    if seps.len() > 1 {
        let regular = groups[1..].iter().all(|g| g.len() == 3);
        return if regular && integer_part.len() <= 3 {
            SeparatorReading::Grouping(last)
        } else {
            SeparatorReading::Decimal(last)
        };
    }

    let digits_after = token.len() - last_idx - 1;
    if digits_after == 3 && integer_part != "0" && integer_part.len() <= 3 {
        SeparatorReading::Ambiguous(last)
    } else {
        SeparatorReading::Decimal(last)
    }
}

/// Parse the first amount found in `raw`.
///
/// Currency symbols and codes around the number are ignored. Returns `None`
/// when `raw` has no digits.
pub fn parse_amount(raw: &str, hint: Option<DecimalConvention>) -> Option<Decimal> {
    let (token, negative) = first_number(raw)?;

    let decimal_sep = match read_separators(token) {
        SeparatorReading::Integer | SeparatorReading::Grouping(_) => None,
        SeparatorReading::Decimal(c) => Some(c),
        SeparatorReading::Ambiguous(c) => match hint {
            Some(h) if h.separator() != c => None,
            _ => Some(c),
        },
    };

    let decimal_idx = decimal_sep.and_then(|c| token.rfind(c));
    let normalized: String = token
        .char_indices()
        .filter_map(|(i, c)| {
            if c.is_ascii_digit() {
                Some(c)
            } else if Some(i) == decimal_idx {
                Some('.')
            } else {
                None
            }
        })
        .collect();

    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

/// Unambiguous convention of a single sample, if it reveals one.
pub fn convention_of(raw: &str) -> Option<DecimalConvention> {
    let (token, _) = first_number(raw)?;
    match read_separators(token) {
        SeparatorReading::Decimal(c) => DecimalConvention::from_separator(c),
        SeparatorReading::Grouping(c) => match c {
            '.' => Some(DecimalConvention::Comma),
            _ => Some(DecimalConvention::Dot),
        },
        SeparatorReading::Integer | SeparatorReading::Ambiguous(_) => None,
    }
}

/// Majority convention across samples. Ties and no evidence give `None`.
pub fn infer_convention<'a>(samples: impl IntoIterator<Item = &'a str>) -> Option<DecimalConvention> {
    let (mut dot, mut comma) = (0usize, 0usize);
    for sample in samples {
        match convention_of(sample) {
            Some(DecimalConvention::Dot) => dot += 1,
            Some(DecimalConvention::Comma) => comma += 1,
            None => {}
        }
    }
    match dot.cmp(&comma) {
        std::cmp::Ordering::Greater => Some(DecimalConvention::Dot),
        std::cmp::Ordering::Less => Some(DecimalConvention::Comma),
        std::cmp::Ordering::Equal => None,
    }
}
