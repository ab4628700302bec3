use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::admission::RateLimitReason;

/// Why an event did not produce a stored receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionKind {
    RateLimited { reason: RateLimitReason },
    ModelUnavailable,
    ModelTimeout,
    NoExtractableData,
    StoreFailed,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionKind::RateLimited { .. } => f.write_str("rate_limited"),
            RejectionKind::ModelUnavailable => f.write_str("model_unavailable"),
            RejectionKind::ModelTimeout => f.write_str("model_timeout"),
            RejectionKind::NoExtractableData => f.write_str("no_extractable_data"),
            RejectionKind::StoreFailed => f.write_str("store_failed"),
        }
    }
}

/// A terminal, non-retried outcome of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind}: {detail}")]
pub struct Rejection {
    pub kind: RejectionKind,
    pub detail: String,
}

impl Rejection {
    pub fn new(kind: RejectionKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    pub fn rate_limited(reason: RateLimitReason) -> Self {
        let detail = reason.to_string();
        Self::new(RejectionKind::RateLimited { reason }, detail)
    }

    pub fn no_extractable_data() -> Self {
        Self::new(RejectionKind::NoExtractableData, "no items and no total in model response")
    }
}
