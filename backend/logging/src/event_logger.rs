//! Ingest Event Logger
//!
//! One structured event per pipeline milestone, emitted on the
//! `receipt_events` target so it can be filtered or shipped separately.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestEvent {
    Admitted,
    RateLimited {
        reason: String,
    },
    ModelFailed {
        provider: String,
        kind: String,
        error_msg: String,
        latency_ms: u64,
    },
    ModelAnswered {
        provider: String,
        model: String,
        latency_ms: u64,
        chars: usize,
    },
    NoExtractableData,
    Stored {
        receipt_id: i64,
        items: usize,
        total: String,
        currency: String,
        currency_inferred: bool,
        reconciliation_mismatch: bool,
    },
    StoreFailed {
        error_msg: String,
    },
}

#[derive(Debug, Serialize)]
pub struct IngestEventEntry {
    pub event_id: Uuid,
    pub identity: String,
    pub timestamp: DateTime<Utc>,
    pub event: IngestEvent,
}

pub struct IngestEventLogger;

impl IngestEventLogger {
    /// Log a pipeline event with free-text fields redacted.
    pub fn log_event(event_id: Uuid, identity: &str, mut event: IngestEvent) {
        match &mut event {
            IngestEvent::ModelFailed { error_msg, .. } | IngestEvent::StoreFailed { error_msg } => {
                *error_msg = redact_sensitive_data(error_msg);
            }
            _ => {}
        }

        let entry = IngestEventEntry {
            event_id,
            identity: identity.to_string(),
            timestamp: Utc::now(),
            event,
        };

        let payload = serde_json::to_string(&entry).unwrap_or_default();
        info!(target: "receipt_events", event_id = %entry.event_id, %payload, "Ingest event");
    }
}
