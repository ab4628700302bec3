//! Structured logging for BilboT.
//!
//! Handles subscriber setup (console + optional rolling NDJSON file),
//! secret redaction, and the `receipt_events` ingest event stream.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{IngestEvent, IngestEventEntry, IngestEventLogger};
pub use logger::{init_logger, LogGuard, LoggerOptions};
pub use redact::redact_sensitive_data;
