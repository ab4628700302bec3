//! Receipt ingestion pipeline.
//!
//! `event → admission → model invocation → parser → derivation → emitter`.
//! [`ReceiptPipeline::process`] composes the stages; each stage is also
//! usable on its own.

pub mod admission;
pub mod amount;
pub mod currency;
pub mod datetime;
pub mod derive;
pub mod emitter;
pub mod intermediate;
pub mod invocation;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod rejection;

pub use admission::{AdmissionController, AdmissionDecision, AdmissionPolicy, RateLimitReason};
pub use derive::{derive, DerivationPolicy};
pub use emitter::RecordEmitter;
pub use intermediate::{DraftItem, IntermediateRecord};
pub use invocation::invoke;
pub use parser::{parse_response, parse_text, ParseFailure};
pub use pipeline::{AcceptedReceipt, ProcessOutcome, ReceiptPipeline};
pub use prompt::EXTRACTION_PROMPT;
pub use rejection::{Rejection, RejectionKind};
