//! The end-to-end receipt pipeline.

use std::sync::Arc;
use std::time::Duration;

use bilbot_config::{AdmissionScope, BilboConfig};
use bilbot_core::{
    GroupId, Identity, ImagePayload, ModelFailureKind, ModelOutcome, ReceiptContext, ReceiptEvent,
    ReceiptId, ReceiptStore, ValidatedRecord, VisionModel,
};
use bilbot_logging::{IngestEvent, IngestEventLogger};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::admission::{AdmissionController, AdmissionDecision, AdmissionPolicy};
use crate::derive::{derive, DerivationPolicy};
use crate::emitter::RecordEmitter;
use crate::invocation::invoke;
use crate::parser::{parse_response, ParseFailure};
use crate::prompt::EXTRACTION_PROMPT;
use crate::rejection::{Rejection, RejectionKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptedReceipt {
    pub receipt_id: ReceiptId,
    pub record: ValidatedRecord,
}

/// Exactly one of these per event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Accepted(AcceptedReceipt),
    Rejected(Rejection),
}

impl ProcessOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ProcessOutcome::Accepted(_))
    }
}

pub struct ReceiptPipeline {
    admission: Arc<AdmissionController>,
    model: Arc<dyn VisionModel>,
    emitter: RecordEmitter,
    policy: DerivationPolicy,
    prompt: String,
    timeout: Duration,
    scope: AdmissionScope,
}

impl ReceiptPipeline {
    pub fn new(
        admission: Arc<AdmissionController>,
        model: Arc<dyn VisionModel>,
        store: Arc<dyn ReceiptStore>,
        policy: DerivationPolicy,
    ) -> Self {
        Self {
            admission,
            model,
            emitter: RecordEmitter::new(store),
            policy,
            prompt: EXTRACTION_PROMPT.to_string(),
            timeout: Duration::from_secs(120),
            scope: AdmissionScope::User,
        }
    }

    /// Wire a pipeline from the loaded configuration.
    pub fn from_config(config: &BilboConfig, model: Arc<dyn VisionModel>, store: Arc<dyn ReceiptStore>) -> Self {
        let admission = Arc::new(AdmissionController::new(AdmissionPolicy::from_config(
            &config.rate_limiting,
        )));
        Self::new(admission, model, store, DerivationPolicy::from_config(&config.extraction))
            .with_timeout(Duration::from_secs(config.model.timeout_secs))
            .with_scope(config.rate_limiting.scope)
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_scope(mut self, scope: AdmissionScope) -> Self {
        self.scope = scope;
        self
    }

    /// Shared so that transports can gate commands with the same limits.
    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Key the admission controller sees for this sender.
    pub fn admission_key(&self, identity: &Identity, group: &GroupId) -> Identity {
        match self.scope {
            AdmissionScope::User => identity.clone(),
            AdmissionScope::UserInChat => Identity::new(format!("{group}:{identity}")),
        }
    }

    /// Admission gate for one sender.
    ///
    /// Transports that must fetch the image first call this before the
    /// fetch and then hand the event to [`Self::process_admitted`]. Only an
    /// admission changes limiter state.
    pub async fn admit(
        &self,
        event_id: Uuid,
        identity: &Identity,
        group: &GroupId,
        received_at: DateTime<Utc>,
    ) -> Result<(), Rejection> {
        let key = self.admission_key(identity, group);
        match self.admission.admit(&key, received_at).await {
            AdmissionDecision::Allowed => {
                IngestEventLogger::log_event(event_id, identity.as_str(), IngestEvent::Admitted);
                Ok(())
            }
            AdmissionDecision::Rejected(reason) => {
                info!(identity = identity.as_str(), %reason, "Receipt event rate limited");
                IngestEventLogger::log_event(
                    event_id,
                    identity.as_str(),
                    IngestEvent::RateLimited { reason: reason.to_string() },
                );
                Err(Rejection::rate_limited(reason))
            }
        }
    }

    /// Run one event through every stage.
    ///
    /// Admission happens before any model call; a rejected event leaves
    /// nothing behind but a log line.
    pub async fn process(&self, event: ReceiptEvent) -> ProcessOutcome {
        if let Err(rejection) = self.admit(event.id, &event.identity, &event.group, event.received_at).await {
            return ProcessOutcome::Rejected(rejection);
        }
        self.process_admitted(event).await
    }

    /// Every stage after admission. `event` must already have passed
    /// [`Self::admit`].
    pub async fn process_admitted(&self, event: ReceiptEvent) -> ProcessOutcome {
        let identity = event.identity.as_str();

        let record = match self.run_extraction(event.id, identity, &event.image).await {
            Ok(record) => record,
            Err(rejection) => return ProcessOutcome::Rejected(rejection),
        };

        let context = ReceiptContext {
            identity: event.identity.clone(),
            group: event.group.clone(),
            message_id: event.message_id,
            admitted_at: event.received_at,
            caption: event.caption.clone(),
            image_ref: event.image_ref.clone(),
        };

        match self.emitter.emit(record, context).await {
            Ok((receipt_id, record)) => {
                IngestEventLogger::log_event(
                    event.id,
                    identity,
                    IngestEvent::Stored {
                        receipt_id,
                        items: record.items.len(),
                        total: record.total.to_string(),
                        currency: record.currency.clone(),
                        currency_inferred: record.currency_inferred,
                        reconciliation_mismatch: record.reconciliation_mismatch,
                    },
                );
                ProcessOutcome::Accepted(AcceptedReceipt { receipt_id, record })
            }
            Err(rejection) => {
                IngestEventLogger::log_event(
                    event.id,
                    identity,
                    IngestEvent::StoreFailed { error_msg: rejection.detail.clone() },
                );
                ProcessOutcome::Rejected(rejection)
            }
        }
    }

    /// Model call, parse, and derivation without admission or persistence.
    pub async fn extract(&self, image: &ImagePayload) -> Result<ValidatedRecord, Rejection> {
        self.run_extraction(Uuid::new_v4(), "local", image).await
    }

    async fn run_extraction(
        &self,
        event_id: Uuid,
        identity: &str,
        image: &ImagePayload,
    ) -> Result<ValidatedRecord, Rejection> {
        let response = invoke(self.model.as_ref(), image, &self.prompt, self.timeout).await;

        match &response.outcome {
            ModelOutcome::Failure { kind, message } => {
                IngestEventLogger::log_event(
                    event_id,
                    identity,
                    IngestEvent::ModelFailed {
                        provider: response.provider.clone(),
                        kind: kind.to_string(),
                        error_msg: message.clone(),
                        latency_ms: response.latency_ms,
                    },
                );
            }
            ModelOutcome::Success { text } => {
                IngestEventLogger::log_event(
                    event_id,
                    identity,
                    IngestEvent::ModelAnswered {
                        provider: response.provider.clone(),
                        model: response.model.clone(),
                        latency_ms: response.latency_ms,
                        chars: text.len(),
                    },
                );
            }
        }

        let intermediate = match parse_response(&response) {
            Ok(record) => record,
            Err(ParseFailure::ModelFailed(kind)) => {
                let kind = match kind {
                    ModelFailureKind::Timeout => RejectionKind::ModelTimeout,
                    ModelFailureKind::Unavailable => RejectionKind::ModelUnavailable,
                };
                let detail = match &response.outcome {
                    ModelOutcome::Failure { message, .. } => message.clone(),
                    ModelOutcome::Success { .. } => String::new(),
                };
                return Err(Rejection::new(kind, detail));
            }
            Err(ParseFailure::NoExtractableData) => {
                warn!(identity, provider = %response.provider, "Model response had no receipt data");
                IngestEventLogger::log_event(event_id, identity, IngestEvent::NoExtractableData);
                return Err(Rejection::no_extractable_data());
            }
        };

        derive(intermediate, &self.policy)
    }
}
