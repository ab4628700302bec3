use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a model invocation produced no text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFailureKind {
    /// The call did not finish within the caller's timeout.
    Timeout,
    /// Transport, HTTP status, or response decoding failure.
    Unavailable,
}

impl fmt::Display for ModelFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFailureKind::Timeout => f.write_str("timeout"),
            ModelFailureKind::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// Success/failure tag of a model invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Success { text: String },
    Failure { kind: ModelFailureKind, message: String },
}

/// The unprocessed answer of one model invocation.
///
/// Failures never carry partial text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawModelResponse {
    pub provider: String,
    pub model: String,
    pub latency_ms: u64,
    pub outcome: ModelOutcome,
}

impl RawModelResponse {
    pub fn success(
        provider: impl Into<String>,
        model: impl Into<String>,
        text: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            latency_ms,
            outcome: ModelOutcome::Success { text: text.into() },
        }
    }

    pub fn failure(
        provider: impl Into<String>,
        model: impl Into<String>,
        kind: ModelFailureKind,
        message: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            latency_ms,
            outcome: ModelOutcome::Failure { kind, message: message.into() },
        }
    }

    /// Response text, or `None` for failures.
    pub fn text(&self) -> Option<&str> {
        match &self.outcome {
            ModelOutcome::Success { text } => Some(text),
            ModelOutcome::Failure { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ModelOutcome::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_has_no_text() {
        let resp = RawModelResponse::failure("ollama", "qwen", ModelFailureKind::Timeout, "slow", 5);
        assert!(resp.text().is_none());
        assert!(!resp.is_success());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let resp = RawModelResponse::success("openai", "gpt-4o", "{}", 12);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["outcome"]["status"], "success");
        assert_eq!(json["outcome"]["text"], "{}");
    }
}
