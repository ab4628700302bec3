use std::time::{Duration, Instant};

use bilbot_core::{ImagePayload, ModelFailureKind, RawModelResponse, VisionModel};
use bilbot_logging::redact_sensitive_data;
use tracing::{debug, warn};

/// Ask `model` about `image`, giving up after `timeout`.
///
/// Never fails: transport errors and timeouts come back as a failure-tagged
/// [`RawModelResponse`]. One attempt only.
pub async fn invoke(
    model: &dyn VisionModel,
    image: &ImagePayload,
    prompt: &str,
    timeout: Duration,
) -> RawModelResponse {
    let start = Instant::now();
    let result = tokio::time::timeout(timeout, model.generate(image, prompt)).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(text)) => {
            debug!(provider = model.name(), latency_ms, chars = text.len(), "Model answered");
            RawModelResponse::success(model.name(), model.model(), text, latency_ms)
        }
        Ok(Err(e)) => {
            let detail = redact_sensitive_data(&format!("{e:#}"));
            warn!(provider = model.name(), error = %detail, "Model call failed");
            RawModelResponse::failure(
                model.name(),
                model.model(),
                ModelFailureKind::Unavailable,
                detail,
                latency_ms,
            )
        }
        Err(_) => {
            warn!(provider = model.name(), "Model call timed out after {}s", timeout.as_secs());
            RawModelResponse::failure(
                model.name(),
                model.model(),
                ModelFailureKind::Timeout,
                format!("no answer within {}s", timeout.as_secs()),
                latency_ms,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use bilbot_core::ModelOutcome;

    struct Scripted {
        delay: Duration,
        answer: Option<&'static str>,
        failure: &'static str,
    }

    #[async_trait]
    impl VisionModel for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "test"
        }

        async fn generate(&self, _image: &ImagePayload, _prompt: &str) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            match self.answer {
                Some(text) => Ok(text.to_string()),
                None => anyhow::bail!("{}", self.failure),
            }
        }
    }

    fn image() -> ImagePayload {
        ImagePayload::jpeg(vec![0xFF, 0xD8])
    }

    #[tokio::test]
    async fn success_carries_text() {
        let model = Scripted { delay: Duration::ZERO, answer: Some("{}"), failure: "" };
        let resp = invoke(&model, &image(), "p", Duration::from_secs(1)).await;
        assert_eq!(resp.text(), Some("{}"));
        assert_eq!(resp.provider, "scripted");
    }

    #[tokio::test]
    async fn error_is_unavailable() {
        let model = Scripted { delay: Duration::ZERO, answer: None, failure: "connection refused" };
        let resp = invoke(&model, &image(), "p", Duration::from_secs(1)).await;
        match resp.outcome {
            ModelOutcome::Failure { kind, message } => {
                assert_eq!(kind, ModelFailureKind::Unavailable);
                assert!(message.contains("connection refused"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_detail_is_redacted() {
        let model = Scripted {
            delay: Duration::ZERO,
            answer: None,
            failure: "OpenAI 401: Incorrect API key provided: sk-proj-abcdefghijklmnopqrstuvwx",
        };
        let resp = invoke(&model, &image(), "p", Duration::from_secs(1)).await;
        match resp.outcome {
            ModelOutcome::Failure { message, .. } => {
                assert!(message.contains("OpenAI 401"));
                assert!(!message.contains("sk-proj-abcdefghijklmnopqrstuvwx"));
                assert!(message.contains("[REDACTED_TOKEN]"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out() {
        let model = Scripted { delay: Duration::from_secs(30), answer: Some("late"), failure: "" };
        let resp = invoke(&model, &image(), "p", Duration::from_secs(5)).await;
        assert!(matches!(
            resp.outcome,
            ModelOutcome::Failure { kind: ModelFailureKind::Timeout, .. }
        ));
        assert!(resp.text().is_none());
    }
}
