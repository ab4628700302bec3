use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use bilbot_config::PreprocessingConfig;
use bilbot_core::{BilboError, ImagePayload, VisionModel};

use crate::prepare::{prepare_image, PrepareOptions};

pub const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI chat completions with an inline image, asking for a JSON object.
pub struct OpenAiVision {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    prepare: PrepareOptions,
}

impl OpenAiVision {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: DEFAULT_MODEL.to_string(),
            prepare: PrepareOptions::default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.prepare.max_dimension = max_dimension;
        self
    }

    pub fn with_preprocessing(mut self, preprocessing: PreprocessingConfig) -> Self {
        self.prepare.enhance = preprocessing.enhance;
        self.prepare.deskew = preprocessing.deskew;
        self
    }

    fn request_body(&self, data_url: &str, prompt: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }],
            "response_format": { "type": "json_object" },
            "max_tokens": 1024
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl VisionModel for OpenAiVision {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, image: &ImagePayload, prompt: &str) -> Result<String> {
        let prepared = prepare_image(image, &self.prepare).await;
        let data_url = format!("data:{};base64,{}", prepared.mime_type, STANDARD.encode(&prepared.bytes));

        debug!(model = %self.model, image_bytes = prepared.len(), "Sending image to OpenAI");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(&data_url, prompt))
            .send()
            .await
            .context("OpenAI HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(BilboError::Model {
                provider: "openai".to_string(),
                message: format!("OpenAI returned {status}: {error_body}"),
            }
            .into());
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("OpenAI response had no message content")?;

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_requests_json_and_inlines_image() {
        let backend = OpenAiVision::new("sk-test");
        let body = backend.request_body("data:image/jpeg;base64,AAAA", "read it");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["content"][0]["text"], "read it");
        assert_eq!(
            body["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,AAAA"
        );
    }

    #[test]
    fn empty_choices_decode() {
        let chat: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(chat.choices.is_empty());
        let chat: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "{}"}}]}"#).unwrap();
        assert_eq!(chat.choices[0].message.content.as_deref(), Some("{}"));
    }
}
