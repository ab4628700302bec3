use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use bilbot_config::PreprocessingConfig;
use bilbot_core::{BilboError, ImagePayload, VisionModel};

use crate::prepare::{prepare_image, PrepareOptions};

pub const DEFAULT_MODEL: &str = "qwen2.5vl:32b";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Local Ollama server using the `/api/generate` endpoint.
pub struct OllamaVision {
    client: Client,
    base_url: String,
    model: String,
    num_ctx: u32,
    prepare: PrepareOptions,
}

impl OllamaVision {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            num_ctx: 8192,
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

    pub fn with_context_length(mut self, num_ctx: u32) -> Self {
        self.num_ctx = num_ctx;
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
}

impl Default for OllamaVision {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_ctx: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    eval_count: Option<u64>,
}

#[async_trait]
impl VisionModel for OllamaVision {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, image: &ImagePayload, prompt: &str) -> Result<String> {
        let prepared = prepare_image(image, &self.prepare).await;

        let body = GenerateRequest {
            model: &self.model,
            prompt,
            images: vec![STANDARD.encode(&prepared.bytes)],
            stream: false,
            options: GenerateOptions { num_ctx: self.num_ctx },
        };

        debug!(model = %self.model, image_bytes = prepared.len(), "Sending image to Ollama");

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .context("Ollama HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(BilboError::Model {
                provider: "ollama".to_string(),
                message: format!("Ollama returned {status}: {error_body}"),
            }
            .into());
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        debug!(
            model = %self.model,
            eval_count = generated.eval_count.unwrap_or(0),
            chars = generated.response.len(),
            "Ollama answered"
        );

        Ok(generated.response)
    }
}
