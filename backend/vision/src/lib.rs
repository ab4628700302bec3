//! Vision model backends.
//!
//! Each backend implements [`VisionModel`]: one HTTP round trip per call,
//! with the image downscaled and re-encoded as JPEG first. `corners`
//! straightens a photographed document using corners the model points out.

pub mod corners;
pub mod enhance;
pub mod ollama;
pub mod openai;
pub mod prepare;

use std::sync::Arc;

use bilbot_config::{ModelConfig, ModelProviderKind};
use bilbot_core::{BilboError, VisionModel};

pub use ollama::OllamaVision;
pub use openai::OpenAiVision;
pub use corners::{detect_corners, straighten_document, DocumentCorners, Point, StraightenedDocument};
pub use prepare::{prepare_image, preprocess_bytes, PrepareOptions};

/// Build the backend selected in the configuration.
pub fn build_model(config: &ModelConfig) -> Result<Arc<dyn VisionModel>, BilboError> {
    let model: Arc<dyn VisionModel> = match config.provider {
        ModelProviderKind::Ollama => {
            let mut backend = OllamaVision::new()
                .with_context_length(config.max_context)
                .with_max_dimension(config.max_image_dimension)
                .with_preprocessing(config.preprocessing);
            if let Some(url) = &config.base_url {
                backend = backend.with_base_url(url);
            }
            if let Some(model) = &config.model {
                backend = backend.with_model(model);
            }
            Arc::new(backend)
        }
        ModelProviderKind::OpenAi => {
            let api_key = config
                .api_key
                .clone()
                .filter(|key| !key.is_empty())
                .ok_or_else(|| BilboError::Config("model.api_key is required for the openai provider".into()))?;
            let mut backend = OpenAiVision::new(api_key)
                .with_max_dimension(config.max_image_dimension)
                .with_preprocessing(config.preprocessing);
            if let Some(url) = &config.base_url {
                backend = backend.with_base_url(url);
            }
            if let Some(model) = &config.model {
                backend = backend.with_model(model);
            }
            Arc::new(backend)
        }
    };
    tracing::info!(provider = model.name(), model = model.model(), "Vision model configured");
    Ok(model)
}
