use thiserror::Error;

/// Top-level error type for the BilboT runtime.
#[derive(Debug, Error)]
pub enum BilboError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("model provider error ({provider}): {message}")]
    Model { provider: String, message: String },

    #[error("image error: {0}")]
    Image(String),
}
