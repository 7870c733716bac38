use prediction_core::ModelKey;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MLError {
    #[error("Model not loaded: {0}")]
    ModelNotLoaded(ModelKey),

    #[error("Invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("Feature shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type MLResult<T> = Result<T, MLError>;
