use crate::types::{ModelKey, PredictionResponse};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Model not loaded: {0}")]
    ModelUnavailable(ModelKey),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The prediction was computed but the audit write failed.
    #[error("Failed to persist prediction: {message}")]
    Persistence {
        message: String,
        response: Box<PredictionResponse>,
    },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

pub type PredictionResult<T> = Result<T, PredictionError>;

impl From<anyhow::Error> for PredictionError {
    fn from(err: anyhow::Error) -> Self {
        PredictionError::Unexpected(err.to_string())
    }
}
