use thiserror::Error;

/// Why an attribution method could not be used. Never leaves this crate;
/// the explainer moves on to the next method instead.
#[derive(Error, Debug)]
pub(crate) enum Degraded {
    #[error("model does not expose {0}")]
    MissingCapability(&'static str),

    #[error("no background data")]
    EmptyBackground,

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("numerical failure: {0}")]
    Numerical(String),
}
