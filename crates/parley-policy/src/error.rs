//! Error types for policies and online training.

use parley_core::ParleyError;

/// Errors from training, predicting with, or persisting policies.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("unknown policy '{0}'")]
    UnknownPolicy(String),
    #[error("policy '{0}' has not been trained")]
    NotTrained(&'static str),
    #[error("training data shape mismatch: expected {expected} features, found {found}")]
    ShapeMismatch { expected: usize, found: usize },
    #[error("invalid story at line {line}: {message}")]
    Story { line: usize, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Online(#[from] OnlineError),
    #[error(transparent)]
    Core(#[from] ParleyError),
}

impl From<serde_json::Error> for PolicyError {
    fn from(err: serde_json::Error) -> Self {
        PolicyError::Serialization(err.to_string())
    }
}

/// Errors that end an interactive training session.
#[derive(Debug, thiserror::Error)]
pub enum OnlineError {
    #[error("Incorrect user input received '{input}'. Valid answers are: {}", .valid.join(", "))]
    InvalidInput { input: String, valid: Vec<String> },
    #[error("no more input available")]
    InputExhausted,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
