//! Error types for interpreters.

use parley_core::ParleyError;

/// Errors from building or calling an interpreter.
///
/// Parsing itself never fails; these only surface while wiring an
/// interpreter up or inside the HTTP client before it degrades.
#[derive(Debug, thiserror::Error)]
pub enum NluError {
    #[error("HTTP client error: {0}")]
    Client(String),
    #[error("NLU server returned status {0}")]
    Status(u16),
    #[error("invalid NLU response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Core(#[from] ParleyError),
}

impl From<reqwest::Error> for NluError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            NluError::InvalidResponse(err.to_string())
        } else {
            NluError::Client(err.to_string())
        }
    }
}
