//! Error types surfaced by the prediction service

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PredictError>;

/// Failures a caller can act on. Missing context, failed classifiers and an
/// empty ensemble never surface here; they resolve to best-effort results.
#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Contest not found: {0}")]
    ContestNotFound(i64),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl PredictError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PredictError::ContestNotFound(_))
    }
}
