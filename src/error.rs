use thiserror::Error;

/// Failure taxonomy for the recommendation engine.
///
/// `Validation` rejects malformed input and leaves previous state untouched,
/// `DataUnavailable` surfaces unreachable collaborators to the caller, and
/// `Training` marks a pipeline run as failed without crashing the process.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("training failed: {0}")]
    Training(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn data_unavailable(msg: impl Into<String>) -> Self {
        Self::DataUnavailable(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }
}
