use thiserror::Error;

/// Failure classes a stage can report for one work item. Both variants
/// escalate the item; the split keeps "this id can never be processed"
/// distinguishable from "this attempt failed" in logs and tests.
/// Frame-level recoverable errors never reach this type; they are
/// handled inside the counting run (see `pipeline::predictor`).
#[derive(Debug, Error)]
pub enum StageError {
    /// The item references state that is missing or invalid; redelivery
    /// cannot succeed.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The processing attempt failed; queue redelivery is the only
    /// retry mechanism.
    #[error(transparent)]
    Processing(#[from] anyhow::Error),
}

impl StageError {
    pub fn precondition(message: impl Into<String>) -> Self {
        StageError::Precondition(message.into())
    }
}
