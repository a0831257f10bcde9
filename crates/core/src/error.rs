//! Job model error types.

use thiserror::Error;

/// Result type used across the job model.
pub type JobResult<T> = Result<T, JobError>;

/// Failure to move a job between its in-memory and stored forms.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The job could not be serialized.
    #[error("encode job failed: {0}")]
    Encode(String),

    /// The stored bytes are malformed or truncated.
    #[error("decode job failed: {0}")]
    Decode(String),
}

impl JobError {
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}
