//! Task controller errors.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use delayq_core::{JobError, JobId};

use crate::store::StoreError;
use crate::ticker::TickerError;

/// Error reported by a job handler.
///
/// The controller never inspects it beyond "the job was not processed".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<String> for HandlerError {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for HandlerError {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Task controller error.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The requested time leaves less than one poll interval of lead time.
    #[error("add job failed, begin time too soon: {scheduled_at} is before {earliest}")]
    Scheduling {
        scheduled_at: DateTime<Utc>,
        earliest: DateTime<Utc>,
    },

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("job handler failed: {0}")]
    Handler(#[from] HandlerError),

    /// A due job was found past its TTL. Reported, never fatal.
    #[error("job {id} is out of time: scheduled at {scheduled_at}, ttl {ttl:?}")]
    Expired {
        id: JobId,
        scheduled_at: DateTime<Utc>,
        ttl: Duration,
    },

    #[error(transparent)]
    Trigger(#[from] TickerError),
}
