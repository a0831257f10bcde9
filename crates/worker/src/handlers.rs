//! Handlers the worker installs when run standalone.

use delayq_core::Job;
use delayq_infra::tasks::{ExpiredJobHandler, HandlerError, JobHandler};

/// Logs each due job and acknowledges it.
#[derive(Debug, Default)]
pub struct LogJobHandler;

impl JobHandler for LogJobHandler {
    fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        tracing::info!(
            job_id = %job.id,
            scheduled_at = %job.scheduled_at,
            payload = %String::from_utf8_lossy(&job.payload),
            "job due"
        );
        Ok(())
    }
}

/// Logs each job that missed its TTL.
#[derive(Debug, Default)]
pub struct LogExpiredHandler;

impl ExpiredJobHandler for LogExpiredHandler {
    fn handle_expired(&self, job: &Job) -> Result<(), HandlerError> {
        tracing::warn!(
            job_id = %job.id,
            scheduled_at = %job.scheduled_at,
            ttl_ms = job.ttl.as_millis() as u64,
            "job expired before it was handled"
        );
        Ok(())
    }
}
