//! Pluggable job processing.

use delayq_core::Job;

use super::error::HandlerError;

/// Processes due jobs.
///
/// Returning `Ok` removes the job from the queue. Returning `Err` leaves it in
/// place so the next poll cycle offers it again, until the retry budget (if
/// configured) runs out. Delivery is at-least-once, so handlers must be
/// idempotent.
pub trait JobHandler: Send + Sync {
    fn handle(&self, job: &Job) -> Result<(), HandlerError>;
}

/// Processes jobs found past their TTL.
///
/// The job has already been removed when this runs; an `Err` is only logged.
pub trait ExpiredJobHandler: Send + Sync {
    fn handle_expired(&self, job: &Job) -> Result<(), HandlerError>;
}

/// Adapter turning a closure into a handler.
pub struct FnHandler<F>(pub F);

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&Job) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        (self.0)(job)
    }
}

impl<F> ExpiredJobHandler for FnHandler<F>
where
    F: Fn(&Job) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle_expired(&self, job: &Job) -> Result<(), HandlerError> {
        (self.0)(job)
    }
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnHandler")
    }
}
