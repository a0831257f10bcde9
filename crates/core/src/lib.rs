//! `delayq-core`: the job model of the delayed-task queue.
//!
//! This crate contains **pure** primitives (no IO): the job record, its
//! deterministic identity, its storage encoding and a scratch-instance pool.

pub mod error;
pub mod id;
pub mod job;
pub mod pool;

pub use error::{JobError, JobResult};
pub use id::JobId;
pub use job::{Job, JobOptions};
pub use pool::{JobPool, PooledJob};
