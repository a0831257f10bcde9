//! Delayed-job task controller.
//!
//! ## Design
//!
//! - Jobs are stored as encoded members of one sorted set, scored by their
//!   scheduled epoch second
//! - A ticker polls for due jobs every `poll_interval`
//! - A due job is handed to the [`JobHandler`]; success removes it, failure
//!   keeps it for the next cycle (at-least-once delivery)
//! - Jobs past their TTL are removed and handed to the [`ExpiredJobHandler`]
//!   instead
//! - Job identity is derived from schedule time and payload, so re-adding the
//!   same job is a no-op
//!
//! ## Components
//!
//! - `TaskController`: add/list/remove jobs, run and stop the poll loop
//! - `TaskControllerConfig`: interval, key, blocking mode, retry budget
//! - `JobHandler` / `ExpiredJobHandler`: pluggable processing
//! - `PollReport` / `JobOutcome`: what one poll cycle did

pub mod config;
pub mod controller;
pub mod error;
pub mod handler;

pub use config::{ConfigError, TaskControllerConfig, DEFAULT_KEY, DEFAULT_POLL_INTERVAL};
pub use controller::{
    ControllerStats, JobOutcome, PollReport, TaskController, TaskControllerBuilder,
};
pub use error::{HandlerError, TaskError};
pub use handler::{ExpiredJobHandler, FnHandler, JobHandler};
