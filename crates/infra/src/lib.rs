//! Infrastructure layer: ordered stores, the poll ticker, and the task
//! controller built on them.

pub mod store;
pub mod tasks;
pub mod ticker;


pub use store::{InMemoryOrderedStore, OrderedStore, StoreError};
#[cfg(feature = "redis")]
pub use store::RedisOrderedStore;
pub use tasks::{
    ControllerStats, ExpiredJobHandler, HandlerError, JobHandler, JobOutcome, PollReport,
    TaskController, TaskControllerConfig, TaskError,
};
pub use ticker::{IntervalTicker, Tick, Ticker, TickerError};
