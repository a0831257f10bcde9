//! Ordered (sorted-set) store boundary.
//!
//! The queue keeps every job as a member of a sorted set scored by its
//! scheduled time. This module defines the small slice of sorted-set behavior
//! the queue relies on, plus in-memory and Redis-backed implementations.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod r#trait;

pub use in_memory::InMemoryOrderedStore;
#[cfg(feature = "redis")]
pub use redis::RedisOrderedStore;
pub use r#trait::{OrderedStore, StoreError};
