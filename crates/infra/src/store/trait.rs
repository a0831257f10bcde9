use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Failure reported by an ordered store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The operation did not complete within its deadline.
    #[error("store operation timed out")]
    Timeout,

    /// The store could not be reached.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The store rejected or failed the command.
    #[error("store command error: {0}")]
    Command(String),
}

/// Sorted-set store holding `(score, member)` pairs under a namespace key.
///
/// Members are unique within a key; ordering is by score, then member bytes.
/// Every operation takes a deadline; implementations that perform IO must
/// give up with [`StoreError::Timeout`] once it passes.
pub trait OrderedStore: Send + Sync {
    /// Insert `member` with `score` unless the exact member already exists
    /// (`ZADD NX`). Returns whether an insert happened.
    fn add_if_absent(
        &self,
        key: &str,
        score: i64,
        member: &[u8],
        timeout: Duration,
    ) -> Result<bool, StoreError>;

    /// Members with `min <= score <= max`, in score order.
    ///
    /// `min = None` is unbounded below.
    fn range_by_score(
        &self,
        key: &str,
        min: Option<i64>,
        max: i64,
        timeout: Duration,
    ) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Remove the exact members given. Returns how many were present.
    fn remove(&self, key: &str, members: &[Vec<u8>], timeout: Duration) -> Result<u64, StoreError>;

    /// Every member under `key`, in score order.
    fn members(&self, key: &str, timeout: Duration) -> Result<Vec<Vec<u8>>, StoreError>;
}

impl<T: OrderedStore + ?Sized> OrderedStore for Arc<T> {
    fn add_if_absent(
        &self,
        key: &str,
        score: i64,
        member: &[u8],
        timeout: Duration,
    ) -> Result<bool, StoreError> {
        (**self).add_if_absent(key, score, member, timeout)
    }

    fn range_by_score(
        &self,
        key: &str,
        min: Option<i64>,
        max: i64,
        timeout: Duration,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        (**self).range_by_score(key, min, max, timeout)
    }

    fn remove(&self, key: &str, members: &[Vec<u8>], timeout: Duration) -> Result<u64, StoreError> {
        (**self).remove(key, members, timeout)
    }

    fn members(&self, key: &str, timeout: Duration) -> Result<Vec<Vec<u8>>, StoreError> {
        (**self).members(key, timeout)
    }
}
