//! Redis sorted-set backed ordered store.
//!
//! Maps the [`OrderedStore`] contract onto Redis sorted-set commands:
//! - **Conditional insert**: `ZADD key NX score member`
//! - **Due query**: `ZRANGEBYSCORE key -inf max`
//! - **Bulk removal**: `ZREM key member...`
//! - **Enumeration**: `ZRANGE key 0 -1`
//!
//! One connection is cached and reused across calls; each call applies its
//! deadline to socket reads and writes. A connection that fails at the IO
//! level is discarded and the next call reconnects.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, instrument};

use super::r#trait::{OrderedStore, StoreError};

#[derive(Clone)]
pub struct RedisOrderedStore {
    client: Arc<redis::Client>,
    conn: Arc<Mutex<Option<redis::Connection>>>,
}

impl std::fmt::Debug for RedisOrderedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisOrderedStore")
            .field("client", &self.client)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl RedisOrderedStore {
    /// Create a store for `redis_url` (e.g. "redis://localhost:6379/1").
    ///
    /// No connection is made until the first operation.
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            conn: Arc::new(Mutex::new(None)),
        })
    }

    /// Check the server answers `PING` within `timeout`.
    pub fn ping(&self, timeout: Duration) -> Result<(), StoreError> {
        self.with_connection(timeout, |conn| {
            redis::cmd("PING").query::<String>(conn).map(|_| ())
        })
    }

    /// Whether a connection is currently cached.
    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<redis::Connection>> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn connect(&self, deadline: Option<Duration>) -> Result<redis::Connection, StoreError> {
        let conn = match deadline {
            Some(t) => self.client.get_connection_with_timeout(t),
            None => self.client.get_connection(),
        }
        .map_err(connection_error)?;
        debug!("redis connection opened");
        Ok(conn)
    }

    /// Run `op` on the cached connection, connecting first if needed.
    ///
    /// Calls are serialized on the single connection.
    fn with_connection<T>(
        &self,
        timeout: Duration,
        op: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T, StoreError> {
        let deadline = (!timeout.is_zero()).then_some(timeout);
        let mut slot = self.lock();

        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.connect(deadline)?,
        };
        conn.set_read_timeout(deadline).map_err(connection_error)?;
        conn.set_write_timeout(deadline).map_err(connection_error)?;

        match op(&mut conn) {
            Ok(value) => {
                *slot = Some(conn);
                Ok(value)
            }
            Err(e) => {
                if !is_broken(&e) {
                    *slot = Some(conn);
                }
                Err(command_error(e))
            }
        }
    }
}

/// Errors after which the connection cannot be trusted for the next command.
fn is_broken(e: &redis::RedisError) -> bool {
    e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
}

fn connection_error(e: redis::RedisError) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Connection(e.to_string())
    }
}

fn command_error(e: redis::RedisError) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout
    } else if e.is_connection_dropped() || e.is_connection_refusal() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}

impl OrderedStore for RedisOrderedStore {
    #[instrument(skip(self, member), err)]
    fn add_if_absent(
        &self,
        key: &str,
        score: i64,
        member: &[u8],
        timeout: Duration,
    ) -> Result<bool, StoreError> {
        let added: i64 = self.with_connection(timeout, |conn| {
            redis::cmd("ZADD")
                .arg(key)
                .arg("NX")
                .arg(score)
                .arg(member)
                .query(conn)
        })?;

        Ok(added > 0)
    }

    #[instrument(skip(self), err)]
    fn range_by_score(
        &self,
        key: &str,
        min: Option<i64>,
        max: i64,
        timeout: Duration,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        let min = min.map_or_else(|| "-inf".to_string(), |m| m.to_string());
        self.with_connection(timeout, |conn| {
            redis::cmd("ZRANGEBYSCORE")
                .arg(key)
                .arg(&min)
                .arg(max)
                .query(conn)
        })
    }

    #[instrument(skip(self, members), fields(count = members.len()), err)]
    fn remove(&self, key: &str, members: &[Vec<u8>], timeout: Duration) -> Result<u64, StoreError> {
        if members.is_empty() {
            return Ok(0);
        }

        self.with_connection(timeout, |conn| {
            redis::cmd("ZREM").arg(key).arg(members).query(conn)
        })
    }

    #[instrument(skip(self), err)]
    fn members(&self, key: &str, timeout: Duration) -> Result<Vec<Vec<u8>>, StoreError> {
        self.with_connection(timeout, |conn| {
            redis::cmd("ZRANGE").arg(key).arg(0).arg(-1).query(conn)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_urls() {
        assert!(matches!(
            RedisOrderedStore::new("not a url"),
            Err(StoreError::Connection(_))
        ));
    }

    #[test]
    fn unreachable_server_is_a_store_error() {
        // Port 1 on localhost is reserved and closed in practice.
        let store = RedisOrderedStore::new("redis://127.0.0.1:1/").unwrap();
        let err = store
            .members("delayq:test", Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, StoreError::Connection(_) | StoreError::Timeout));
    }

    #[test]
    fn failed_connect_caches_nothing_and_retries() {
        let store = RedisOrderedStore::new("redis://127.0.0.1:1/").unwrap();
        assert!(!store.is_connected());

        for _ in 0..2 {
            assert!(store.ping(Duration::from_millis(200)).is_err());
            assert!(!store.is_connected());
        }

        // Clones share the connection slot.
        let clone = store.clone();
        assert!(clone.range_by_score("delayq:test", None, 0, Duration::from_millis(200)).is_err());
        assert!(!store.is_connected());
    }
}
