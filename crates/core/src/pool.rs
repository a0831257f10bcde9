//! Pool of reusable scratch jobs.

use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use crate::job::Job;

/// Default cap on idle instances kept by a pool.
pub const DEFAULT_MAX_IDLE: usize = 64;

/// Object pool handing out reset [`Job`] instances.
///
/// - `acquire` always yields a job in its zero state
/// - the returned guard gives exclusive access; no other caller can observe
///   the same instance until it is dropped
/// - dropping the guard resets the job and returns it, so release happens on
///   every exit path (including `?` early returns)
#[derive(Debug)]
pub struct JobPool {
    idle: Mutex<Vec<Job>>,
    max_idle: usize,
}

impl JobPool {
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE)
    }

    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Borrow a scratch job.
    pub fn acquire(&self) -> PooledJob<'_> {
        let job = self
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop()
            .unwrap_or_default();

        PooledJob { pool: self, job }
    }

    /// Number of idle instances currently held.
    pub fn idle(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn release(&self, mut job: Job) {
        job.reset();
        let mut idle = self
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if idle.len() < self.max_idle {
            idle.push(job);
        }
    }
}

impl Default for JobPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive borrow of a pooled [`Job`].
#[derive(Debug)]
pub struct PooledJob<'a> {
    pool: &'a JobPool,
    job: Job,
}

impl Deref for PooledJob<'_> {
    type Target = Job;

    fn deref(&self) -> &Job {
        &self.job
    }
}

impl DerefMut for PooledJob<'_> {
    fn deref_mut(&mut self) -> &mut Job {
        &mut self.job
    }
}

impl Drop for PooledJob<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.job));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;

    use chrono::Utc;

    #[test]
    fn acquired_jobs_start_reset() {
        let pool = JobPool::new();
        {
            let mut job = pool.acquire();
            job.payload.extend_from_slice(b"dirty");
            job.scheduled_at = Utc::now();
            job.derive_id();
        }
        assert_eq!(pool.idle(), 1);

        let job = pool.acquire();
        assert_eq!(*job, Job::default());
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn release_happens_on_early_return() {
        fn fails(pool: &JobPool) -> Result<(), &'static str> {
            let mut job = pool.acquire();
            job.payload.push(1);
            Err::<(), _>("bail")?;
            Ok(())
        }

        let pool = JobPool::new();
        assert!(fails(&pool).is_err());
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn idle_instances_are_capped() {
        let pool = JobPool::with_max_idle(2);
        {
            let _a = pool.acquire();
            let _b = pool.acquire();
            let _c = pool.acquire();
        }
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn concurrent_borrowers_never_share_an_instance() {
        let pool = Arc::new(JobPool::new());
        let handles: Vec<_> = (0..8u8)
            .map(|n| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        let mut job = pool.acquire();
                        assert!(job.payload.is_empty());
                        job.payload.push(n);
                        thread::yield_now();
                        assert_eq!(job.payload, vec![n]);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert!(pool.idle() <= 8);
    }
}
