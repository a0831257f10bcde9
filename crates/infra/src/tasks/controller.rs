//! Task controller: delayed-job queue over an ordered store.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use delayq_core::{Job, JobId, JobOptions, JobPool};

use crate::store::OrderedStore;
use crate::ticker::{IntervalTicker, Tick, Ticker};

use super::config::{ConfigError, TaskControllerConfig};
use super::error::{HandlerError, TaskError};
use super::handler::{ExpiredJobHandler, FnHandler, JobHandler};

/// Controller runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ControllerStats {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub jobs_completed: u64,
    pub jobs_retained: u64,
    pub jobs_expired: u64,
    pub jobs_dropped: u64,
    pub jobs_abandoned: u64,
    pub jobs_failed: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

/// What happened to one due entry during a poll cycle.
#[derive(Debug)]
pub enum JobOutcome {
    /// Handler succeeded; the job was removed.
    Completed(JobId),
    /// Handler failed; the job stays queued for the next cycle.
    Retained {
        id: JobId,
        attempts: u32,
        error: HandlerError,
    },
    /// TTL elapsed; the job was removed. `error` carries the expired-handler
    /// failure, or the expiry itself when no expired handler is configured.
    Expired { id: JobId, error: Option<TaskError> },
    /// No job handler is configured; the job was removed unprocessed.
    Dropped(JobId),
    /// Handler failed `attempts` times, reaching the retry budget; removed.
    Abandoned {
        id: JobId,
        attempts: u32,
        error: HandlerError,
    },
    /// The entry could not be decoded or removed; it stays queued.
    Failed { id: Option<JobId>, error: TaskError },
}

impl JobOutcome {
    pub fn id(&self) -> Option<&JobId> {
        match self {
            JobOutcome::Completed(id) | JobOutcome::Dropped(id) => Some(id),
            JobOutcome::Retained { id, .. }
            | JobOutcome::Expired { id, .. }
            | JobOutcome::Abandoned { id, .. } => Some(id),
            JobOutcome::Failed { id, .. } => id.as_ref(),
        }
    }

    /// Whether the entry left the queue.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            JobOutcome::Retained { .. } | JobOutcome::Failed { .. }
        )
    }
}

/// Result of one poll cycle.
#[derive(Debug)]
pub struct PollReport {
    pub polled_at: DateTime<Utc>,
    pub outcomes: Vec<JobOutcome>,
}

impl PollReport {
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn outcome(&self, id: &JobId) -> Option<&JobOutcome> {
        self.outcomes.iter().find(|o| o.id() == Some(id))
    }
}

struct ControllerInner<S> {
    store: S,
    config: TaskControllerConfig,
    lead_time: chrono::Duration,
    ticker: Box<dyn Ticker>,
    pool: JobPool,
    job_handler: Option<Arc<dyn JobHandler>>,
    expired_handler: Option<Arc<dyn ExpiredJobHandler>>,
    /// Handler failures per job, tracked only with a retry budget.
    attempts: Mutex<HashMap<JobId, u32>>,
    stats: Mutex<ControllerStats>,
}

impl<S> Drop for ControllerInner<S> {
    fn drop(&mut self) {
        // Last handle gone: the poll loop must not outlive it.
        self.ticker.stop();
    }
}

/// Delayed-job queue controller.
///
/// Jobs live in a sorted set (score = scheduled epoch seconds, member =
/// encoded job) under `config.key`. A ticker calls the poll cycle every
/// `config.poll_interval`; due jobs are dispatched to the job handler and
/// removed on success.
///
/// Cloning is cheap and clones share state, so one clone can run the poll
/// loop while others add, list, remove, or shut down. The poll loop holds no
/// handle of its own; dropping the last clone stops it.
pub struct TaskController<S: OrderedStore> {
    inner: Arc<ControllerInner<S>>,
}

impl<S: OrderedStore> Clone for TaskController<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: OrderedStore> std::fmt::Debug for TaskController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskController")
            .field("config", &self.inner.config)
            .field("job_handler", &self.inner.job_handler.is_some())
            .field("expired_handler", &self.inner.expired_handler.is_some())
            .finish()
    }
}

/// Builder for [`TaskController`].
pub struct TaskControllerBuilder<S> {
    store: S,
    config: TaskControllerConfig,
    ticker: Option<Box<dyn Ticker>>,
    job_handler: Option<Arc<dyn JobHandler>>,
    expired_handler: Option<Arc<dyn ExpiredJobHandler>>,
}

impl<S: OrderedStore + 'static> TaskControllerBuilder<S> {
    pub fn job_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.job_handler = Some(Arc::new(handler));
        self
    }

    pub fn job_handler_fn<F>(self, handler: F) -> Self
    where
        F: Fn(&Job) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.job_handler(FnHandler(handler))
    }

    pub fn expired_job_handler<H: ExpiredJobHandler + 'static>(mut self, handler: H) -> Self {
        self.expired_handler = Some(Arc::new(handler));
        self
    }

    pub fn expired_job_handler_fn<F>(self, handler: F) -> Self
    where
        F: Fn(&Job) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.expired_job_handler(FnHandler(handler))
    }

    /// Replace the default [`IntervalTicker`].
    pub fn ticker<T: Ticker + 'static>(mut self, ticker: T) -> Self {
        self.ticker = Some(Box::new(ticker));
        self
    }

    pub fn build(self) -> Result<TaskController<S>, ConfigError> {
        self.config.validate()?;
        let lead_time = self.config.lead_time()?;
        let ticker = self
            .ticker
            .unwrap_or_else(|| Box::new(IntervalTicker::new(self.config.name.clone())));

        Ok(TaskController {
            inner: Arc::new(ControllerInner {
                store: self.store,
                config: self.config,
                lead_time,
                ticker,
                pool: JobPool::new(),
                job_handler: self.job_handler,
                expired_handler: self.expired_handler,
                attempts: Mutex::new(HashMap::new()),
                stats: Mutex::new(ControllerStats::default()),
            }),
        })
    }
}

impl<S: OrderedStore + 'static> TaskController<S> {
    /// Controller without handlers: due jobs are dropped every cycle.
    pub fn new(store: S, config: TaskControllerConfig) -> Result<Self, ConfigError> {
        Self::builder(store, config).build()
    }

    pub fn builder(store: S, config: TaskControllerConfig) -> TaskControllerBuilder<S> {
        TaskControllerBuilder {
            store,
            config,
            ticker: None,
            job_handler: None,
            expired_handler: None,
        }
    }

    pub fn config(&self) -> &TaskControllerConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn stats(&self) -> ControllerStats {
        lock(&self.inner.stats).clone()
    }

    /// Queue `payload` for `scheduled_at` with default options.
    pub fn add_job(
        &self,
        scheduled_at: DateTime<Utc>,
        payload: impl AsRef<[u8]>,
    ) -> Result<JobId, TaskError> {
        self.add_job_with(scheduled_at, payload, JobOptions::default())
    }

    /// Queue `payload` for `scheduled_at`.
    ///
    /// `scheduled_at` must be at least one poll interval away. Re-submitting
    /// the same time and payload returns the existing ID without storing a
    /// duplicate.
    pub fn add_job_with(
        &self,
        scheduled_at: DateTime<Utc>,
        payload: impl AsRef<[u8]>,
        options: JobOptions,
    ) -> Result<JobId, TaskError> {
        self.add_job_at(Utc::now(), scheduled_at, payload.as_ref(), options)
    }

    pub(crate) fn add_job_at(
        &self,
        now: DateTime<Utc>,
        scheduled_at: DateTime<Utc>,
        payload: &[u8],
        options: JobOptions,
    ) -> Result<JobId, TaskError> {
        let inner = &*self.inner;

        let earliest = now + inner.lead_time;
        if scheduled_at < earliest {
            return Err(TaskError::Scheduling {
                scheduled_at,
                earliest,
            });
        }

        let mut job = inner.pool.acquire();
        job.payload.extend_from_slice(payload);
        job.scheduled_at = scheduled_at;
        job.apply(&options);
        job.derive_id();

        if self.job_exists(&job.id)? {
            debug!(controller = %inner.config.name, job_id = %job.id, "job already queued");
            return Ok(job.id.clone());
        }

        let encoded = job.encode()?;
        let inserted = inner.store.add_if_absent(
            &inner.config.key,
            job.score(),
            &encoded,
            inner.config.poll_interval,
        )?;

        debug!(
            controller = %inner.config.name,
            job_id = %job.id,
            scheduled_at = %job.scheduled_at,
            inserted,
            "job added"
        );
        Ok(job.id.clone())
    }

    /// Every queued job, in store order.
    pub fn list_jobs(&self) -> Result<Vec<Job>, TaskError> {
        let inner = &*self.inner;
        let members = inner
            .store
            .members(&inner.config.key, inner.config.poll_interval)?;

        let mut jobs = Vec::with_capacity(members.len());
        for raw in &members {
            jobs.push(Job::decode(raw)?);
        }
        Ok(jobs)
    }

    /// Remove the jobs with the given IDs. Returns how many were removed.
    ///
    /// The store has no index by ID, so this decodes every queued job to find
    /// the matching members.
    pub fn remove_jobs(&self, ids: &[JobId]) -> Result<u64, TaskError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let inner = &*self.inner;
        let wanted: HashSet<&JobId> = ids.iter().collect();
        let members = inner
            .store
            .members(&inner.config.key, inner.config.poll_interval)?;

        let mut matched = Vec::with_capacity(ids.len());
        let mut matched_ids = Vec::with_capacity(ids.len());
        {
            let mut job = inner.pool.acquire();
            for raw in members {
                job.decode_into(&raw)?;
                if wanted.contains(&job.id) {
                    matched_ids.push(job.id.clone());
                    matched.push(raw);
                }
            }
        }

        let removed = inner
            .store
            .remove(&inner.config.key, &matched, inner.config.poll_interval)?;
        // A re-added job with the same ID starts with a fresh retry budget.
        for id in &matched_ids {
            self.forget_attempts(id);
        }
        debug!(controller = %inner.config.name, requested = ids.len(), removed, "jobs removed");
        Ok(removed)
    }

    /// Whether a job with `id` is queued (full scan).
    pub fn job_exists(&self, id: &JobId) -> Result<bool, TaskError> {
        let inner = &*self.inner;
        let members = inner
            .store
            .members(&inner.config.key, inner.config.poll_interval)?;

        let mut job = inner.pool.acquire();
        for raw in &members {
            job.decode_into(raw)?;
            if job.id == *id {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Start polling.
    ///
    /// With `config.block` the poll loop runs on the calling thread until
    /// [`TaskController::shutdown`] is called from elsewhere; otherwise it
    /// runs on a background thread and this returns immediately.
    pub fn run(&self) -> Result<(), TaskError> {
        let inner = &*self.inner;
        let weak: Weak<ControllerInner<S>> = Arc::downgrade(&self.inner);
        let tick: Tick = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                TaskController { inner }.on_tick();
            }
        });

        info!(
            controller = %inner.config.name,
            key = %inner.config.key,
            interval_ms = inner.config.poll_interval.as_millis() as u64,
            block = inner.config.block,
            "task controller starting"
        );

        if inner.config.block {
            inner.ticker.run(inner.config.poll_interval, tick)?;
        } else {
            inner.ticker.start(inner.config.poll_interval, tick)?;
        }
        Ok(())
    }

    /// Stop polling.
    ///
    /// No new cycle starts after this is called; returns once an in-flight
    /// cycle has finished. Safe to call more than once.
    pub fn shutdown(&self) {
        self.inner.ticker.stop();
        info!(controller = %self.inner.config.name, "task controller stopped");
    }

    fn on_tick(&self) {
        let name = &self.inner.config.name;
        match self.poll_once() {
            Ok(report) if report.is_empty() => {}
            Ok(report) => {
                let terminal = report.outcomes.iter().filter(|o| o.is_terminal()).count();
                debug!(controller = %name, due = report.len(), terminal, "poll cycle finished");
            }
            Err(error) => {
                error!(controller = %name, error = %error, "poll cycle failed");
            }
        }
    }

    /// Run one poll cycle now.
    pub fn poll_once(&self) -> Result<PollReport, TaskError> {
        self.poll_at(Utc::now())
    }

    /// Run one poll cycle as of `now`.
    ///
    /// Only a failed due-query is returned as an error; per-job failures are
    /// recorded in the report and never abort the cycle.
    pub fn poll_at(&self, now: DateTime<Utc>) -> Result<PollReport, TaskError> {
        let inner = &*self.inner;

        let due = match inner.store.range_by_score(
            &inner.config.key,
            None,
            now.timestamp(),
            inner.config.poll_interval,
        ) {
            Ok(due) => due,
            Err(e) => {
                let mut stats = lock(&inner.stats);
                stats.cycles += 1;
                stats.failed_cycles += 1;
                stats.last_cycle_at = Some(now);
                return Err(e.into());
            }
        };

        let outcomes: Vec<JobOutcome> = due.iter().map(|raw| self.process(raw, now)).collect();

        let mut stats = lock(&inner.stats);
        stats.cycles += 1;
        stats.last_cycle_at = Some(now);
        for outcome in &outcomes {
            match outcome {
                JobOutcome::Completed(_) => stats.jobs_completed += 1,
                JobOutcome::Retained { .. } => stats.jobs_retained += 1,
                JobOutcome::Expired { .. } => stats.jobs_expired += 1,
                JobOutcome::Dropped(_) => stats.jobs_dropped += 1,
                JobOutcome::Abandoned { .. } => stats.jobs_abandoned += 1,
                JobOutcome::Failed { .. } => stats.jobs_failed += 1,
            }
        }

        Ok(PollReport {
            polled_at: now,
            outcomes,
        })
    }

    fn process(&self, raw: &[u8], now: DateTime<Utc>) -> JobOutcome {
        let inner = &*self.inner;
        let name = &inner.config.name;

        let mut job = inner.pool.acquire();
        if let Err(e) = job.decode_into(raw) {
            warn!(controller = %name, error = %e, "skipping undecodable job");
            return JobOutcome::Failed {
                id: None,
                error: e.into(),
            };
        }
        let id = job.id.clone();

        if job.is_expired_at(now) {
            if let Err(error) = self.remove_member(raw) {
                return self.removal_failed(id, error);
            }
            self.forget_attempts(&id);

            let error = match &inner.expired_handler {
                Some(handler) => handler.handle_expired(&job).err().map(TaskError::from),
                None => Some(TaskError::Expired {
                    id: id.clone(),
                    scheduled_at: job.scheduled_at,
                    ttl: job.ttl,
                }),
            };
            match &error {
                Some(error) => warn!(controller = %name, job_id = %id, error = %error, "job expired"),
                None => debug!(controller = %name, job_id = %id, "expired job handled"),
            }
            return JobOutcome::Expired { id, error };
        }

        let Some(handler) = &inner.job_handler else {
            if let Err(error) = self.remove_member(raw) {
                return self.removal_failed(id, error);
            }
            debug!(controller = %name, job_id = %id, "no job handler, job dropped");
            return JobOutcome::Dropped(id);
        };

        match handler.handle(&job) {
            Ok(()) => {
                if let Err(error) = self.remove_member(raw) {
                    return self.removal_failed(id, error);
                }
                self.forget_attempts(&id);
                debug!(controller = %name, job_id = %id, "job completed");
                JobOutcome::Completed(id)
            }
            Err(error) => {
                let attempts = self.record_failure(&id);
                let exhausted = inner.config.max_attempts.is_some_and(|max| attempts >= max);
                if !exhausted {
                    warn!(controller = %name, job_id = %id, attempts, error = %error, "job handler failed, retrying next cycle");
                    return JobOutcome::Retained {
                        id,
                        attempts,
                        error,
                    };
                }

                if let Err(e) = self.remove_member(raw) {
                    return self.removal_failed(id, e);
                }
                self.forget_attempts(&id);
                error!(controller = %name, job_id = %id, attempts, error = %error, "job abandoned after repeated failures");
                JobOutcome::Abandoned {
                    id,
                    attempts,
                    error,
                }
            }
        }
    }

    fn remove_member(&self, raw: &[u8]) -> Result<u64, TaskError> {
        let inner = &*self.inner;
        Ok(inner
            .store
            .remove(&inner.config.key, &[raw.to_vec()], inner.config.poll_interval)?)
    }

    fn removal_failed(&self, id: JobId, error: TaskError) -> JobOutcome {
        warn!(controller = %self.inner.config.name, job_id = %id, error = %error, "failed to remove job");
        JobOutcome::Failed {
            id: Some(id),
            error,
        }
    }

    /// Count a handler failure. Without a retry budget nothing is tracked.
    fn record_failure(&self, id: &JobId) -> u32 {
        if self.inner.config.max_attempts.is_none() {
            return 0;
        }
        let mut attempts = lock(&self.inner.attempts);
        let count = attempts.entry(id.clone()).or_insert(0);
        *count += 1;
        *count
    }

    fn forget_attempts(&self, id: &JobId) {
        if self.inner.config.max_attempts.is_some() {
            lock(&self.inner.attempts).remove(id);
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
