//! The job record and its stored form.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{JobError, JobResult};
use crate::id::JobId;

/// A unit of delayed work.
///
/// A job is immutable once it has been stored; changing one means removing
/// it and adding a new one. The same struct doubles as a reusable scratch
/// container (see [`crate::JobPool`]), which is why [`Job::reset`] exists.
///
/// The stored form is a MessagePack map keyed by field name, so readers skip
/// fields they do not know and additive changes stay compatible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Derived from `scheduled_at` and `payload`.
    pub id: JobId,
    /// Caller-defined bytes, never interpreted by the queue. Stored as a
    /// MessagePack `bin`.
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
    /// Earliest time the job may be dispatched.
    pub scheduled_at: DateTime<Utc>,
    /// Expiry window after `scheduled_at`; zero means the job never expires.
    pub ttl: Duration,
}

impl Default for Job {
    fn default() -> Self {
        Self {
            id: JobId::default(),
            payload: Vec::new(),
            scheduled_at: DateTime::<Utc>::UNIX_EPOCH,
            ttl: Duration::ZERO,
        }
    }
}

impl Job {
    /// Create a job and derive its ID.
    pub fn new(scheduled_at: DateTime<Utc>, payload: impl Into<Vec<u8>>) -> Self {
        let mut job = Self {
            payload: payload.into(),
            scheduled_at,
            ..Default::default()
        };
        job.derive_id();
        job
    }

    /// Apply caller options. Options never touch the identity fields.
    pub fn with_options(mut self, options: &JobOptions) -> Self {
        self.apply(options);
        self
    }

    pub fn apply(&mut self, options: &JobOptions) {
        self.ttl = options.ttl;
    }

    /// Recompute `id` from `scheduled_at` and `payload`.
    pub fn derive_id(&mut self) -> &JobId {
        self.id = JobId::derive(self.scheduled_at, &self.payload);
        &self.id
    }

    /// Sorted-set score of the job: whole Unix seconds of `scheduled_at`.
    pub fn score(&self) -> i64 {
        self.scheduled_at.timestamp()
    }

    /// Instant after which the job counts as expired, if it has a TTL.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.ttl.is_zero() {
            return None;
        }
        let ttl = chrono::Duration::from_std(self.ttl).ok()?;
        self.scheduled_at.checked_add_signed(ttl)
    }

    /// Whether the job's TTL has elapsed at `now`.
    ///
    /// A TTL too large to represent as a timestamp never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|deadline| now > deadline)
    }

    /// Whether the job is eligible for dispatch at `now` (score granularity).
    pub fn is_due_at(&self, now: DateTime<Utc>) -> bool {
        self.score() <= now.timestamp()
    }

    /// Return every field to its zero value, keeping the payload allocation.
    pub fn reset(&mut self) -> &mut Self {
        self.id.clear();
        self.payload.clear();
        self.scheduled_at = DateTime::<Utc>::UNIX_EPOCH;
        self.ttl = Duration::ZERO;
        self
    }

    /// Serialize into the stored form.
    pub fn encode(&self) -> JobResult<Vec<u8>> {
        rmp_serde::to_vec_named(self).map_err(|e| JobError::encode(e.to_string()))
    }

    /// Deserialize from the stored form.
    pub fn decode(bytes: &[u8]) -> JobResult<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| JobError::decode(e.to_string()))
    }

    /// Decode into this instance, reusing its payload buffer.
    ///
    /// On failure the instance is left reset.
    pub fn decode_into(&mut self, bytes: &[u8]) -> JobResult<()> {
        self.reset();
        let decoded = Self::decode(bytes)?;
        self.id = decoded.id;
        self.payload.extend_from_slice(&decoded.payload);
        self.scheduled_at = decoded.scheduled_at;
        self.ttl = decoded.ttl;
        Ok(())
    }
}

/// Per-submission options.
///
/// Only non-identity fields are exposed here, so applying options can never
/// change the derived [`JobId`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOptions {
    /// Expiry window; zero (the default) never expires.
    pub ttl: Duration,
}

impl JobOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}
