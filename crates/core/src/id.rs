//! Deterministic job identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

/// Separator between the epoch-seconds and payload-hash halves of an ID.
const ID_SEPARATOR: char = ':';

/// Identifier of a queued job.
///
/// The ID is a pure function of the job's scheduled time (truncated to whole
/// Unix seconds) and its payload: `"{epoch_seconds}:{xxh64(payload)}"`. Two
/// submissions with the same time and payload always collide, which is what
/// makes re-submission idempotent. The hash is fast and unsalted, so IDs are
/// stable across restarts, but it is not collision-proof against an adversary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Derive the identifier for a `(scheduled_at, payload)` pair.
    pub fn derive(scheduled_at: DateTime<Utc>, payload: &[u8]) -> Self {
        Self(format!(
            "{}{}{}",
            scheduled_at.timestamp(),
            ID_SEPARATOR,
            xxh64(payload, 0)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Epoch seconds encoded in the ID, if it has the derived shape.
    pub fn epoch_seconds(&self) -> Option<i64> {
        let (secs, _) = self.0.split_once(ID_SEPARATOR)?;
        secs.parse().ok()
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn derived_id_has_seconds_then_hash() {
        let id = JobId::derive(at(1_700_000_000), b"hello world");
        let (secs, hash) = id.as_str().split_once(':').unwrap();

        assert_eq!(secs, "1700000000");
        assert_eq!(hash, xxh64(b"hello world", 0).to_string());
        assert_eq!(id.epoch_seconds(), Some(1_700_000_000));
    }

    #[test]
    fn sub_second_precision_is_truncated() {
        let base = at(1_700_000_000);
        let later = base + chrono::Duration::milliseconds(999);

        assert_eq!(JobId::derive(base, b"x"), JobId::derive(later, b"x"));
    }

    #[test]
    fn empty_payload_still_yields_an_id() {
        let id = JobId::derive(at(42), b"");
        assert!(!id.is_empty());
        assert!(id.as_str().starts_with("42:"));
    }

    #[test]
    fn foreign_ids_have_no_epoch() {
        assert_eq!(JobId::from("not-a-derived-id").epoch_seconds(), None);
    }

    proptest! {
        #[test]
        fn derivation_is_deterministic(secs in 0i64..4_000_000_000, payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            prop_assert_eq!(JobId::derive(at(secs), &payload), JobId::derive(at(secs), &payload));
        }

        #[test]
        fn different_times_give_different_ids(secs in 0i64..4_000_000_000, delta in 1i64..1_000_000, payload in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assert_ne!(JobId::derive(at(secs), &payload), JobId::derive(at(secs + delta), &payload));
        }

        #[test]
        fn different_payloads_give_different_ids(secs in 0i64..4_000_000_000, a in "[a-z]{1,32}", b in "[A-Z]{1,32}") {
            prop_assert_ne!(JobId::derive(at(secs), a.as_bytes()), JobId::derive(at(secs), b.as_bytes()));
        }
    }
}
