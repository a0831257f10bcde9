use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use super::r#trait::{OrderedStore, StoreError};

/// One sorted set: members unique, ordered by `(score, member)`.
#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<Vec<u8>, i64>,
    ordered: BTreeSet<(i64, Vec<u8>)>,
}

impl SortedSet {
    fn insert_if_absent(&mut self, score: i64, member: &[u8]) -> bool {
        if self.scores.contains_key(member) {
            return false;
        }
        self.scores.insert(member.to_vec(), score);
        self.ordered.insert((score, member.to_vec()));
        true
    }

    fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove(member) {
            Some(score) => self.ordered.remove(&(score, member.to_vec())),
            None => false,
        }
    }

    fn range(&self, min: Option<i64>, max: i64) -> Vec<Vec<u8>> {
        if min.is_some_and(|min| min > max) {
            return Vec::new();
        }
        // The empty member sorts first among equal scores.
        let start = (min.unwrap_or(i64::MIN), Vec::new());
        self.ordered
            .range(start..)
            .take_while(|(score, _)| *score <= max)
            .map(|(_, member)| member.clone())
            .collect()
    }
}

/// In-memory ordered store.
///
/// Intended for tests/dev. Deadlines are ignored: every call completes
/// without IO.
#[derive(Debug, Default)]
pub struct InMemoryOrderedStore {
    sets: RwLock<HashMap<String, SortedSet>>,
}

impl InMemoryOrderedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of members under `key`.
    pub fn len(&self, key: &str) -> usize {
        self.read()
            .map(|sets| sets.get(key).map_or(0, |set| set.scores.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }

    /// Score of `member` under `key`, if present.
    pub fn score(&self, key: &str, member: &[u8]) -> Option<i64> {
        self.read()
            .ok()?
            .get(key)
            .and_then(|set| set.scores.get(member).copied())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, SortedSet>>, StoreError> {
        self.sets
            .read()
            .map_err(|_| StoreError::Command("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, SortedSet>>, StoreError> {
        self.sets
            .write()
            .map_err(|_| StoreError::Command("in-memory store lock poisoned".to_string()))
    }
}

impl OrderedStore for InMemoryOrderedStore {
    fn add_if_absent(
        &self,
        key: &str,
        score: i64,
        member: &[u8],
        _timeout: Duration,
    ) -> Result<bool, StoreError> {
        let mut sets = self.write()?;
        Ok(sets
            .entry(key.to_string())
            .or_default()
            .insert_if_absent(score, member))
    }

    fn range_by_score(
        &self,
        key: &str,
        min: Option<i64>,
        max: i64,
        _timeout: Duration,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        let sets = self.read()?;
        Ok(sets.get(key).map(|set| set.range(min, max)).unwrap_or_default())
    }

    fn remove(&self, key: &str, members: &[Vec<u8>], _timeout: Duration) -> Result<u64, StoreError> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut sets = self.write()?;
        let Some(set) = sets.get_mut(key) else {
            return Ok(0);
        };

        let removed = members.iter().filter(|m| set.remove(m)).count() as u64;
        if set.scores.is_empty() {
            sets.remove(key);
        }
        Ok(removed)
    }

    fn members(&self, key: &str, _timeout: Duration) -> Result<Vec<Vec<u8>>, StoreError> {
        let sets = self.read()?;
        Ok(sets
            .get(key)
            .map(|set| set.ordered.iter().map(|(_, m)| m.clone()).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "test";
    const T: Duration = Duration::from_secs(1);

    #[test]
    fn add_is_conditional_on_exact_member() {
        let store = InMemoryOrderedStore::new();

        assert!(store.add_if_absent(KEY, 10, b"a", T).unwrap());
        assert!(!store.add_if_absent(KEY, 20, b"a", T).unwrap());

        // The first score is kept (NX never updates).
        assert_eq!(store.score(KEY, b"a"), Some(10));
        assert_eq!(store.len(KEY), 1);
    }

    #[test]
    fn range_is_inclusive_and_ordered() {
        let store = InMemoryOrderedStore::new();
        store.add_if_absent(KEY, 30, b"c", T).unwrap();
        store.add_if_absent(KEY, 10, b"a", T).unwrap();
        store.add_if_absent(KEY, 20, b"b", T).unwrap();
        store.add_if_absent(KEY, 20, b"bb", T).unwrap();

        assert_eq!(
            store.range_by_score(KEY, None, 20, T).unwrap(),
            vec![b"a".to_vec(), b"b".to_vec(), b"bb".to_vec()]
        );
        assert_eq!(
            store.range_by_score(KEY, Some(20), 30, T).unwrap(),
            vec![b"b".to_vec(), b"bb".to_vec(), b"c".to_vec()]
        );
        assert!(store.range_by_score(KEY, None, 9, T).unwrap().is_empty());
    }

    #[test]
    fn range_bounds_include_edge_members() {
        let store = InMemoryOrderedStore::new();
        store.add_if_absent(KEY, i64::MIN, b"oldest", T).unwrap();
        store.add_if_absent(KEY, 5, b"", T).unwrap();
        store.add_if_absent(KEY, 5, b"five", T).unwrap();
        for score in 6..100 {
            store.add_if_absent(KEY, score, format!("m{score}").as_bytes(), T).unwrap();
        }

        assert_eq!(
            store.range_by_score(KEY, Some(5), 5, T).unwrap(),
            vec![b"".to_vec(), b"five".to_vec()]
        );
        assert_eq!(
            store.range_by_score(KEY, None, i64::MIN, T).unwrap(),
            vec![b"oldest".to_vec()]
        );
        assert_eq!(store.range_by_score(KEY, Some(98), i64::MAX, T).unwrap().len(), 2);
        assert!(store.range_by_score(KEY, Some(50), 10, T).unwrap().is_empty());
    }

    #[test]
    fn remove_counts_only_present_members() {
        let store = InMemoryOrderedStore::new();
        store.add_if_absent(KEY, 1, b"a", T).unwrap();
        store.add_if_absent(KEY, 2, b"b", T).unwrap();

        let removed = store
            .remove(KEY, &[b"a".to_vec(), b"missing".to_vec()], T)
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.members(KEY, T).unwrap(), vec![b"b".to_vec()]);

        assert_eq!(store.remove(KEY, &[], T).unwrap(), 0);
        assert_eq!(store.remove("other", &[b"b".to_vec()], T).unwrap(), 0);
    }

    #[test]
    fn keys_are_isolated() {
        let store = InMemoryOrderedStore::new();
        store.add_if_absent("one", 1, b"a", T).unwrap();

        assert!(store.members("two", T).unwrap().is_empty());
        assert!(store.add_if_absent("two", 1, b"a", T).unwrap());
        assert_eq!(store.len("one"), 1);
        assert_eq!(store.len("two"), 1);
    }
}
