//! A write cache that gives the in-memory ledger transaction semantics.

use std::collections::BTreeMap;

use cw_ibc_host::store::KvStore;

/// Buffers writes on top of a parent store until [`CachedStore::commit`].
///
/// Dropping the cache without committing discards every write.
pub struct CachedStore<'a> {
    parent: &'a mut dyn KvStore,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> CachedStore<'a> {
    /// Start a cache over `parent`.
    pub fn new(parent: &'a mut dyn KvStore) -> Self {
        Self {
            parent,
            writes: BTreeMap::new(),
        }
    }

    /// Number of buffered writes and removals.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.writes.len()
    }

    /// Write every buffered change through to the parent.
    pub fn commit(self) {
        for (key, value) in self.writes {
            match value {
                Some(value) => self.parent.set(&key, &value),
                None => self.parent.remove(&key),
            }
        }
    }
}

impl KvStore for CachedStore<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.writes.get(key) {
            Some(cached) => cached.clone(),
            None => self.parent.get(key),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
    }

    fn remove(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }
}
