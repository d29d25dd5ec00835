//! Ledger storage interface and the per-contract prefixed view over it.

use std::collections::BTreeMap;

/// The transactional key-value store provided by the ledger.
///
/// Commit and rollback happen at the ledger's transaction boundary; the host
/// only reads and writes.
pub trait KvStore {
    /// Returns the value stored under `key`.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    /// Stores `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &[u8], value: &[u8]);
    /// Removes `key` from the store.
    fn remove(&mut self, key: &[u8]);
}

/// A plain in-memory store, ordered by key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.data.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.data.insert(key.to_vec(), value.to_vec());
    }

    fn remove(&mut self, key: &[u8]) {
        self.data.remove(key);
    }
}

/// A view over a [`KvStore`] that confines all keys to one namespace.
///
/// The namespace is length-prefixed so that no namespace can be a prefix of
/// another one.
pub struct PrefixStore<'a> {
    inner: &'a mut dyn KvStore,
    prefix: Vec<u8>,
}

impl<'a> PrefixStore<'a> {
    /// Create a view of `inner` scoped to `namespace`.
    pub fn new(inner: &'a mut dyn KvStore, namespace: &[u8]) -> Self {
        let len = namespace.len() as u64;
        let mut prefix = Vec::with_capacity(namespace.len() + 8);
        prefix.extend_from_slice(&len.to_be_bytes());
        prefix.extend_from_slice(namespace);
        Self { inner, prefix }
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }
}

impl KvStore for PrefixStore<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.get(&self.full_key(key))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        let full = self.full_key(key);
        self.inner.set(&full, value);
    }

    fn remove(&mut self, key: &[u8]) {
        let full = self.full_key(key);
        self.inner.remove(&full);
    }
}

/// Reads a big-endian `u64` stored under `key`.
///
/// Values of any other width read as `None`.
#[must_use]
pub fn get_u64(store: &dyn KvStore, key: &[u8]) -> Option<u64> {
    let bz = store.get(key)?;
    let bytes: [u8; 8] = bz.as_slice().try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Stores `value` as a big-endian `u64` under `key`.
pub fn set_u64(store: &mut dyn KvStore, key: &[u8], value: u64) {
    store.set(key, &value.to_be_bytes());
}

/// Increments the big-endian counter under `key` and returns the new value.
pub fn increment_u64(store: &mut dyn KvStore, key: &[u8]) -> u64 {
    let next = get_u64(store, key).unwrap_or_default().saturating_add(1);
    set_u64(store, key, next);
    next
}
