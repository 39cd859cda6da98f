use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::ConfigError;

/// Per-key lock handle.
///
/// Cloning the handle pins the mutex for the duration of a critical section,
/// even across an eviction of the owning record.
pub type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Bounded key-value store with a stable per-key lock on every record.
///
/// All operations are safe to call from any number of tasks. [`Cache::put`]
/// on an existing key replaces the stored value without replacing the
/// record's lock: a caller holding the key's lock keeps it across the update.
pub trait Cache<K: Hash + Eq, V>: Send + Sync {
    /// Current value for `key`, if present. Counts as a use for eviction
    /// ordering.
    fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized;

    /// Store `value` under `key`. An existing record keeps its lock; a new
    /// record may evict the least-recently-used entry at capacity.
    fn put(&self, key: K, value: V);

    /// Presence check, without touching eviction ordering.
    fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized;

    /// Atomically return the existing value for `key`, or insert `value`
    /// under a fresh record. The boolean is `true` when the insert happened.
    fn get_or_store(&self, key: K, value: V) -> (V, bool);

    /// Lock handle of the record for `key`, or `None` when absent.
    fn key_lock<Q>(&self, key: &Q) -> Option<KeyLock>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized;

    /// Number of records currently stored.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Record<V> {
    value: V,
    lock: KeyLock,
}

impl<V> Record<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

/// In-memory [`Cache`] with LRU eviction.
///
/// Admission state for a key is lost when its record is evicted: the key
/// starts over with a full bucket on its next use. Size the capacity well
/// above the number of concurrently-active keys.
pub struct InMemoryCache<K: Hash + Eq, V> {
    records: Mutex<LruCache<K, Record<V>>>,
}

impl<K: Hash + Eq, V> InMemoryCache<K, V> {
    /// Bounded cache holding at most `capacity` records.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(ConfigError::ZeroCacheCapacity)?;
        Ok(Self {
            records: Mutex::new(LruCache::new(capacity)),
        })
    }
}

impl<K, V> Cache<K, V> for InMemoryCache<K, V>
where
    K: Hash + Eq + Send,
    V: Clone + Send,
{
    fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.records
            .lock()
            .get(key)
            .map(|record| record.value.clone())
    }

    fn put(&self, key: K, value: V) {
        let mut records = self.records.lock();
        match records.get_mut(&key) {
            Some(record) => record.value = value,
            None => {
                if records.push(key, Record::new(value)).is_some() {
                    tracing::trace!("cache at capacity; evicted least-recently-used record");
                }
            }
        }
    }

    fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.records.lock().contains(key)
    }

    fn get_or_store(&self, key: K, value: V) -> (V, bool) {
        let mut records = self.records.lock();
        if let Some(record) = records.get(&key) {
            return (record.value.clone(), false);
        }
        if records.push(key, Record::new(value.clone())).is_some() {
            tracing::trace!("cache at capacity; evicted least-recently-used record");
        }
        (value, true)
    }

    fn key_lock<Q>(&self, key: &Q) -> Option<KeyLock>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.records
            .lock()
            .get(key)
            .map(|record| Arc::clone(&record.lock))
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }
}
