//! A fixed-capacity concurrent hash map with kernel-map style update flags.
//!
//! Entries are spread over a fixed number of shards, each guarded by its own short-lived lock.
//! Every operation touches exactly one shard, so unrelated keys never contend. The capacity is
//! global: a slot is reserved on a shared counter before a new key is inserted, which means
//! concurrent inserts can never push the map above its bound.

use std::{
    collections::hash_map::Entry,
    hash::{BuildHasher, BuildHasherDefault, Hash},
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHasher};

const DEFAULT_SHARDS: usize = 16;

/// Why a [`BoundedMap`] update was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// A new key was refused because the map holds `capacity` entries.
    #[error("map is full ({capacity} entries)")]
    Full {
        /// The map's capacity.
        capacity: usize,
    },
    /// An overwrite-only update found no entry.
    #[error("key not found")]
    NotFound,
    /// An insert-only update found an existing entry.
    #[error("key already exists")]
    Exists,
}

/// Controls how [`BoundedMap::update`] treats existing and missing keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateFlag {
    /// Create a new entry or overwrite an existing one.
    #[default]
    Any,
    /// Only overwrite an existing entry. Fails with [`MapError::NotFound`] otherwise.
    Exist,
    /// Only create a new entry. Fails with [`MapError::Exists`] otherwise.
    NoExist,
}

/// A sharded hash map that never holds more than its capacity.
#[derive(Debug)]
pub struct BoundedMap<K, V> {
    shards: Box<[Mutex<FxHashMap<K, V>>]>,
    hasher: BuildHasherDefault<FxHasher>,
    len: AtomicUsize,
    capacity: usize,
}

impl<K, V> BoundedMap<K, V>
where
    K: Hash + Eq,
{
    /// Creates an empty map that holds at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_shards(capacity, DEFAULT_SHARDS)
    }

    /// Creates an empty map with an explicit shard count. A shard count of 0 is treated as 1.
    pub fn with_shards(capacity: usize, shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| Mutex::new(FxHashMap::default())).collect();

        Self { shards, hasher: BuildHasherDefault::default(), len: AtomicUsize::new(0), capacity }
    }

    /// Maps the high bits of the key's hash onto a shard. The inner maps place buckets by the
    /// low bits, which stay spread out within every shard.
    #[inline]
    fn shard_index(&self, key: &K) -> usize {
        let hash = self.hasher.hash_one(key);
        ((u128::from(hash) * self.shards.len() as u128) >> 64) as usize
    }

    #[inline]
    fn shard(&self, key: &K) -> &Mutex<FxHashMap<K, V>> {
        &self.shards[self.shard_index(key)]
    }

    /// Reserves room for one new entry, failing if the map is at capacity.
    fn reserve_slot(&self) -> Result<(), MapError> {
        self.len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |len| {
                (len < self.capacity).then_some(len + 1)
            })
            .map(|_| ())
            .map_err(|_| MapError::Full { capacity: self.capacity })
    }

    /// Writes `value` under `key` according to `flag`.
    ///
    /// A failed update leaves the map untouched.
    pub fn update(&self, key: K, value: V, flag: UpdateFlag) -> Result<(), MapError> {
        let mut shard = self.shard(&key).lock();

        match shard.entry(key) {
            Entry::Occupied(mut entry) => {
                if flag == UpdateFlag::NoExist {
                    return Err(MapError::Exists);
                }
                entry.insert(value);
            }
            Entry::Vacant(entry) => {
                if flag == UpdateFlag::Exist {
                    return Err(MapError::NotFound);
                }
                self.reserve_slot()?;
                entry.insert(value);
            }
        }

        Ok(())
    }

    /// Removes `key`, returning its value if it was present.
    pub fn delete(&self, key: &K) -> Option<V> {
        let removed = self.shard(key).lock().remove(key);
        if removed.is_some() {
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Keeps only the entries for which `keep` returns `true`. Returns the number removed.
    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            let before = shard.len();
            shard.retain(|k, v| keep(k, v));
            removed += before - shard.len();
        }
        self.len.fetch_sub(removed, Ordering::AcqRel);
        removed
    }

    /// Removes every entry. Returns the number removed.
    pub fn clear(&self) -> usize {
        self.retain(|_, _| false)
    }

    /// Returns the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Returns `true` if the map holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the maximum number of entries.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<K, V> BoundedMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Returns a copy of the value stored under `key`.
    #[inline]
    pub fn lookup(&self, key: &K) -> Option<V> {
        self.shard(key).lock().get(key).cloned()
    }

    /// Returns a point-in-time copy of all entries, in no particular order.
    ///
    /// Shards are visited one at a time, so concurrent writers may be observed in some shards
    /// and not in others.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let mut entries = Vec::with_capacity(self.len());
        for shard in self.shards.iter() {
            entries.extend(shard.lock().iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        entries
    }
}
