//! Thread-Safe Storage Engine
//!
//! This module implements the key-value store behind the line protocol.
//! It is a concurrent HashMap split into shards, each guarded by its own
//! `RwLock`.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are distributed across shards using a hash function, so connections
//! touching different keys rarely contend.

use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// A single shard containing a portion of the key-value pairs.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Bytes>>,
}

impl Shard {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, Bytes>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, Bytes>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Operation counters reported by [`StorageEngine::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
}

/// The key-value store shared by every connection.
///
/// # Thread Safety
///
/// This struct is designed to be wrapped in an `Arc` and shared across all
/// connection tasks. All operations take `&self`.
///
/// # Example
///
/// ```
/// use edgekv::storage::StorageEngine;
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
/// engine.set(Bytes::from("name"), Bytes::from("edge"));
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("edge")));
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,
    key_count: AtomicU64,
    get_count: AtomicU64,
    set_count: AtomicU64,
    del_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
            key_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Sets a key, overwriting any previous value.
    ///
    /// Returns `true` if the key was newly created.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        // Count under the shard lock so `flush` sees a matching total.
        let mut data = self.shard(&key).write();
        let is_new = data.insert(key, value).is_none();
        if is_new {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }
        is_new
    }

    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        self.shard(key).read().get(key).cloned()
    }

    /// Deletes a key. Returns `true` if it existed.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.shard(key).write();
        let removed = data.remove(key).is_some();
        if removed {
            self.key_count.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.shard(key).read().contains_key(key)
    }

    /// Adds `delta` to an integer value, treating a missing key as 0.
    pub fn incr_by(&self, key: &Bytes, delta: i64) -> Result<i64, &'static str> {
        let mut data = self.shard(key).write();

        let current = match data.get(key) {
            Some(value) => std::str::from_utf8(value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or("value is not an integer or out of range")?,
            None => 0,
        };

        let new_value = current
            .checked_add(delta)
            .ok_or("increment would overflow")?;

        if data
            .insert(key.clone(), Bytes::from(new_value.to_string()))
            .is_none()
        {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }

        Ok(new_value)
    }

    /// Removes every key.
    ///
    /// Shards are cleared one at a time; a key set concurrently in an
    /// already-cleared shard survives and stays counted.
    pub fn flush(&self) {
        for shard in &self.shards {
            let mut data = shard.write();
            let removed = data.len() as u64;
            data.clear();
            self.key_count.fetch_sub(removed, Ordering::Relaxed);
        }
    }

    /// Returns the approximate number of keys.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.key_count.load(Ordering::Relaxed),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
        }
    }
}
