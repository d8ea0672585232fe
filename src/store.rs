//! Key-value store holding the state of in-progress uploads.
//!
//! The upload engine never keeps per-upload state in process memory of its own;
//! everything it needs to resume an upload lives behind [`MetadataStore`]. Values
//! are plain strings, counters are stored as decimal strings, the same way a
//! Redis or memcached backend would hold them.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("value at {0} is not a counter")]
    NotANumber(String),

    #[error("counter at {0} would overflow")]
    Overflow(String),

    #[error("value at {key} is malformed: {reason}")]
    Corrupt { key: String, reason: String },
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Stores `value` unless the key is already present. Returns whether it was stored.
    async fn add(&self, key: &str, value: String, ttl: Duration) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Atomically adds `delta` to the counter at `key` and returns the new value,
    /// or `None` if the key does not exist.
    async fn increment(&self, key: &str, delta: u64) -> Result<Option<u64>, StoreError>;

    /// Resets the expiry of an existing key. Returns false if the key is absent.
    async fn touch(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    /// `None` when the deadline lies beyond what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: deadline(Instant::now(), ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |expires_at| now >= expires_at)
    }
}

fn deadline(now: Instant, ttl: Duration) -> Option<Instant> {
    now.checked_add(ttl)
}

/// In-process [`MetadataStore`] backed by a sharded concurrent map.
///
/// Expired entries are dropped lazily when touched, [`MemoryStore::purge_expired`]
/// reclaims the rest.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn add(&self, key: &str, value: String, ttl: Duration) -> Result<bool, StoreError> {
        use dashmap::mapref::entry::Entry as MapEntry;

        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(Instant::now()) {
                    return Ok(false);
                }
                occupied.insert(Entry::new(value, ttl));
                Ok(true)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        }

        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn increment(&self, key: &str, delta: u64) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        {
            // The shard stays write-locked while the guard is alive.
            let Some(mut entry) = self.entries.get_mut(key) else {
                return Ok(None);
            };

            if !entry.is_expired(now) {
                let current: u64 = entry
                    .value
                    .parse()
                    .map_err(|_| StoreError::NotANumber(key.to_string()))?;
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| StoreError::Overflow(key.to_string()))?;
                entry.value = next.to_string();
                return Ok(Some(next));
            }
        }

        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = deadline(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }
}
