//! In-memory cache store (default, thread-safe, async).
//!
//! Uses DashMap for lock-free concurrent access with per-key sharding.
//! TTL expiration is checked on access. Conditional set and counters go
//! through DashMap's entry API, which holds the shard lock for the whole
//! read-modify-write.

use super::{glob_match, parse_counter, CacheStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// In-memory cache entry with optional expiration.
struct CacheEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|d| Instant::now() + d);
        CacheEntry { data, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// Thread-safe in-memory store.
///
/// Clones share the same map, so a clone handed to a namespace cache sees
/// every write made through the original.
///
/// # Example
///
/// ```no_run
/// use cluster_cache::backend::{CacheStore, InMemoryStore};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     store.set("key1", b"value".to_vec(), None).await?;
///     assert!(store.get("key1").await?.is_some());
///
///     let version = store.increment("users:name_version", 1, 1).await?;
///     assert_eq!(version, 1);
///
///     store.set("key2", b"expires".to_vec(), Some(Duration::from_secs(300))).await?;
///     Ok(())
/// }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
    store: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Number of stored entries, expired ones not yet reclaimed included.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Keys of live entries, for tests and diagnostics.
    pub fn keys(&self) -> Vec<String> {
        self.store
            .iter()
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                debug!("✓ InMemory GET {} -> HIT", key);
                return Ok(Some(entry.data.clone()));
            }
        }

        self.store.remove_if(key, |_, entry| entry.is_expired());
        debug!("✓ InMemory GET {} -> MISS", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.store
            .insert(key.to_string(), CacheEntry::new(value, ttl));

        if let Some(d) = ttl {
            debug!("✓ InMemory SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ InMemory SET {}", key);
        }

        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<Option<Vec<u8>>> {
        match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_expired() => {
                occupied.insert(CacheEntry::new(value, ttl));
            }
            Entry::Occupied(occupied) => {
                debug!("✓ InMemory SETNX {} -> EXISTS", key);
                return Ok(Some(occupied.get().data.clone()));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(value, ttl));
            }
        }

        debug!("✓ InMemory SETNX {} -> STORED", key);
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(key);
        debug!("✓ InMemory DELETE {}", key);
        Ok(())
    }

    async fn increment(&self, key: &str, delta: u64, initial: u64) -> Result<u64> {
        self.increment_with_ttl(key, delta, initial, None).await
    }

    async fn increment_with_ttl(
        &self,
        key: &str,
        delta: u64,
        initial: u64,
        ttl: Option<Duration>,
    ) -> Result<u64> {
        let value = match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired() => {
                let current = parse_counter(key, &occupied.get().data)?;
                let next = current.checked_add(delta).ok_or_else(|| {
                    Error::BackendError(format!("Counter at {} overflowed", key))
                })?;
                occupied.get_mut().data = next.to_string().into_bytes();
                next
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(CacheEntry::new(initial.to_string().into_bytes(), ttl));
                initial
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(initial.to_string().into_bytes(), ttl));
                initial
            }
        };

        debug!("✓ InMemory INCR {} by {} -> {}", key, delta, value);
        Ok(value)
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        let matching: Vec<String> = self
            .store
            .iter()
            .filter(|entry| glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in matching {
            if let Some((_, entry)) = self.store.remove(&key) {
                if !entry.is_expired() {
                    removed += 1;
                }
            }
        }

        debug!("✓ InMemory DELETE pattern {} -> {} keys", pattern, removed);
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self
            .store
            .get(key)
            .is_some_and(|entry| !entry.is_expired()))
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        let results = keys
            .iter()
            .map(|k| {
                self.store
                    .get(*k)
                    .filter(|entry| !entry.is_expired())
                    .map(|entry| entry.data.clone())
            })
            .collect();

        debug!("✓ InMemory MGET {} keys", keys.len());
        Ok(results)
    }
}
