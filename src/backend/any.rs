//! Store chosen at runtime from configuration.

use super::{CacheStore, InMemoryStore};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[cfg(feature = "memcached")]
use super::{MemcachedConfig, MemcachedStore};
#[cfg(feature = "redis")]
use super::{RedisConfig, RedisStore};

/// Which backend to connect to.
///
/// ```json
/// {"type": "redis", "host": "cache.internal", "port": 6379}
/// ```
///
/// Variants for backends whose cargo feature is disabled do not exist, so
/// such a configuration fails to deserialize.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendSettings {
    #[default]
    InMemory,
    #[cfg(feature = "redis")]
    Redis(RedisConfig),
    #[cfg(feature = "memcached")]
    Memcached(MemcachedConfig),
}

/// One of the compiled-in stores.
#[derive(Clone)]
pub enum AnyStore {
    InMemory(InMemoryStore),
    #[cfg(feature = "redis")]
    Redis(RedisStore),
    #[cfg(feature = "memcached")]
    Memcached(MemcachedStore),
}

impl AnyStore {
    /// Build the store described by `settings`.
    ///
    /// # Errors
    /// Returns `Err` if the backend pool cannot be created.
    pub async fn connect(settings: &BackendSettings) -> Result<Self> {
        match settings {
            BackendSettings::InMemory => Ok(AnyStore::InMemory(InMemoryStore::new())),
            #[cfg(feature = "redis")]
            BackendSettings::Redis(config) => {
                Ok(AnyStore::Redis(RedisStore::new(config.clone()).await?))
            }
            #[cfg(feature = "memcached")]
            BackendSettings::Memcached(config) => {
                Ok(AnyStore::Memcached(MemcachedStore::new(config.clone()).await?))
            }
        }
    }

    /// Backend name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AnyStore::InMemory(_) => "in_memory",
            #[cfg(feature = "redis")]
            AnyStore::Redis(_) => "redis",
            #[cfg(feature = "memcached")]
            AnyStore::Memcached(_) => "memcached",
        }
    }
}

impl From<InMemoryStore> for AnyStore {
    fn from(store: InMemoryStore) -> Self {
        AnyStore::InMemory(store)
    }
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            AnyStore::InMemory($store) => $call,
            #[cfg(feature = "redis")]
            AnyStore::Redis($store) => $call,
            #[cfg(feature = "memcached")]
            AnyStore::Memcached($store) => $call,
        }
    };
}

#[async_trait]
impl CacheStore for AnyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        dispatch!(self, s => s.get(key).await)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        dispatch!(self, s => s.set(key, value, ttl).await)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<Option<Vec<u8>>> {
        dispatch!(self, s => s.set_if_absent(key, value, ttl).await)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        dispatch!(self, s => s.delete(key).await)
    }

    async fn increment(&self, key: &str, delta: u64, initial: u64) -> Result<u64> {
        dispatch!(self, s => s.increment(key, delta, initial).await)
    }

    async fn increment_with_ttl(
        &self,
        key: &str,
        delta: u64,
        initial: u64,
        ttl: Option<Duration>,
    ) -> Result<u64> {
        dispatch!(self, s => s.increment_with_ttl(key, delta, initial, ttl).await)
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        dispatch!(self, s => s.delete_by_pattern(pattern).await)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        dispatch!(self, s => s.exists(key).await)
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        dispatch!(self, s => s.mget(keys).await)
    }

    async fn mset(&self, entries: Vec<(String, Vec<u8>)>, ttl: Option<Duration>) -> Result<()> {
        dispatch!(self, s => s.mset(entries, ttl).await)
    }

    async fn health_check(&self) -> Result<bool> {
        dispatch!(self, s => s.health_check().await)
    }
}
