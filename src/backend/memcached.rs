//! Memcached cache store.
//!
//! Memcached has no key enumeration and no atomic "set if absent and return
//! the previous value", so [`CacheStore::delete_by_pattern`] and
//! [`CacheStore::set_if_absent`] report `Error::UnsupportedOperation`.
//! Counters use `incr`, falling back to `add` when the counter does not exist
//! yet. An expiring counter gets its expiry from that `add`.

use super::CacheStore;
use crate::error::{Error, Result};
use async_memcached::AsciiProtocol;
use async_trait::async_trait;
use deadpool_memcached::{Manager, Object, Pool};
use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default Memcached connection pool size.
/// Override with MEMCACHED_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: u32 = 16;

/// Relative expirations above this many seconds are read by the server as
/// absolute unix timestamps.
const MAX_RELATIVE_EXPIRY: u64 = 60 * 60 * 24 * 30;

/// `add` races lost before giving up on initialising a counter.
const INCREMENT_ATTEMPTS: usize = 3;

/// Configuration for the Memcached store.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MemcachedConfig {
    pub servers: Vec<String>, // e.g., ["localhost:11211"]
    #[serde(with = "crate::duration::text")]
    pub connection_timeout: Duration,
    pub pool_size: u32,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        MemcachedConfig {
            servers: vec!["127.0.0.1:11211".to_string()],
            connection_timeout: Duration::from_secs(5),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

/// Expiration argument for a store command.
///
/// Whole seconds rounded up (a positive TTL never becomes "no expiry"),
/// switched to an absolute unix timestamp past the 30 day threshold.
fn expiration(ttl: Option<Duration>) -> Option<i64> {
    let ttl = ttl?;
    let mut secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 || secs == 0 {
        secs += 1;
    }

    if secs > MAX_RELATIVE_EXPIRY {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        secs = now.saturating_add(secs);
    }

    Some(i64::try_from(secs).unwrap_or(i64::MAX))
}

fn is_not_found(e: &async_memcached::Error) -> bool {
    e.to_string().to_lowercase().contains("not found")
}

fn is_not_stored(e: &async_memcached::Error) -> bool {
    e.to_string().to_lowercase().contains("not stored")
}

/// Memcached store with connection pooling.
///
/// The pool is the long-lived shared client: clones share it and it is safe
/// for concurrent use.
///
/// # Example
///
/// ```no_run
/// # use cluster_cache::backend::{MemcachedStore, MemcachedConfig, CacheStore};
/// # use cluster_cache::Result;
/// # async fn example() -> Result<()> {
/// let config = MemcachedConfig {
///     servers: vec!["localhost:11211".to_string()],
///     ..Default::default()
/// };
///
/// let store = MemcachedStore::new(config).await?;
/// store.set("key", b"value".to_vec(), None).await?;
/// let value = store.get("key").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemcachedStore {
    pool: Pool,
    timeout: Duration,
}

impl MemcachedStore {
    /// Create a store from configuration.
    ///
    /// Only the first server is used; the pool manager speaks to a single
    /// address.
    ///
    /// # Errors
    /// Returns `Err` if no server is configured or pool creation fails
    pub async fn new(config: MemcachedConfig) -> Result<Self> {
        let addr = config
            .servers
            .first()
            .ok_or_else(|| Error::ConfigError("No memcached servers specified".to_string()))?
            .clone();

        if config.servers.len() > 1 {
            warn!(
                "Memcached store uses only the first of {} configured servers",
                config.servers.len()
            );
        }

        let manager = Manager::new(addr.clone());

        let pool = Pool::builder(manager)
            .max_size(config.pool_size as usize)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create connection pool: {}", e)))?;

        info!(
            "✓ Memcached store initialized with server: {} (pool size: {})",
            addr, config.pool_size
        );

        Ok(MemcachedStore {
            pool,
            timeout: config.connection_timeout,
        })
    }

    /// Create from server address directly.
    ///
    /// Pool size is determined by:
    /// 1. `MEMCACHED_POOL_SIZE` environment variable (if set)
    /// 2. `DEFAULT_POOL_SIZE` constant (16)
    ///
    /// # Errors
    /// Returns `Err` if connection pool creation fails
    pub async fn from_server(addr: String) -> Result<Self> {
        let pool_size = std::env::var("MEMCACHED_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        let config = MemcachedConfig {
            servers: vec![addr],
            pool_size,
            ..Default::default()
        };
        Self::new(config).await
    }

    async fn conn(&self) -> Result<Object> {
        match tokio::time::timeout(self.timeout, self.pool.get()).await {
            Ok(conn) => conn.map_err(|e| {
                Error::BackendError(format!("Failed to get Memcached connection: {}", e))
            }),
            Err(_) => Err(Error::BackendError(format!(
                "Timed out after {:?} waiting for a Memcached connection",
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl CacheStore for MemcachedStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;

        match conn.get(key).await {
            Ok(Some(value)) => {
                debug!("✓ Memcached GET {} -> HIT", key);
                Ok(value.data)
            }
            Ok(None) => {
                debug!("✓ Memcached GET {} -> MISS", key);
                Ok(None)
            }
            Err(e) if is_not_found(&e) => {
                debug!("✓ Memcached GET {} -> MISS", key);
                Ok(None)
            }
            Err(e) => Err(Error::BackendError(format!(
                "Memcached GET failed for key {}: {}",
                key, e
            ))),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn().await?;

        conn.set(key, value.as_slice(), expiration(ttl), None)
            .await
            .map_err(|e| {
                Error::BackendError(format!("Memcached SET failed for key {}: {}", key, e))
            })?;

        if let Some(d) = ttl {
            debug!("✓ Memcached SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ Memcached SET {}", key);
        }

        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        _value: Vec<u8>,
        _ttl: Option<Duration>,
    ) -> Result<Option<Vec<u8>>> {
        Err(Error::UnsupportedOperation(format!(
            "Memcached cannot set {} only if absent",
            key
        )))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;

        match conn.delete(key).await {
            Ok(()) => {}
            Err(e) if is_not_found(&e) => {}
            Err(e) => {
                return Err(Error::BackendError(format!(
                    "Memcached DELETE failed for key {}: {}",
                    key, e
                )))
            }
        }

        debug!("✓ Memcached DELETE {}", key);
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
        let mut conn = self.conn().await?;
        let initial_text = initial.to_string();

        for _ in 0..INCREMENT_ATTEMPTS {
            match conn.increment(key, delta).await {
                Ok(value) => {
                    debug!("✓ Memcached INCR {} by {} -> {}", key, delta, value);
                    return Ok(value);
                }
                Err(e) if is_not_found(&e) => {}
                Err(e) => {
                    return Err(Error::BackendError(format!(
                        "Memcached INCR failed for key {}: {}",
                        key, e
                    )))
                }
            }

            match conn
                .add(key, initial_text.as_bytes(), expiration(ttl), None)
                .await
            {
                Ok(()) => {
                    debug!("✓ Memcached INCR {} initialised -> {}", key, initial);
                    return Ok(initial);
                }
                // Another client created the counter first; increment theirs.
                Err(e) if is_not_stored(&e) => continue,
                Err(e) => {
                    return Err(Error::BackendError(format!(
                        "Memcached ADD failed for key {}: {}",
                        key, e
                    )))
                }
            }
        }

        Err(Error::BackendError(format!(
            "Memcached counter {} kept disappearing during increment",
            key
        )))
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        Err(Error::UnsupportedOperation(format!(
            "Memcached cannot enumerate keys matching {}",
            pattern
        )))
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn().await?;

        // get_multi reports "not found" when none of the keys exist
        let values = match conn.get_multi(keys).await {
            Ok(vals) => vals,
            Err(e) if is_not_found(&e) => {
                debug!("✓ Memcached MGET {} keys (all miss)", keys.len());
                return Ok(vec![None; keys.len()]);
            }
            Err(e) => return Err(Error::BackendError(format!("Memcached MGET failed: {}", e))),
        };

        let mut value_map = std::collections::HashMap::with_capacity(values.len());
        for value in values {
            if let Some(data) = value.data {
                value_map.insert(String::from_utf8_lossy(&value.key).into_owned(), data);
            }
        }

        let results = keys.iter().map(|key| value_map.get(*key).cloned()).collect();

        debug!("✓ Memcached MGET {} keys (batch operation)", keys.len());
        Ok(results)
    }

    async fn health_check(&self) -> Result<bool> {
        match self.conn().await {
            Ok(mut conn) => match conn.get("__health_check__").await {
                Ok(_) => Ok(true),
                Err(e) => Ok(is_not_found(&e)),
            },
            Err(_) => Ok(false),
        }
    }
}
