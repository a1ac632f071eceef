//! Redis cache store.
//!
//! Every call checks a connection out of the deadpool pool and returns it on
//! drop, so no exit path can leak one. Read-modify-write primitives run as
//! Lua scripts to stay atomic in a single round trip.

use super::CacheStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands, Script};
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use serde::Deserialize;
use std::time::Duration;

/// Default Redis connection pool size.
/// Override with REDIS_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: u32 = 16;

/// Keys requested per SCAN round trip.
const SCAN_COUNT: usize = 500;

/// Longest expiry sent with PX. Redis adds its clock to the value and
/// rejects sums past the i64 range.
const MAX_TTL_MILLIS: u64 = (i64::MAX / 2) as u64;

/// Counter read or initialise (PX ARGV[3] when > 0), then INCRBY. INCRBY
/// keeps the expiry set at creation.
const INCREMENT_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then
  if tonumber(ARGV[3]) > 0 then
    redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
  else
    redis.call('SET', KEYS[1], ARGV[2])
  end
  return tonumber(ARGV[2])
end
return redis.call('INCRBY', KEYS[1], ARGV[1])
";

/// Returns the existing value, or stores ARGV[1] (PX ARGV[2] when > 0) and
/// returns nil.
const SET_IF_ABSENT_SCRIPT: &str = r"
local existing = redis.call('GET', KEYS[1])
if existing then
  return existing
end
if tonumber(ARGV[2]) > 0 then
  redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
else
  redis.call('SET', KEYS[1], ARGV[1])
end
return false
";

/// Configuration for the Redis store.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: u32,
    pub pool_size: u32,
    #[serde(with = "crate::duration::text")]
    pub connection_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            host: "localhost".to_string(),
            port: 6379,
            username: None,
            password: None,
            database: 0,
            pool_size: DEFAULT_POOL_SIZE,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    /// Build Redis connection string.
    pub fn connection_string(&self) -> String {
        if let Some(password) = &self.password {
            if let Some(username) = &self.username {
                format!(
                    "redis://{}:{}@{}:{}/{}",
                    username, password, self.host, self.port, self.database
                )
            } else {
                format!(
                    "redis://default:{}@{}:{}/{}",
                    password, self.host, self.port, self.database
                )
            }
        } else {
            format!("redis://{}:{}/{}", self.host, self.port, self.database)
        }
    }
}

/// Expiry in milliseconds; sub-millisecond TTLs round up so they still
/// expire, and very long ones are capped at [`MAX_TTL_MILLIS`].
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis())
        .unwrap_or(u64::MAX)
        .clamp(1, MAX_TTL_MILLIS)
}

/// Redis store with connection pooling.
///
/// # Example
///
/// ```no_run
/// # use cluster_cache::backend::{RedisStore, RedisConfig, CacheStore};
/// # use cluster_cache::Result;
/// # async fn example() -> Result<()> {
/// let store = RedisStore::new(RedisConfig::default()).await?;
///
/// store.set("key", b"value".to_vec(), None).await?;
/// let value = store.get("key").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Create a store from configuration.
    ///
    /// # Errors
    /// Returns `Err` if pool creation fails.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let pool = Self::build_pool(
            &config.connection_string(),
            config.pool_size,
            config.connection_timeout,
        )?;

        info!(
            "✓ Redis store initialized: {}:{} (pool size: {})",
            config.host, config.port, config.pool_size
        );

        Ok(RedisStore { pool })
    }

    /// Create from connection string directly.
    ///
    /// Pool size is determined by:
    /// 1. `REDIS_POOL_SIZE` environment variable (if set)
    /// 2. `DEFAULT_POOL_SIZE` constant (16)
    ///
    /// # Errors
    /// Returns `Err` if pool creation fails.
    pub async fn from_connection_string(conn_str: &str) -> Result<Self> {
        let pool_size = std::env::var("REDIS_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        let pool = Self::build_pool(
            conn_str,
            pool_size,
            RedisConfig::default().connection_timeout,
        )?;

        info!(
            "✓ Redis store initialized from connection string (pool size: {})",
            pool_size
        );

        Ok(RedisStore { pool })
    }

    fn build_pool(conn_str: &str, pool_size: u32, timeout: Duration) -> Result<Pool> {
        let mut pool_cfg = deadpool_redis::PoolConfig::new(pool_size as usize);
        pool_cfg.timeouts.wait = Some(timeout);
        pool_cfg.timeouts.create = Some(timeout);
        pool_cfg.timeouts.recycle = Some(timeout);

        let mut cfg = PoolConfig::from_url(conn_str);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::BackendError(format!("Failed to create Redis pool: {}", e)))
    }

    async fn conn(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::BackendError(format!("Failed to get Redis connection: {}", e)))
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;

        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| Error::BackendError(format!("Redis GET failed for key {}: {}", key, e)))?;

        if value.is_some() {
            debug!("✓ Redis GET {} -> HIT", key);
        } else {
            debug!("✓ Redis GET {} -> MISS", key);
        }

        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn().await?;

        match ttl {
            Some(duration) => {
                let millis = ttl_millis(duration);
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(millis)
                    .query_async::<()>(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::BackendError(format!("Redis SET PX failed for key {}: {}", key, e))
                    })?;
                debug!("✓ Redis SET {} (TTL: {}ms)", key, millis);
            }
            None => {
                conn.set::<_, _, ()>(key, value).await.map_err(|e| {
                    Error::BackendError(format!("Redis SET failed for key {}: {}", key, e))
                })?;
                debug!("✓ Redis SET {}", key);
            }
        }

        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;

        let existing: Option<Vec<u8>> = Script::new(SET_IF_ABSENT_SCRIPT)
            .key(key)
            .arg(value)
            .arg(ttl.map(ttl_millis).unwrap_or(0))
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| {
                Error::BackendError(format!("Redis SETNX failed for key {}: {}", key, e))
            })?;

        if existing.is_some() {
            debug!("✓ Redis SETNX {} -> EXISTS", key);
        } else {
            debug!("✓ Redis SETNX {} -> STORED", key);
        }

        Ok(existing)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;

        conn.del::<_, ()>(key)
            .await
            .map_err(|e| Error::BackendError(format!("Redis DEL failed for key {}: {}", key, e)))?;

        debug!("✓ Redis DELETE {}", key);
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

        let value: i64 = Script::new(INCREMENT_SCRIPT)
            .key(key)
            .arg(delta)
            .arg(initial)
            .arg(ttl.map(ttl_millis).unwrap_or(0))
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| {
                Error::BackendError(format!("Redis INCR failed for key {}: {}", key, e))
            })?;

        debug!("✓ Redis INCR {} by {} -> {}", key, delta, value);

        u64::try_from(value)
            .map_err(|_| Error::BackendError(format!("Counter at {} is negative", key)))
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.conn().await?;

        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut *conn)
                .await
                .map_err(|e| Error::BackendError(format!("Redis SCAN failed: {}", e)))?;

            if !keys.is_empty() {
                let deleted: u64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut *conn)
                    .await
                    .map_err(|e| Error::BackendError(format!("Redis DEL (bulk) failed: {}", e)))?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("✓ Redis DELETE pattern {} -> {} keys", pattern, removed);
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;

        let exists: bool = conn.exists(key).await.map_err(|e| {
            Error::BackendError(format!("Redis EXISTS failed for key {}: {}", key, e))
        })?;

        Ok(exists)
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn().await?;

        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut *conn)
            .await
            .map_err(|e| Error::BackendError(format!("Redis MGET failed: {}", e)))?;

        debug!("✓ Redis MGET {} keys", keys.len());
        Ok(values)
    }

    async fn mset(&self, entries: Vec<(String, Vec<u8>)>, ttl: Option<Duration>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn().await?;
        let count = entries.len();

        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.cmd("SET").arg(key).arg(value);
            if let Some(duration) = ttl {
                pipe.arg("PX").arg(ttl_millis(duration));
            }
            pipe.ignore();
        }

        pipe.query_async::<()>(&mut *conn)
            .await
            .map_err(|e| Error::BackendError(format!("Redis MSET pipeline failed: {}", e)))?;

        debug!("✓ Redis MSET {} keys", count);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.conn().await?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| Error::BackendError(format!("Redis PING failed: {}", e)))?;

        Ok(pong.contains("PONG"))
    }
}
