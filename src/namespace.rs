//! Versioned namespace cache.
//!
//! Every namespace owns a counter in the store (its *version*) and every
//! entry key embeds the version current at write time:
//!
//! ```text
//! app:users:name_version   -> "3"
//! app:users:3:42           -> {"id":42,...}
//! ```
//!
//! Clearing a namespace is a single atomic increment of the counter. Entries
//! written under older versions become unreachable and age out through their
//! TTL, so a clear costs O(1) whatever the namespace size.

use crate::backend::CacheStore;
use crate::duration::Ttl;
use crate::error::{Error, Result};
use crate::key::KeyCodec;
use crate::serialization::{is_null_sentinel, SerialFormat};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Result of a namespace lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup<T> {
    /// A cached value.
    Hit(T),
    /// A cached "confirmed absent" (null) result.
    Absent,
    /// Nothing cached.
    Miss,
}

impl<T> Lookup<T> {
    /// Whether the cache answered (`Hit` or `Absent`).
    pub fn is_cached(&self) -> bool {
        !matches!(self, Lookup::Miss)
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Lookup::Miss)
    }

    /// The cached value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Lookup::Hit(v) => Some(v),
            Lookup::Absent | Lookup::Miss => None,
        }
    }
}

/// How the namespace version is resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum VersionPolicy {
    /// Read the counter from the store on every operation. A clear issued by
    /// any process is visible immediately.
    #[default]
    PerCall,
    /// Reuse the last resolved version for up to `refresh`. Other processes'
    /// clears become visible after at most `refresh`; this process's own
    /// clears are visible immediately.
    Cached {
        #[serde(with = "crate::duration::text")]
        refresh: Duration,
    },
}

/// Per-namespace settings.
#[derive(Clone, Debug)]
pub struct NamespaceConfig {
    pub prefix: Option<String>,
    pub separator: String,
    pub ttl: Ttl,
    pub cache_null_values: bool,
    pub serial_format: SerialFormat,
    pub version_policy: VersionPolicy,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        NamespaceConfig {
            prefix: None,
            separator: crate::key::DEFAULT_SEPARATOR.to_string(),
            ttl: Ttl::default(),
            cache_null_values: true,
            serial_format: SerialFormat::default(),
            version_policy: VersionPolicy::default(),
        }
    }
}

impl NamespaceConfig {
    pub fn with_ttl(mut self, ttl: Ttl) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_null_values(mut self, enabled: bool) -> Self {
        self.cache_null_values = enabled;
        self
    }

    pub fn with_serial_format(mut self, format: SerialFormat) -> Self {
        self.serial_format = format;
        self
    }

    pub fn with_version_policy(mut self, policy: VersionPolicy) -> Self {
        self.version_policy = policy;
        self
    }
}

/// A named, versioned region of a [`CacheStore`].
///
/// # Example
///
/// ```
/// use cluster_cache::backend::InMemoryStore;
/// use cluster_cache::namespace::{Lookup, NamespaceCache, NamespaceConfig};
///
/// # #[tokio::main]
/// # async fn main() -> cluster_cache::Result<()> {
/// let users = NamespaceCache::new("users", InMemoryStore::new(), NamespaceConfig::default());
///
/// users.put("42", Some(&"alice".to_string())).await?;
/// assert_eq!(users.get::<String>("42").await?, Lookup::Hit("alice".to_string()));
///
/// users.clear().await?;
/// assert_eq!(users.get::<String>("42").await?, Lookup::Miss);
/// # Ok(())
/// # }
/// ```
pub struct NamespaceCache<S: CacheStore> {
    name: String,
    store: S,
    codec: KeyCodec,
    version_key: String,
    config: NamespaceConfig,
    // 0 = not resolved yet; real versions start at 1
    cached_version: AtomicU64,
    resolved_at_ms: AtomicU64,
    epoch: Instant,
}

impl<S: CacheStore> NamespaceCache<S> {
    pub fn new(name: impl Into<String>, store: S, config: NamespaceConfig) -> Self {
        let name = name.into();
        if name.contains(config.separator.as_str()) {
            warn!(
                "Cache name '{}' contains the key separator '{}'; purge may reach other namespaces",
                name, config.separator
            );
        }
        let codec = KeyCodec::new(config.prefix.as_deref(), &name, &config.separator);
        let version_key = codec.version_key();

        NamespaceCache {
            name,
            store,
            codec,
            version_key,
            config,
            cached_version: AtomicU64::new(0),
            resolved_at_ms: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ttl(&self) -> Ttl {
        self.config.ttl
    }

    pub fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Current namespace version, creating the counter at 1 if needed.
    pub async fn version(&self) -> Result<u64> {
        match self.config.version_policy {
            VersionPolicy::PerCall => self.fetch_version().await,
            VersionPolicy::Cached { refresh } => {
                let cached = self.cached_version.load(Ordering::Acquire);
                let age = self
                    .elapsed_ms()
                    .saturating_sub(self.resolved_at_ms.load(Ordering::Acquire));

                if cached != 0 && u128::from(age) < refresh.as_millis() {
                    return Ok(cached);
                }

                let version = self.fetch_version().await?;
                // the counter can go backwards (purge, eviction), so the
                // store's answer replaces whatever was cached
                self.cached_version.store(version, Ordering::Release);
                self.mark_resolved();
                Ok(version)
            }
        }
    }

    async fn fetch_version(&self) -> Result<u64> {
        self.store.increment(&self.version_key, 0, 1).await
    }

    fn mark_resolved(&self) {
        self.resolved_at_ms
            .store(self.elapsed_ms(), Ordering::Release);
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Final store key for `raw_key` under the current version.
    pub async fn build_key(&self, raw_key: &str) -> Result<String> {
        let version = self.version().await?;
        Ok(self.codec.build_key(version, &raw_key))
    }

    /// Final store keys for many raw keys, resolving the version once.
    pub async fn batch_build_keys<K: AsRef<str>>(
        &self,
        raw_keys: &[K],
    ) -> Result<HashMap<String, String>> {
        let version = self.version().await?;
        Ok(raw_keys
            .iter()
            .map(|raw| {
                let raw = raw.as_ref();
                (raw.to_string(), self.codec.build_key(version, &raw))
            })
            .collect())
    }

    /// Encode a value (or null) the way this namespace stores it.
    ///
    /// # Errors
    /// - `Error::NullNotAllowed`: `None` while null caching is disabled
    /// - `Error::SerializationError`: the value cannot be serialized
    pub fn encode<T: Serialize>(&self, value: Option<&T>) -> Result<Vec<u8>> {
        match value {
            Some(v) => self.config.serial_format.encode(v),
            None if self.config.cache_null_values => Ok(self.config.serial_format.encode_null()),
            None => Err(Error::NullNotAllowed(self.name.clone())),
        }
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, bytes: Option<Vec<u8>>) -> Lookup<T> {
        let bytes = match bytes {
            Some(bytes) => bytes,
            None => return Lookup::Miss,
        };

        if is_null_sentinel(&bytes) {
            if self.config.cache_null_values {
                return Lookup::Absent;
            }
            debug!("Ignoring cached null at {} (null caching disabled)", key);
            return Lookup::Miss;
        }

        match self.config.serial_format.decode(&bytes) {
            Ok(Some(value)) => Lookup::Hit(value),
            Ok(None) => Lookup::Absent,
            Err(e) => {
                warn!("Treating undecodable entry {} as a miss: {}", key, e);
                Lookup::Miss
            }
        }
    }

    /// Look up one entry.
    ///
    /// An entry that cannot be decoded as `T` (corrupt bytes, or a typed
    /// envelope naming another type) is logged and reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, raw_key: &str) -> Result<Lookup<T>> {
        let key = self.build_key(raw_key).await?;
        let bytes = self.store.get(&key).await?;
        Ok(self.decode(&key, bytes))
    }

    /// Store one entry with the namespace TTL; `None` caches a null.
    ///
    /// # Errors
    /// - `Error::NullNotAllowed`: `None` while null caching is disabled
    pub async fn put<T: Serialize>(&self, raw_key: &str, value: Option<&T>) -> Result<()> {
        let bytes = self.encode(value)?;
        let key = self.build_key(raw_key).await?;
        self.store.set(&key, bytes, self.config.ttl.expiry()).await
    }

    /// Store only if nothing is cached under `raw_key`.
    ///
    /// Returns `Lookup::Miss` when the value was stored, the existing entry
    /// otherwise. A `None` value while null caching is disabled writes
    /// nothing and returns the current lookup.
    ///
    /// # Errors
    /// `Error::UnsupportedOperation` on stores without a conditional set.
    pub async fn put_if_absent<T>(&self, raw_key: &str, value: Option<&T>) -> Result<Lookup<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        if value.is_none() && !self.config.cache_null_values {
            return self.get(raw_key).await;
        }

        let bytes = self.encode(value)?;
        let key = self.build_key(raw_key).await?;
        let existing = self
            .store
            .set_if_absent(&key, bytes, self.config.ttl.expiry())
            .await?;
        Ok(self.decode(&key, existing))
    }

    /// Remove one entry under the current version.
    pub async fn evict(&self, raw_key: &str) -> Result<()> {
        let key = self.build_key(raw_key).await?;
        self.store.delete(&key).await
    }

    /// Invalidate every entry by bumping the version. Returns the new version.
    ///
    /// A namespace that was never used starts at version 2 so entries
    /// written concurrently under the implicit version 1 are orphaned too.
    pub async fn clear(&self) -> Result<u64> {
        let version = self.store.increment(&self.version_key, 1, 2).await?;
        // a refresh racing with this clear must not roll the version back
        self.cached_version.fetch_max(version, Ordering::AcqRel);
        self.mark_resolved();
        info!("Cache '{}' cleared, version now {}", self.name, version);
        Ok(version)
    }

    /// Best-effort physical deletion of every version of the namespace,
    /// counter included. Returns the number of removed keys.
    ///
    /// # Errors
    /// `Error::UnsupportedOperation` on stores that cannot enumerate keys.
    pub async fn purge(&self) -> Result<u64> {
        let mut removed = 0;
        for pattern in self.codec.namespace_patterns() {
            removed += self.store.delete_by_pattern(&pattern).await?;
        }
        self.cached_version.store(0, Ordering::Release);
        info!("Cache '{}' purged, {} keys removed", self.name, removed);
        Ok(removed)
    }

    /// Look up many entries with one version read and one store `mget`.
    pub async fn get_many<T, K>(&self, raw_keys: &[K]) -> Result<HashMap<String, Lookup<T>>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        if raw_keys.is_empty() {
            return Ok(HashMap::new());
        }

        let version = self.version().await?;
        let keys: Vec<String> = raw_keys
            .iter()
            .map(|raw| self.codec.build_key(version, &raw.as_ref()))
            .collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();

        let values = self.store.mget(&key_refs).await?;
        if values.len() != keys.len() {
            return Err(Error::BackendError(format!(
                "mget returned {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }

        let mut results = HashMap::with_capacity(raw_keys.len());
        for ((raw, key), bytes) in raw_keys.iter().zip(&keys).zip(values) {
            results.insert(raw.as_ref().to_string(), self.decode(key, bytes));
        }

        debug!(
            "Cache '{}' get_many: {} keys, {} cached",
            self.name,
            results.len(),
            results.values().filter(|l| l.is_cached()).count()
        );
        Ok(results)
    }

    /// Store many values with one version read and one store `mset`.
    pub async fn put_many<T: Serialize>(&self, entries: &[(String, T)]) -> Result<()> {
        let encoded = entries
            .iter()
            .map(|(raw, value)| -> Result<(String, Vec<u8>)> {
                Ok((raw.clone(), self.encode(Some(value))?))
            })
            .collect::<Result<Vec<_>>>()?;
        self.put_many_encoded(encoded).await
    }

    /// [`put_many`](Self::put_many) for values already passed through
    /// [`encode`](Self::encode).
    pub async fn put_many_encoded(&self, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let version = self.version().await?;
        let count = entries.len();
        let keyed = entries
            .into_iter()
            .map(|(raw, bytes)| (self.codec.build_key(version, &raw), bytes))
            .collect();

        self.store.mset(keyed, self.config.ttl.expiry()).await?;
        debug!("Cache '{}' put_many: {} entries", self.name, count);
        Ok(())
    }

    /// Single-key cache-aside.
    ///
    /// Returns the cached value, or calls `loader` on a miss and caches what
    /// it returns (a `None` result is cached as a null when enabled). Failing
    /// to write back is logged, not returned.
    pub async fn get_or_load<T, F, Fut>(&self, raw_key: &str, loader: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        match self.get::<T>(raw_key).await? {
            Lookup::Hit(value) => return Ok(Some(value)),
            Lookup::Absent => return Ok(None),
            Lookup::Miss => {}
        }

        let loaded = loader().await?;

        if loaded.is_some() || self.config.cache_null_values {
            if let Err(e) = self.put(raw_key, loaded.as_ref()).await {
                warn!("Failed to cache loaded value for {}: {}", raw_key, e);
            }
        }

        Ok(loaded)
    }
}
