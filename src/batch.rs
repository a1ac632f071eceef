//! Batch cache-aside loading.
//!
//! [`BatchExpander::fetch`] resolves a set of identities against a
//! namespace, hands only the misses to the loader (the source of truth) and
//! writes what the loader returns back into the cache:
//!
//! 1. look up `prefix + id` for every id with one `mget`
//! 2. return straight from cache when nothing is missing
//! 3. call the loader with exactly the missing ids
//! 4. backfill loaded values, inline or on a [`BackfillPool`]
//! 5. return cached values followed by loaded ones
//!
//! The cache never breaks a call. A failing lookup degrades to a direct
//! loader call, a failing backfill is logged. Only loader errors reach the
//! caller, and the loader is never invoked twice for one call.
//!
//! # Example
//!
//! ```
//! use cluster_cache::backend::InMemoryStore;
//! use cluster_cache::batch::{BatchExpander, BatchRequest, Backfill};
//! use cluster_cache::namespace::{NamespaceCache, NamespaceConfig};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
//! struct User {
//!     id: String,
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> cluster_cache::Result<()> {
//! let users = Arc::new(NamespaceCache::new("users", InMemoryStore::new(), NamespaceConfig::default()));
//! let expander = BatchExpander::new(users);
//!
//! let request = BatchRequest::new(["a", "b"])
//!     .with_prefix("user:")
//!     .with_key_extractor(|u: &User| Some(u.id.clone()))
//!     .with_backfill(Backfill::Sync);
//!
//! let loaded: Vec<User> = expander
//!     .fetch(request, |ids: Vec<String>| async move {
//!         Ok(ids.into_iter().map(|id| User { id }).collect())
//!     })
//!     .await?;
//! assert_eq!(loaded.len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::backend::CacheStore;
use crate::error::Result;
use crate::namespace::{Lookup, NamespaceCache};
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::pool::BackfillPool;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

/// Derives the identity of a loaded value; `None` skips its backfill.
pub type KeyExtractor<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;

/// When loaded values are written back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backfill {
    /// Before `fetch` returns.
    Sync,
    /// On the backfill pool; `fetch` returns without waiting.
    #[default]
    Async,
}

/// Collection shapes a batch result can be returned as.
///
/// Implemented for sequences and sets. Cached values are emitted first, in
/// identity order, followed by loaded values in loader order; sets apply
/// their own ordering and deduplication on top.
pub trait BatchCollection<T>: Sized {
    fn from_batch(items: Vec<T>) -> Self;
}

impl<T> BatchCollection<T> for Vec<T> {
    fn from_batch(items: Vec<T>) -> Self {
        items
    }
}

impl<T> BatchCollection<T> for VecDeque<T> {
    fn from_batch(items: Vec<T>) -> Self {
        items.into()
    }
}

impl<T: Eq + Hash> BatchCollection<T> for HashSet<T> {
    fn from_batch(items: Vec<T>) -> Self {
        items.into_iter().collect()
    }
}

impl<T: Ord> BatchCollection<T> for BTreeSet<T> {
    fn from_batch(items: Vec<T>) -> Self {
        items.into_iter().collect()
    }
}

/// Source of truth for a batch: loads values for the given ids.
///
/// Any `FnOnce(Vec<String>) -> impl Future<Output = Result<Vec<T>>>` is a
/// loader. Loader failures should be reported as `Error::LoaderError`; they
/// are passed to the caller unchanged.
pub trait BatchLoader<T> {
    type Future: Future<Output = Result<Vec<T>>>;

    fn load(self, ids: Vec<String>) -> Self::Future;
}

impl<T, F, Fut> BatchLoader<T> for F
where
    F: FnOnce(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    type Future = Fut;

    fn load(self, ids: Vec<String>) -> Fut {
        self(ids)
    }
}

/// One batch call.
pub struct BatchRequest<T> {
    pub prefix: String,
    pub ids: Vec<String>,
    pub key_extractor: Option<KeyExtractor<T>>,
    pub backfill: Backfill,
}

impl<T> BatchRequest<T> {
    pub fn new<I>(ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToString,
    {
        BatchRequest {
            prefix: String::new(),
            ids: ids.into_iter().map(|id| id.to_string()).collect(),
            key_extractor: None,
            backfill: Backfill::default(),
        }
    }

    /// Prefix prepended to every id to form the raw cache key.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Enable backfill, keyed by what `extractor` returns for each value.
    pub fn with_key_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&T) -> Option<String> + Send + Sync + 'static,
    {
        self.key_extractor = Some(Arc::new(extractor));
        self
    }

    pub fn with_backfill(mut self, backfill: Backfill) -> Self {
        self.backfill = backfill;
        self
    }
}

impl<T> fmt::Debug for BatchRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRequest")
            .field("prefix", &self.prefix)
            .field("ids", &self.ids)
            .field("key_extractor", &self.key_extractor.is_some())
            .field("backfill", &self.backfill)
            .finish()
    }
}

/// Batch cache-aside orchestrator bound to one namespace.
pub struct BatchExpander<S: CacheStore> {
    namespace: Arc<NamespaceCache<S>>,
    pool: Option<BackfillPool>,
    metrics: Arc<dyn CacheMetrics>,
}

impl<S: CacheStore> BatchExpander<S> {
    /// Without a pool, [`Backfill::Async`] requests are backfilled inline.
    pub fn new(namespace: Arc<NamespaceCache<S>>) -> Self {
        BatchExpander {
            namespace,
            pool: None,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    pub fn with_pool(mut self, pool: BackfillPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = Arc::from(metrics);
        self
    }

    pub fn namespace(&self) -> &Arc<NamespaceCache<S>> {
        &self.namespace
    }

    /// Resolve `request` through the cache, loading misses with `loader`.
    ///
    /// Duplicate ids are collapsed, keeping first occurrences. Cached nulls
    /// count as hits and contribute nothing to the result.
    ///
    /// # Errors
    ///
    /// Only errors returned by the loader. Cache failures are logged,
    /// reported through [`CacheMetrics::record_error`] and absorbed.
    pub async fn fetch<T, C, L>(&self, request: BatchRequest<T>, loader: L) -> Result<C>
    where
        T: Serialize + DeserializeOwned,
        C: BatchCollection<T>,
        L: BatchLoader<T>,
    {
        let BatchRequest {
            prefix,
            ids,
            key_extractor,
            backfill,
        } = request;
        let name = self.namespace.name();

        let mut seen = HashSet::with_capacity(ids.len());
        let ids: Vec<String> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();

        if ids.is_empty() {
            debug!("Batch '{}' has no ids, calling loader directly", name);
            return loader.load(ids).await.map(C::from_batch);
        }

        let timer = Instant::now();
        let raw_keys: Vec<String> = ids.iter().map(|id| format!("{}{}", prefix, id)).collect();

        let mut lookups = match self.namespace.get_many::<T, _>(&raw_keys).await {
            Ok(lookups) => lookups,
            Err(e) => {
                warn!(
                    "Batch lookup in '{}' failed, loading {} ids directly: {}",
                    name,
                    ids.len(),
                    e
                );
                self.metrics.record_error(name, &e.to_string());
                return loader.load(ids).await.map(C::from_batch);
            }
        };
        let elapsed = timer.elapsed();

        let mut values = Vec::with_capacity(ids.len());
        let mut misses = Vec::new();
        for (id, key) in ids.into_iter().zip(&raw_keys) {
            match lookups.remove(key).unwrap_or(Lookup::Miss) {
                Lookup::Hit(value) => {
                    self.metrics.record_hit(key, elapsed);
                    values.push(value);
                }
                Lookup::Absent => self.metrics.record_hit(key, elapsed),
                Lookup::Miss => {
                    self.metrics.record_miss(key, elapsed);
                    misses.push(id);
                }
            }
        }

        if misses.is_empty() {
            debug!("✓ Batch '{}' served {} keys from cache", name, raw_keys.len());
            return Ok(C::from_batch(values));
        }

        debug!(
            "Batch '{}': {} cached, loading {} misses",
            name,
            raw_keys.len() - misses.len(),
            misses.len()
        );

        let loaded = loader.load(misses).await?;

        if let Some(extractor) = &key_extractor {
            if !loaded.is_empty() {
                self.backfill(&prefix, extractor, &loaded, backfill).await;
            }
        }

        values.extend(loaded);
        Ok(C::from_batch(values))
    }

    async fn backfill<T: Serialize>(
        &self,
        prefix: &str,
        extractor: &KeyExtractor<T>,
        loaded: &[T],
        mode: Backfill,
    ) {
        let name = self.namespace.name();
        let mut entries = Vec::with_capacity(loaded.len());

        for value in loaded {
            let Some(id) = extractor(value) else {
                warn!("Skipping backfill in '{}': value has no cache key", name);
                continue;
            };
            let key = format!("{}{}", prefix, id);
            match self.namespace.encode(Some(value)) {
                Ok(bytes) => entries.push((key, bytes)),
                Err(e) => {
                    warn!("Skipping backfill of {} in '{}': {}", key, name, e);
                    self.metrics.record_error(&key, &e.to_string());
                }
            }
        }

        if entries.is_empty() {
            return;
        }

        match (mode, &self.pool) {
            (Backfill::Async, Some(pool)) => {
                let namespace = Arc::clone(&self.namespace);
                let metrics = Arc::clone(&self.metrics);
                let count = entries.len();
                let accepted = pool.submit(async move {
                    write_back(&namespace, metrics.as_ref(), entries).await;
                });
                if accepted {
                    debug!("Batch '{}' queued backfill of {} entries", name, count);
                }
            }
            (Backfill::Async, None) => {
                debug!("Batch '{}' has no backfill pool, writing inline", name);
                write_back(&self.namespace, self.metrics.as_ref(), entries).await;
            }
            (Backfill::Sync, _) => {
                write_back(&self.namespace, self.metrics.as_ref(), entries).await;
            }
        }
    }
}

async fn write_back<S: CacheStore>(
    namespace: &NamespaceCache<S>,
    metrics: &dyn CacheMetrics,
    entries: Vec<(String, Vec<u8>)>,
) {
    let started = Instant::now();
    let keys: Vec<String> = entries.iter().map(|(key, _)| key.clone()).collect();

    match namespace.put_many_encoded(entries).await {
        Ok(()) => {
            let elapsed = started.elapsed();
            for key in &keys {
                metrics.record_set(key, elapsed);
            }
            debug!(
                "✓ Backfilled {} entries into '{}'",
                keys.len(),
                namespace.name()
            );
        }
        Err(e) => {
            warn!("Backfill into '{}' failed: {}", namespace.name(), e);
            metrics.record_error(namespace.name(), &e.to_string());
        }
    }
}
