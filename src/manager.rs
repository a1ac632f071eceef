//! Registry of namespace caches sharing one store.

use crate::backend::{AnyStore, CacheStore};
use crate::batch::BatchExpander;
use crate::config::CacheSettings;
use crate::duration::Ttl;
use crate::error::Result;
use crate::namespace::NamespaceCache;
use crate::pool::BackfillPool;
use crate::template::CacheTemplate;
use dashmap::DashMap;
use std::sync::Arc;

/// Hands out [`NamespaceCache`]s by name.
///
/// Namespaces listed in the settings are registered with their TTL up
/// front; any other name is created on first use with the default TTL.
///
/// # Example
///
/// ```
/// use cluster_cache::backend::InMemoryStore;
/// use cluster_cache::config::CacheSettings;
/// use cluster_cache::manager::CacheManager;
///
/// # #[tokio::main]
/// # async fn main() -> cluster_cache::Result<()> {
/// let settings = CacheSettings::from_json(r#"{"namespaces": {"users": "10m"}}"#)?;
/// let manager = CacheManager::new(InMemoryStore::new(), settings)?;
///
/// let users = manager.cache("users");
/// users.put("42", Some(&"alice")).await?;
///
/// assert_eq!(manager.names(), vec!["users".to_string()]);
/// # Ok(())
/// # }
/// ```
pub struct CacheManager<S: CacheStore> {
    store: S,
    settings: CacheSettings,
    default_ttl: Ttl,
    caches: DashMap<String, Arc<NamespaceCache<S>>>,
    pool: Option<BackfillPool>,
}

impl<S: CacheStore> CacheManager<S> {
    /// Register every namespace from `settings`.
    ///
    /// # Errors
    /// - `Error::ParseError`: a malformed TTL in the settings
    /// - `Error::ConfigError`: other invalid settings
    pub fn new(store: S, settings: CacheSettings) -> Result<Self> {
        settings.validate()?;
        let default_ttl = settings.default_ttl()?;

        let caches = DashMap::new();
        for (name, ttl) in settings.namespace_ttls()? {
            info!("Cache '{}' registered (TTL: {})", name, ttl);
            let cache = NamespaceCache::new(name.clone(), store.clone(), settings.namespace_config(ttl));
            caches.insert(name, Arc::new(cache));
        }

        Ok(CacheManager {
            store,
            settings,
            default_ttl,
            caches,
            pool: None,
        })
    }

    /// Pool used by [`expander`](Self::expander) for asynchronous backfill.
    pub fn with_backfill_pool(mut self, pool: BackfillPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// The namespace called `name`, created with the default TTL if unknown.
    pub fn cache(&self, name: &str) -> Arc<NamespaceCache<S>> {
        if let Some(cache) = self.caches.get(name) {
            return Arc::clone(cache.value());
        }

        let entry = self.caches.entry(name.to_string()).or_insert_with(|| {
            info!("Cache '{}' created on demand (TTL: {})", name, self.default_ttl);
            Arc::new(NamespaceCache::new(
                name,
                self.store.clone(),
                self.settings.namespace_config(self.default_ttl),
            ))
        });
        Arc::clone(entry.value())
    }

    /// The namespace called `name` if it already exists.
    pub fn get_cache(&self, name: &str) -> Option<Arc<NamespaceCache<S>>> {
        self.caches.get(name).map(|cache| Arc::clone(cache.value()))
    }

    /// Replace the namespace `name` with one using `ttl`.
    ///
    /// Stored entries and the version counter are untouched; handles obtained
    /// earlier keep their old TTL.
    pub fn reconfigure(&self, name: &str, ttl: Ttl) -> Arc<NamespaceCache<S>> {
        info!("Cache '{}' reconfigured (TTL: {})", name, ttl);
        let cache = Arc::new(NamespaceCache::new(
            name,
            self.store.clone(),
            self.settings.namespace_config(ttl),
        ));
        self.caches.insert(name.to_string(), Arc::clone(&cache));
        cache
    }

    /// Batch orchestrator for the namespace `name`.
    pub fn expander(&self, name: &str) -> BatchExpander<S> {
        let expander = BatchExpander::new(self.cache(name));
        match &self.pool {
            Some(pool) => expander.with_pool(pool.clone()),
            None => expander,
        }
    }

    /// Plain-key helper on the same store, prefix and default TTL.
    pub fn template(&self) -> CacheTemplate<S> {
        CacheTemplate::new(
            self.store.clone(),
            self.settings.key_prefix.as_deref(),
            &self.settings.key_separator,
            self.default_ttl,
        )
    }

    /// Registered namespace names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }
}

impl CacheManager<AnyStore> {
    /// Connect the configured backend and start the backfill pool.
    ///
    /// Must run inside a tokio runtime.
    pub async fn connect(settings: CacheSettings) -> Result<Self> {
        settings.validate()?;
        let store = AnyStore::connect(&settings.backend).await?;
        let pool = BackfillPool::new(settings.backfill.clone())?;

        info!("✓ Cache manager connected to {} store", store.kind());
        Ok(CacheManager::new(store, settings)?.with_backfill_pool(pool))
    }
}
