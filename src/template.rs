//! Plain-key helper for values that live outside any namespace.
//!
//! Keys are `{prefix}{sep}{key}` with no namespace and no version segment,
//! so entries here are not affected by namespace clears. Typical uses are
//! flags, small shared documents and expiring counters:
//!
//! ```
//! use cluster_cache::backend::InMemoryStore;
//! use cluster_cache::template::CacheTemplate;
//! use cluster_cache::Ttl;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> cluster_cache::Result<()> {
//! let template = CacheTemplate::new(InMemoryStore::new(), Some("app"), ":", Ttl::default());
//!
//! template.set("feature:dark_mode", &true).await?;
//! assert_eq!(template.get::<bool>("feature:dark_mode").await?, Some(true));
//!
//! // one-minute rate limit window
//! let window = Ttl::After(Duration::from_secs(60));
//! assert_eq!(template.incr_with_ttl("login:alice", window).await?, 1);
//! assert_eq!(template.incr_with_ttl("login:alice", window).await?, 2);
//! # Ok(())
//! # }
//! ```
//!
//! Values are stored as plain JSON; [`set_text`](CacheTemplate::set_text)
//! and [`get_text`](CacheTemplate::get_text) store and read raw UTF-8.

use crate::backend::CacheStore;
use crate::config::CacheSettings;
use crate::duration::Ttl;
use crate::error::{Error, Result};
use crate::key::KeyCodec;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Typed get/set, existence, delete and counters over plain keys.
#[derive(Clone)]
pub struct CacheTemplate<S: CacheStore> {
    store: S,
    codec: KeyCodec,
    default_ttl: Ttl,
}

impl<S: CacheStore> CacheTemplate<S> {
    pub fn new(store: S, prefix: Option<&str>, separator: &str, default_ttl: Ttl) -> Self {
        CacheTemplate {
            store,
            codec: KeyCodec::plain(prefix.filter(|p| !p.is_empty()), separator),
            default_ttl,
        }
    }

    /// Template using the prefix, separator and default TTL of `settings`.
    ///
    /// # Errors
    /// `Error::ParseError` when the default TTL is malformed.
    pub fn from_settings(store: S, settings: &CacheSettings) -> Result<Self> {
        Ok(Self::new(
            store,
            settings.key_prefix.as_deref(),
            &settings.key_separator,
            settings.default_ttl()?,
        ))
    }

    pub fn default_ttl(&self) -> Ttl {
        self.default_ttl
    }

    /// Final store key for `key`.
    pub fn key(&self, key: &str) -> String {
        self.codec.plain_key(&key)
    }

    /// Raw text stored under `key`.
    ///
    /// # Errors
    /// `Error::DeserializationError` when the stored bytes are not UTF-8.
    pub async fn get_text(&self, key: &str) -> Result<Option<String>> {
        let key = self.key(key);
        match self.store.get(&key).await? {
            Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|e| {
                Error::DeserializationError(format!("Value at {} is not UTF-8: {}", key, e))
            }),
            None => Ok(None),
        }
    }

    /// JSON value stored under `key`.
    ///
    /// A value that does not parse as `T` is logged and read as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let key = self.key(key);
        let Some(bytes) = self.store.get(&key).await? else {
            return Ok(None);
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                error!("Cache template get failed for {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// [`get`](Self::get), falling back to `default`.
    pub async fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Store `value` as JSON with the default TTL.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, self.default_ttl).await
    }

    pub async fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Ttl,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.store.set(&self.key(key), bytes, ttl.expiry()).await
    }

    /// Store `text` verbatim with the default TTL.
    pub async fn set_text(&self, key: &str, text: &str) -> Result<()> {
        self.store
            .set(&self.key(key), text.as_bytes().to_vec(), self.default_ttl.expiry())
            .await
    }

    /// Whether a non-empty value is stored under `key`.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self
            .store
            .get(&self.key(key))
            .await?
            .is_some_and(|bytes| !bytes.is_empty()))
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(&self.key(key)).await
    }

    /// Add one to the counter at `key`, starting it at 1 with the default TTL.
    pub async fn incr(&self, key: &str) -> Result<u64> {
        self.incr_by(key, 1, 1, self.default_ttl).await
    }

    /// [`incr`](Self::incr) with a TTL for a newly created counter.
    pub async fn incr_with_ttl(&self, key: &str, ttl: Ttl) -> Result<u64> {
        self.incr_by(key, 1, 1, ttl).await
    }

    /// Add `delta` to the counter at `key`.
    ///
    /// An absent counter is created holding `initial` and expires after
    /// `ttl`; later increments keep that expiry.
    pub async fn incr_by(&self, key: &str, delta: u64, initial: u64, ttl: Ttl) -> Result<u64> {
        self.store
            .increment_with_ttl(&self.key(key), delta, initial, ttl.expiry())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryStore;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Banner {
        text: String,
        priority: u8,
    }

    fn template(store: &InMemoryStore) -> CacheTemplate<InMemoryStore> {
        CacheTemplate::new(store.clone(), Some("app"), ":", Ttl::default())
    }

    #[tokio::test]
    async fn test_set_get_plain_key() {
        let store = InMemoryStore::new();
        let template = template(&store);
        let banner = Banner {
            text: "maintenance at 2am".to_string(),
            priority: 2,
        };

        template.set("banner", &banner).await.expect("Failed to set");

        assert_eq!(store.keys(), vec!["app:banner".to_string()]);
        assert_eq!(template.get::<Banner>("banner").await.unwrap(), Some(banner));
        assert_eq!(template.get::<Banner>("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_wrong_type_is_none() {
        let store = InMemoryStore::new();
        let template = template(&store);

        template.set_text("banner", "not json").await.unwrap();

        assert_eq!(template.get::<Banner>("banner").await.unwrap(), None);
        assert_eq!(
            template.get_text("banner").await.unwrap(),
            Some("not json".to_string())
        );
        assert_eq!(template.get_or("banner", 7u32).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_default_ttl_applied() {
        let store = InMemoryStore::new();
        let template =
            CacheTemplate::new(store.clone(), None, ":", Ttl::After(Duration::from_millis(30)));

        template.set("flag", &true).await.unwrap();
        assert!(template.exists("flag").await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!template.exists("flag").await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let store = InMemoryStore::new();
        let template = template(&store);

        template.set_text("empty", "").await.unwrap();
        template.set("full", &1).await.unwrap();

        assert!(!template.exists("empty").await.unwrap());
        assert!(template.exists("full").await.unwrap());

        template.delete("full").await.unwrap();
        assert!(!template.exists("full").await.unwrap());
        template.delete("full").await.expect("Deleting twice must succeed");
    }

    #[tokio::test]
    async fn test_counter_expires_with_window() {
        let store = InMemoryStore::new();
        let template = template(&store);
        let window = Ttl::After(Duration::from_millis(30));

        assert_eq!(template.incr_with_ttl("hits", window).await.unwrap(), 1);
        assert_eq!(template.incr_with_ttl("hits", window).await.unwrap(), 2);
        assert_eq!(template.incr_by("hits", 5, 1, window).await.unwrap(), 7);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(template.incr_with_ttl("hits", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_counter_without_expiry() {
        let store = InMemoryStore::new();
        let template = template(&store);

        assert_eq!(template.incr_by("total", 1, 10, Ttl::Never).await.unwrap(), 10);
        assert_eq!(template.incr("total").await.unwrap(), 11);
        assert_eq!(template.get::<u64>("total").await.unwrap(), Some(11));
    }

    #[test]
    fn test_from_settings() {
        let settings = CacheSettings::from_json(r#"{"key_prefix": "svc", "default_ttl": "5m"}"#)
            .expect("Failed to parse settings");
        let template = CacheTemplate::from_settings(InMemoryStore::new(), &settings).unwrap();

        assert_eq!(template.key("a b"), "svc:ab");
        assert_eq!(template.default_ttl(), Ttl::After(Duration::from_secs(300)));
    }
}
