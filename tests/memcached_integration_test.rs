//! Memcached Store Integration Tests
//!
//! These tests require a running Memcached instance and skip themselves when
//! none is reachable.
//!
//! ```bash
//! cargo test --features memcached --test memcached_integration_test
//! ```
//!
//! **Note:** Tests use unique key prefixes per test to avoid conflicts when run in parallel.
//!
//! ## Environment Variables
//!
//! - `TEST_MEMCACHED_URL`: Memcached server address (default: "localhost:11211")

#![cfg(feature = "memcached")]

use cluster_cache::backend::{CacheStore, MemcachedConfig, MemcachedStore};
use cluster_cache::batch::{Backfill, BatchExpander, BatchRequest};
use cluster_cache::{Error, Lookup, NamespaceCache, NamespaceConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// Helper: Get Memcached server address from environment or use default
fn get_memcached_url() -> String {
    env::var("TEST_MEMCACHED_URL").unwrap_or_else(|_| "localhost:11211".to_string())
}

/// Helper: Generate a unique test key prefix for test isolation
///
/// Memcached keys may not contain spaces or control characters, so the
/// UUID is used in its simple form.
fn unique_test_key(base: &str) -> String {
    use uuid::Uuid;

    let uuid = Uuid::now_v7();
    format!("test_{}_{}", uuid.simple(), base.replace(':', "_"))
}

/// Helper: Connect, or `None` when Memcached is not reachable
async fn connect() -> Option<MemcachedStore> {
    let config = MemcachedConfig {
        servers: vec![get_memcached_url()],
        connection_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let store = MemcachedStore::new(config).await.ok()?;
    match store.health_check().await {
        Ok(true) => Some(store),
        _ => {
            println!("⚠️  Memcached not available, skipping test");
            None
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct Session {
    id: String,
    user: String,
}

#[tokio::test]
async fn test_memcached_basic_operations() {
    let Some(store) = connect().await else { return };
    let key = unique_test_key("basic");

    assert_eq!(store.get(&key).await.expect("GET failed"), None);

    store
        .set(&key, b"value".to_vec(), Some(Duration::from_secs(60)))
        .await
        .expect("SET failed");
    assert_eq!(store.get(&key).await.unwrap(), Some(b"value".to_vec()));

    store.delete(&key).await.expect("DELETE failed");
    assert_eq!(store.get(&key).await.unwrap(), None);

    // deleting a missing key is not an error
    store.delete(&key).await.expect("DELETE of missing key failed");
}

#[tokio::test]
async fn test_memcached_ttl_expiration() {
    let Some(store) = connect().await else { return };
    let key = unique_test_key("ttl");

    store
        .set(&key, b"short".to_vec(), Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert!(store.get(&key).await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
async fn test_memcached_increment() {
    let Some(store) = connect().await else { return };
    let key = unique_test_key("counter");

    assert_eq!(store.increment(&key, 0, 1).await.unwrap(), 1);
    assert_eq!(store.increment(&key, 1, 1).await.unwrap(), 2);
    assert_eq!(store.increment(&key, 0, 1).await.unwrap(), 2);

    store.delete(&key).await.unwrap();
}

#[tokio::test]
async fn test_memcached_expiring_counter() {
    let Some(store) = connect().await else { return };
    let key = unique_test_key("window");
    let window = Some(Duration::from_secs(1));

    assert_eq!(store.increment_with_ttl(&key, 1, 1, window).await.unwrap(), 1);
    assert_eq!(store.increment_with_ttl(&key, 1, 1, window).await.unwrap(), 2);

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert_eq!(store.increment_with_ttl(&key, 1, 1, window).await.unwrap(), 1);

    store.delete(&key).await.unwrap();
}

#[tokio::test]
async fn test_memcached_mget_preserves_order() {
    let Some(store) = connect().await else { return };
    let a = unique_test_key("a");
    let b = unique_test_key("b");
    let missing = unique_test_key("missing");

    store.set(&a, b"A".to_vec(), None).await.unwrap();
    store.set(&b, b"B".to_vec(), None).await.unwrap();

    let values = store
        .mget(&[b.as_str(), missing.as_str(), a.as_str()])
        .await
        .expect("MGET failed");
    assert_eq!(values, vec![Some(b"B".to_vec()), None, Some(b"A".to_vec())]);

    let none = store.mget(&[missing.as_str()]).await.unwrap();
    assert_eq!(none, vec![None]);

    store.delete(&a).await.unwrap();
    store.delete(&b).await.unwrap();
}

#[tokio::test]
async fn test_memcached_unsupported_primitives() {
    let Some(store) = connect().await else { return };
    let key = unique_test_key("unsupported");

    let result = store.set_if_absent(&key, b"x".to_vec(), None).await;
    assert!(matches!(result, Err(Error::UnsupportedOperation(_))));

    let result = store.delete_by_pattern("test_*").await;
    assert!(matches!(result, Err(Error::UnsupportedOperation(_))));
}

#[tokio::test]
async fn test_memcached_namespace_clear() {
    let Some(store) = connect().await else { return };
    let sessions = NamespaceCache::new(
        "sessions",
        store,
        NamespaceConfig::default().with_prefix(unique_test_key("ns")),
    );

    let session = Session {
        id: "s1".to_string(),
        user: "alice".to_string(),
    };
    sessions.put("s1", Some(&session)).await.unwrap();
    assert_eq!(sessions.get::<Session>("s1").await.unwrap(), Lookup::Hit(session));

    assert_eq!(sessions.clear().await.unwrap(), 2);
    assert!(sessions.get::<Session>("s1").await.unwrap().is_miss());
}

#[tokio::test]
async fn test_memcached_batch_expander() {
    let Some(store) = connect().await else { return };
    let namespace = Arc::new(NamespaceCache::new(
        "sessions",
        store,
        NamespaceConfig::default().with_prefix(unique_test_key("batch")),
    ));
    let expander = BatchExpander::new(namespace);

    let request = || {
        BatchRequest::new(["s1", "s2"])
            .with_key_extractor(|s: &Session| Some(s.id.clone()))
            .with_backfill(Backfill::Sync)
    };
    let load = |ids: Vec<String>| async move {
        Ok(ids
            .into_iter()
            .map(|id| Session {
                id,
                user: "bob".to_string(),
            })
            .collect::<Vec<_>>())
    };

    let first: Vec<Session> = expander.fetch(request(), load).await.unwrap();
    let second: Vec<Session> = expander
        .fetch(request(), |ids: Vec<String>| async move {
            assert!(ids.is_empty(), "everything should be cached: {:?}", ids);
            Ok(Vec::new())
        })
        .await
        .unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(second, first);
}
