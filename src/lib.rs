//! # cluster-cache
//!
//! Versioned namespace caching and batch cache-aside loading over a
//! pluggable key/value store.
//!
//! ## Features
//!
//! - **Backend Agnostic:** in-memory, Redis and Memcached stores behind one
//!   [`CacheStore`] trait, or pick one at runtime with [`backend::AnyStore`]
//! - **O(1) Namespace Clear:** every namespace carries a version counter;
//!   bumping it orphans all entries, which then age out through their TTL
//! - **Null Caching:** confirmed-absent values are cached with a sentinel so
//!   the source of truth is not hit again for them
//! - **Batch Cache-Aside:** one `mget`, one loader call for exactly the
//!   missing ids, backfill inline or on a bounded worker pool
//! - **Fail Open:** cache outages degrade to direct loads, never to errors
//! - **Plain Keys:** [`CacheTemplate`] for values and expiring counters
//!   outside any namespace
//!
//! ## Quick Start
//!
//! ```
//! use cluster_cache::{CacheManager, CacheSettings, Lookup};
//! use cluster_cache::backend::InMemoryStore;
//!
//! # #[tokio::main]
//! # async fn main() -> cluster_cache::Result<()> {
//! let settings = CacheSettings::from_json(r#"{"key_prefix": "app", "namespaces": {"users": "10m"}}"#)?;
//! let manager = CacheManager::new(InMemoryStore::new(), settings)?;
//!
//! let users = manager.cache("users");
//! users.put("42", Some(&"alice".to_string())).await?;
//! users.put::<String>("43", None).await?;
//!
//! assert_eq!(users.get::<String>("42").await?, Lookup::Hit("alice".to_string()));
//! assert_eq!(users.get::<String>("43").await?, Lookup::Absent);
//!
//! // Drop everything in the namespace at once.
//! users.clear().await?;
//! assert_eq!(users.get::<String>("42").await?, Lookup::Miss);
//! # Ok(())
//! # }
//! ```
//!
//! Batch loading goes through [`BatchExpander`]; see [`batch`].

#[macro_use]
extern crate log;

pub mod backend;
pub mod batch;
pub mod config;
pub mod duration;
pub mod error;
pub mod key;
pub mod manager;
pub mod namespace;
pub mod observability;
pub mod pool;
pub mod serialization;
pub mod template;

// Re-exports for convenience
pub use backend::CacheStore;
pub use batch::{Backfill, BatchExpander, BatchRequest};
pub use config::CacheSettings;
pub use duration::{parse_ttl, Ttl};
pub use error::{Error, Result};
pub use key::KeyCodec;
pub use manager::CacheManager;
pub use namespace::{Lookup, NamespaceCache, NamespaceConfig};
pub use pool::{BackfillPool, BackfillSettings};
pub use template::CacheTemplate;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
