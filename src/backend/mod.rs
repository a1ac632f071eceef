//! Cache store adapters.
//!
//! Everything above this layer talks to a [`CacheStore`]: a byte-oriented
//! key/value contract with the few atomic primitives the namespace cache
//! needs (conditional set, counters, pattern deletion).

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use std::time::Duration;

mod any;
pub mod inmemory;
#[cfg(feature = "memcached")]
pub mod memcached;
#[cfg(feature = "redis")]
pub mod redis;

pub use any::{AnyStore, BackendSettings};
pub use inmemory::InMemoryStore;
#[cfg(feature = "memcached")]
pub use memcached::{MemcachedConfig, MemcachedStore};
#[cfg(feature = "redis")]
pub use redis::{RedisConfig, RedisStore};

/// Concurrent `get` calls issued by the default [`CacheStore::mget`].
pub const MGET_CONCURRENCY: usize = 16;

/// Byte-oriented key/value store.
///
/// All methods take `&self`; implementations hold shared handles (pools,
/// `Arc`s) and are cheap to clone. Futures are `Send` so store calls can run
/// on spawned tasks such as the backfill pool.
#[async_trait]
pub trait CacheStore: Send + Sync + Clone + 'static {
    /// Retrieve value by key; `Ok(None)` on a miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Unconditional upsert. `ttl = None` stores without expiration.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Store only if the key is absent.
    ///
    /// # Returns
    /// - `Ok(None)` - value stored
    /// - `Ok(Some(existing))` - key already present, nothing written
    ///
    /// # Errors
    /// `Error::UnsupportedOperation` on stores without an atomic primitive.
    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<Option<Vec<u8>>>;

    /// Remove a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomically add `delta` to a counter and return the new value.
    ///
    /// An absent counter is created holding `initial`; `delta` is not applied
    /// in that case. Counters are stored as ASCII decimal so every adapter
    /// agrees on the representation.
    async fn increment(&self, key: &str, delta: u64, initial: u64) -> Result<u64>;

    /// [`increment`](Self::increment) for counters that expire.
    ///
    /// `ttl` is applied when the counter is created and left alone by later
    /// increments, so a counter lives for one window from its first use.
    ///
    /// # Errors
    /// The default implementation only handles `ttl = None` and returns
    /// `Error::UnsupportedOperation` otherwise.
    async fn increment_with_ttl(
        &self,
        key: &str,
        delta: u64,
        initial: u64,
        ttl: Option<Duration>,
    ) -> Result<u64> {
        match ttl {
            None => self.increment(key, delta, initial).await,
            Some(_) => Err(Error::UnsupportedOperation(format!(
                "Expiring counter at {} is not supported by this store",
                key
            ))),
        }
    }

    /// Delete every key matching a glob pattern (`*` and `?`, `\\` escapes
    /// the next character).
    ///
    /// Best-effort and not atomic: keys written concurrently may survive.
    /// Returns the number of keys removed.
    ///
    /// # Errors
    /// `Error::UnsupportedOperation` on stores that cannot enumerate keys.
    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64>;

    /// Check if key exists.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Bulk get, results in input order.
    ///
    /// Default implementation issues up to [`MGET_CONCURRENCY`] concurrent
    /// `get` calls. Override when the backend has a native multi-get.
    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        let gets: Vec<_> = keys.iter().map(|key| self.get(key)).collect();
        futures::stream::iter(gets)
            .buffered(MGET_CONCURRENCY)
            .try_collect()
            .await
    }

    /// Bulk set sharing one TTL.
    ///
    /// Default implementation calls `set()` for each entry.
    async fn mset(&self, entries: Vec<(String, Vec<u8>)>, ttl: Option<Duration>) -> Result<()> {
        for (key, value) in entries {
            self.set(&key, value, ttl).await?;
        }
        Ok(())
    }

    /// Health check - verify the backend is reachable.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Parse a counter stored as ASCII decimal.
pub(crate) fn parse_counter(key: &str, bytes: &[u8]) -> Result<u64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| {
            Error::BackendError(format!("Value at {} is not a counter", key))
        })
}

/// Glob match supporting `*` (any run), `?` (one character) and `[...]`
/// classes with `a-z` ranges and `^` negation. A backslash makes the next
/// character literal.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = glob_tokens(pattern);
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while t < text.len() {
        let step = match pattern.get(p) {
            Some(Glob::One) => true,
            Some(Glob::Literal(c)) => *c == text[t],
            Some(Glob::Class { ranges, negated }) => {
                ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&text[t])) != *negated
            }
            _ => false,
        };

        if step {
            p += 1;
            t += 1;
        } else if pattern.get(p) == Some(&Glob::Any) {
            star = Some(p);
            mark = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|g| *g == Glob::Any)
}

/// Escape glob metacharacters so `text` only matches itself.
pub fn glob_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Glob {
    Any,
    One,
    Literal(char),
    Class {
        ranges: Vec<(char, char)>,
        negated: bool,
    },
}

fn glob_tokens(pattern: &str) -> Vec<Glob> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => tokens.push(Glob::Any),
            '?' => tokens.push(Glob::One),
            '\\' => {
                i += 1;
                tokens.push(Glob::Literal(chars.get(i).copied().unwrap_or('\\')));
            }
            '[' => match glob_class(&chars[i + 1..]) {
                Some((class, used)) => {
                    tokens.push(class);
                    i += used;
                }
                // unterminated, read as a plain '['
                None => tokens.push(Glob::Literal('[')),
            },
            c => tokens.push(Glob::Literal(c)),
        }
        i += 1;
    }

    tokens
}

/// Parse a class body following `[`; returns the class and the characters
/// consumed, closing `]` included.
fn glob_class(chars: &[char]) -> Option<(Glob, usize)> {
    let mut i = 0;
    let negated = chars.first() == Some(&'^');
    if negated {
        i += 1;
    }

    let mut ranges = Vec::new();
    while i < chars.len() {
        let lo = match chars[i] {
            ']' => return Some((Glob::Class { ranges, negated }, i + 1)),
            '\\' => {
                i += 1;
                *chars.get(i)?
            }
            c => c,
        };

        if chars.get(i + 1) == Some(&'-') && chars.get(i + 2).is_some_and(|c| *c != ']') {
            ranges.push((lo, chars[i + 2]));
            i += 3;
        } else {
            ranges.push((lo, lo));
            i += 1;
        }
    }

    None
}
