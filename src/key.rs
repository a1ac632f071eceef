//! Cache key derivation.
//!
//! Final storage keys have the shape
//! `{prefix}{sep}{namespace}{sep}{version}{sep}{key}`. Empty components are
//! left out entirely, and keys longer than [`KEY_MAX_LENGTH`] characters are
//! replaced by their MD5 digest so backend key limits (250 bytes on
//! Memcached) are never hit.
//!
//! The output must be byte-identical across processes for identical input,
//! otherwise instances sharing a backend would stop seeing each other's
//! entries.

use crate::backend::glob_escape;
use std::fmt::Display;

/// Raw keys longer than this are hashed.
pub const KEY_MAX_LENGTH: usize = 50;

/// Default separator between key components.
pub const DEFAULT_SEPARATOR: &str = ":";

/// Reserved key segment holding a namespace's version counter.
pub const NAME_VERSION_KEY: &str = "name_version";

/// Build a final storage key from its components.
pub fn build_key(
    prefix: Option<&str>,
    namespace: Option<&str>,
    version: Option<&str>,
    raw_key: Option<&str>,
    separator: &str,
) -> String {
    let mut key = String::new();

    for part in [prefix, namespace, version].into_iter().flatten() {
        if !part.is_empty() {
            key.push_str(part);
            key.push_str(separator);
        }
    }

    if let Some(raw) = raw_key.filter(|raw| !raw.is_empty()) {
        if raw.chars().count() <= KEY_MAX_LENGTH {
            key.extend(raw.chars().filter(|c| !c.is_whitespace()));
        } else {
            key.push_str(&digest(raw));
        }
    }

    let key = key.trim();
    match key.strip_suffix(separator) {
        Some(stripped) if !separator.is_empty() => stripped.to_string(),
        _ => key.to_string(),
    }
}

/// Lower-case hex MD5 of the UTF-8 bytes of `raw`.
pub fn digest(raw: &str) -> String {
    format!("{:x}", md5::compute(raw.as_bytes()))
}

/// Key builder bound to one namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: Option<String>,
    namespace: Option<String>,
    separator: String,
}

impl KeyCodec {
    /// Codec for keys inside `namespace`.
    pub fn new(prefix: Option<&str>, namespace: &str, separator: &str) -> Self {
        KeyCodec {
            prefix: prefix.map(str::to_string),
            namespace: Some(namespace.to_string()),
            separator: separator.to_string(),
        }
    }

    /// Codec for plain `prefix:key` keys outside any namespace.
    pub fn plain(prefix: Option<&str>, separator: &str) -> Self {
        KeyCodec {
            prefix: prefix.map(str::to_string),
            namespace: None,
            separator: separator.to_string(),
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Versioned key for `raw_key`.
    pub fn build_key(&self, version: u64, raw_key: &dyn Display) -> String {
        let version = version.to_string();
        let raw = raw_key.to_string();
        build_key(
            self.prefix.as_deref(),
            self.namespace.as_deref(),
            Some(&version),
            Some(&raw),
            &self.separator,
        )
    }

    /// Key without a version segment.
    pub fn plain_key(&self, raw_key: &dyn Display) -> String {
        let raw = raw_key.to_string();
        build_key(
            self.prefix.as_deref(),
            self.namespace.as_deref(),
            None,
            Some(&raw),
            &self.separator,
        )
    }

    /// Key of the namespace version counter.
    ///
    /// It carries no version segment, so it can never collide with an entry
    /// key, which always does.
    pub fn version_key(&self) -> String {
        self.plain_key(&NAME_VERSION_KEY)
    }

    /// Globs matching every key of the namespace: the entries of all
    /// versions, then the version counter.
    ///
    /// Entry keys are matched on their numeric version segment, so the
    /// patterns for `users` leave a `users:vip` namespace alone. Names and
    /// prefixes are escaped; a namespace name that itself contains the
    /// separator followed by digits can still overlap another namespace.
    pub fn namespace_patterns(&self) -> [String; 2] {
        let base = build_key(
            self.prefix.as_deref(),
            self.namespace.as_deref(),
            None,
            None,
            &self.separator,
        );
        let entries = if base.is_empty() {
            "[0-9]*".to_string()
        } else {
            format!("{}{}[0-9]*", glob_escape(&base), glob_escape(&self.separator))
        };
        [entries, glob_escape(&self.version_key())]
    }
}
