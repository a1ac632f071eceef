//! Cache configuration.
//!
//! Settings are plain serde structs so they can come from any config source;
//! [`CacheSettings::from_json`] covers the common case:
//!
//! ```
//! use cluster_cache::config::CacheSettings;
//!
//! let settings = CacheSettings::from_json(r#"{
//!     "key_prefix": "app",
//!     "default_ttl": "30m",
//!     "namespaces": { "users": "10m", "sessions": "-1" }
//! }"#).unwrap();
//!
//! assert_eq!(settings.key_separator, ":");
//! assert!(settings.cache_null_values);
//! ```
//!
//! Durations are kept as text and parsed by [`CacheSettings::validate`],
//! which [`crate::manager::CacheManager::new`] runs before anything else, so
//! a malformed TTL fails at startup with `Error::ParseError`.

use crate::backend::BackendSettings;
use crate::duration::{parse_ttl, Ttl};
use crate::error::{Error, Result};
use crate::key::DEFAULT_SEPARATOR;
use crate::namespace::{NamespaceConfig, VersionPolicy};
use crate::pool::BackfillSettings;
use crate::serialization::SerialFormat;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Top-level cache configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Prepended to every key; `None` or empty leaves it out.
    pub key_prefix: Option<String>,
    pub key_separator: String,
    pub cache_null_values: bool,
    /// TTL for namespaces without an explicit entry in `namespaces`.
    pub default_ttl: String,
    pub serial_format: SerialFormat,
    pub version_policy: VersionPolicy,
    /// Namespaces known up front, name -> TTL text.
    pub namespaces: BTreeMap<String, String>,
    pub backend: BackendSettings,
    pub backfill: BackfillSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            key_prefix: None,
            key_separator: DEFAULT_SEPARATOR.to_string(),
            cache_null_values: true,
            default_ttl: "1h".to_string(),
            serial_format: SerialFormat::default(),
            version_policy: VersionPolicy::default(),
            namespaces: BTreeMap::new(),
            backend: BackendSettings::default(),
            backfill: BackfillSettings::default(),
        }
    }
}

impl CacheSettings {
    /// Parse settings from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    /// - `Error::ConfigError`: malformed JSON or unknown backend type
    /// - `Error::ParseError`: a malformed TTL
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: CacheSettings = serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("Invalid cache settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check every duration and size, and that no configured namespace
    /// name contains the key separator.
    pub fn validate(&self) -> Result<()> {
        if self.key_separator.is_empty() {
            return Err(Error::ConfigError("key_separator must not be empty".to_string()));
        }
        if let Some(name) = self
            .namespaces
            .keys()
            .find(|name| name.contains(self.key_separator.as_str()))
        {
            return Err(Error::ConfigError(format!(
                "Namespace '{}' contains the key separator '{}'",
                name, self.key_separator
            )));
        }
        self.default_ttl()?;
        self.namespace_ttls()?;
        self.backfill.validate()
    }

    pub fn default_ttl(&self) -> Result<Ttl> {
        parse_ttl(&self.default_ttl)
    }

    /// Parsed `namespaces` hints, in name order.
    pub fn namespace_ttls(&self) -> Result<Vec<(String, Ttl)>> {
        self.namespaces
            .iter()
            .map(|(name, ttl)| -> Result<(String, Ttl)> { Ok((name.clone(), parse_ttl(ttl)?)) })
            .collect()
    }

    /// Namespace settings derived from the global ones.
    pub fn namespace_config(&self, ttl: Ttl) -> NamespaceConfig {
        NamespaceConfig {
            prefix: self.key_prefix.clone().filter(|p| !p.is_empty()),
            separator: self.key_separator.clone(),
            ttl,
            cache_null_values: self.cache_null_values,
            serial_format: self.serial_format,
            version_policy: self.version_policy,
        }
    }
}
