//! JSON value serialization with a shared null sentinel.
//!
//! Two interchangeable formats are supported, picked by configuration:
//!
//! - [`SerialFormat::Json`]: the plain `serde_json` encoding of the value.
//! - [`SerialFormat::TypedJson`]: the value wrapped in an envelope carrying
//!   its type name, for stores shared by heterogeneous payloads:
//!
//! ```text
//! {"@type":"my_app::User","value":{"id":1,"name":"Alice"}}
//! ```
//!
//! The tag is the Rust type path with borrows dropped and `str`/`[T]`
//! normalised to `String`/`Vec<T>`, so a value written as `&str` reads back
//! as `String`. Type paths are not guaranteed stable across compiler
//! versions; readers treat a tag mismatch as a miss, never as a wrong hit.
//!
//! Both formats write "confirmed absent" as the same fixed bytes,
//! [`NULL_SENTINEL`], so a reader can recognise it without knowing the value
//! type or the format the writer used.
//!
//! # Example
//!
//! ```rust
//! use cluster_cache::serialization::SerialFormat;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! # fn main() -> cluster_cache::Result<()> {
//! let user = User { id: 1, name: "Alice".to_string() };
//!
//! let bytes = SerialFormat::TypedJson.encode(&user)?;
//! let decoded: Option<User> = SerialFormat::TypedJson.decode(&bytes)?;
//! assert_eq!(decoded, Some(user));
//!
//! let null = SerialFormat::Json.encode_null();
//! assert_eq!(SerialFormat::TypedJson.decode::<User>(&null)?, None);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Bytes stored for a cached "confirmed absent" result.
pub const NULL_SENTINEL: &[u8] = br#"{"@class":"NullValue"}"#;

/// Whether `bytes` is the null sentinel.
pub fn is_null_sentinel(bytes: &[u8]) -> bool {
    bytes == NULL_SENTINEL
}

/// Wire format for cached values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerialFormat {
    /// Plain JSON.
    #[default]
    Json,
    /// JSON wrapped in a [`TypedEnvelope`].
    TypedJson,
}

/// Envelope used by [`SerialFormat::TypedJson`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TypedEnvelope<T> {
    /// Payload type tag, see [`type_tag`]
    #[serde(rename = "@type")]
    pub type_name: String,
    /// The cached value
    pub value: T,
}

impl SerialFormat {
    /// Serialize a value for cache storage.
    ///
    /// # Errors
    ///
    /// Returns `Error::SerializationError` if `serde_json` fails or if the
    /// encoding happens to equal [`NULL_SENTINEL`].
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let bytes = match self {
            SerialFormat::Json => serde_json::to_vec(value),
            SerialFormat::TypedJson => serde_json::to_vec(&TypedEnvelope {
                type_name: type_tag::<T>(),
                value,
            }),
        }
        .map_err(|e| {
            error!("Cache serialization failed: {}", e);
            Error::SerializationError(e.to_string())
        })?;

        if is_null_sentinel(&bytes) {
            return Err(Error::SerializationError(
                "value encodes to the reserved null sentinel".to_string(),
            ));
        }

        Ok(bytes)
    }

    /// Bytes for a cached null.
    pub fn encode_null(&self) -> Vec<u8> {
        NULL_SENTINEL.to_vec()
    }

    /// Deserialize cached bytes; `Ok(None)` for the null sentinel.
    ///
    /// # Errors
    ///
    /// - `Error::DeserializationError`: malformed JSON, or a typed envelope
    ///   whose tag names another type
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Option<T>> {
        if is_null_sentinel(bytes) {
            return Ok(None);
        }

        match self {
            SerialFormat::Json => serde_json::from_slice(bytes).map(Some).map_err(|e| {
                warn!("Cache deserialization failed: {}", e);
                Error::DeserializationError(e.to_string())
            }),
            SerialFormat::TypedJson => {
                let envelope: TypedEnvelope<serde_json::Value> = serde_json::from_slice(bytes)
                    .map_err(|e| {
                        warn!("Cache envelope deserialization failed: {}", e);
                        Error::DeserializationError(e.to_string())
                    })?;

                let expected = type_tag::<T>();
                if envelope.type_name != expected {
                    warn!(
                        "Cache type mismatch: expected {}, got {}",
                        expected, envelope.type_name
                    );
                    return Err(Error::DeserializationError(format!(
                        "type mismatch: expected {}, found {}",
                        expected, envelope.type_name
                    )));
                }

                serde_json::from_value(envelope.value).map(Some).map_err(|e| {
                    warn!("Cache deserialization failed: {}", e);
                    Error::DeserializationError(e.to_string())
                })
            }
        }
    }
}

/// Tag written into a [`TypedEnvelope`] for values of type `T`.
///
/// Borrowed and owned forms that serialize identically share a tag:
/// `&T` is tagged as `T`, `str` as `alloc::string::String` and `[T]` as
/// `alloc::vec::Vec<T>`.
pub fn type_tag<T: ?Sized>() -> String {
    let mut name = std::any::type_name::<T>();
    while let Some(rest) = name.strip_prefix('&') {
        name = rest.strip_prefix("mut ").unwrap_or(rest);
    }

    if name == "str" {
        return "alloc::string::String".to_string();
    }
    if let Some(inner) = name.strip_prefix('[').and_then(|n| n.strip_suffix(']')) {
        if !inner.contains(';') {
            return format!("alloc::vec::Vec<{}>", inner);
        }
    }
    name.to_string()
}
