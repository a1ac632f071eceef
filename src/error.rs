//! Error types for the cache core.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the cache core.
///
/// Store and namespace operations surface these to their direct caller.
/// The batch orchestrator catches everything except loader failures and
/// degrades to an uncached load instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed duration text.
    ///
    /// Raised by [`crate::duration::parse_ttl`] and therefore by
    /// configuration loading. Not recoverable: fix the configuration.
    ParseError(String),

    /// The backend lacks the requested primitive.
    ///
    /// Memcached cannot enumerate keys and has no atomic
    /// "set if absent and return previous" primitive, so `delete_by_pattern`
    /// and `set_if_absent` report this there.
    ///
    /// **Recovery:** treat as a cache miss / no-op, never as fatal.
    UnsupportedOperation(String),

    /// Attempted to cache `None` in a namespace that does not cache nulls.
    NullNotAllowed(String),

    /// Backend storage error (Redis, Memcached, etc).
    ///
    /// Common causes:
    /// - Redis/Memcached connection lost
    /// - Network timeout
    /// - Backend protocol error
    ///
    /// **Recovery:** retry the operation or fall back to the loader.
    BackendError(String),

    /// Serialization failed when converting a value to cache bytes.
    SerializationError(String),

    /// Deserialization failed when converting cache bytes to a value.
    ///
    /// Also raised when a typed envelope carries a different type tag than
    /// the one requested.
    DeserializationError(String),

    /// Invalid configuration (missing servers, bad pool parameters, ...).
    ConfigError(String),

    /// The batch loader (source of truth) failed.
    LoaderError(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Whether the error only means "this backend cannot do that".
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::UnsupportedOperation(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ParseError(text) => write!(f, "Unable to parse '{}' into a duration", text),
            Error::UnsupportedOperation(msg) => write!(f, "Unsupported operation: {}", msg),
            Error::NullNotAllowed(name) => {
                write!(f, "Cache '{}' does not allow null values", name)
            }
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::LoaderError(msg) => write!(f, "Loader error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::BackendError(e.to_string())
        } else if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::BackendError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}
