//! Human-readable expiration parsing.
//!
//! Namespace TTLs are configured as short strings: `"10m"`, `"500ms"`, `"1d"`.
//! A leading `-` (conventionally `"-1"`) means the entry never expires.
//!
//! ```
//! use cluster_cache::duration::{parse_ttl, Ttl};
//! use std::time::Duration;
//!
//! assert_eq!(parse_ttl("10ms").unwrap(), Ttl::After(Duration::from_millis(10)));
//! assert_eq!(parse_ttl("-1").unwrap(), Ttl::Never);
//! assert!(parse_ttl("10x").is_err());
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Unit suffixes, longest first so `ms`/`ns` are never read as `s`.
const UNITS: [(&str, u64); 6] = [
    ("ns", 0),
    ("ms", 0),
    ("s", 1),
    ("m", 60),
    ("h", 3_600),
    ("d", 86_400),
];

/// Expiration of a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ttl {
    /// No expiration.
    Never,
    /// Expire after the given duration.
    After(Duration),
}

impl Ttl {
    /// Expiration to hand to a store; `None` means "do not set one".
    ///
    /// A zero duration is treated like [`Ttl::Never`], matching Redis and
    /// Memcached where a zero expiry disables expiration.
    pub fn expiry(&self) -> Option<Duration> {
        match self {
            Ttl::Never => None,
            Ttl::After(d) if d.is_zero() => None,
            Ttl::After(d) => Some(*d),
        }
    }

    pub fn is_never(&self) -> bool {
        self.expiry().is_none()
    }
}

impl Default for Ttl {
    /// One hour.
    fn default() -> Self {
        Ttl::After(Duration::from_secs(3_600))
    }
}

impl From<Duration> for Ttl {
    fn from(d: Duration) -> Self {
        Ttl::After(d)
    }
}

/// Parse an expiration string into a [`Ttl`].
///
/// # Errors
///
/// Returns `Error::ParseError` carrying the offending text when the suffix is
/// missing or unknown, the magnitude is not a 64-bit integer, or the
/// resulting duration overflows.
pub fn parse_ttl(text: &str) -> Result<Ttl> {
    if text.starts_with('-') {
        return Ok(Ttl::Never);
    }

    let lower = text.to_ascii_lowercase();
    let parse_error = || Error::ParseError(text.to_string());

    let (suffix, secs_per_unit) = UNITS
        .iter()
        .find(|(suffix, _)| lower.ends_with(suffix))
        .ok_or_else(parse_error)?;

    let magnitude: u64 = lower[..lower.len() - suffix.len()]
        .parse()
        .map_err(|_| parse_error())?;

    let duration = match *suffix {
        "ns" => Duration::from_nanos(magnitude),
        "ms" => Duration::from_millis(magnitude),
        _ => magnitude
            .checked_mul(*secs_per_unit)
            .map(Duration::from_secs)
            .ok_or_else(parse_error)?,
    };

    Ok(Ttl::After(duration))
}

impl FromStr for Ttl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_ttl(s)
    }
}

impl fmt::Display for Ttl {
    /// Canonical form using the largest unit that divides the duration.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = match self {
            Ttl::Never => return write!(f, "-1"),
            Ttl::After(d) => *d,
        };

        if d.subsec_nanos() == 0 {
            let secs = d.as_secs();
            for (suffix, unit) in [("d", 86_400), ("h", 3_600), ("m", 60)] {
                if secs != 0 && secs % unit == 0 {
                    return write!(f, "{}{}", secs / unit, suffix);
                }
            }
            return write!(f, "{}s", secs);
        }

        if d.subsec_nanos() % 1_000_000 == 0 {
            write!(f, "{}ms", d.as_millis())
        } else {
            write!(f, "{}ns", d.as_nanos())
        }
    }
}

impl Serialize for Ttl {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ttl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_ttl(&text).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Duration` fields written as duration text (`"5s"`).
///
/// Use with `#[serde(with = "cluster_cache::duration::text")]`. A never
/// expiring value is rejected since the field needs a finite duration.
pub mod text {
    use super::{parse_ttl, Ttl};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&Ttl::After(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        match parse_ttl(&text).map_err(serde::de::Error::custom)? {
            Ttl::After(d) => Ok(d),
            Ttl::Never => Err(serde::de::Error::custom(format!(
                "'{}' is not a finite duration",
                text
            ))),
        }
    }
}
