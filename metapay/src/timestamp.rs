//! Unix timestamp utilities for request expiry.
//!
//! This module provides the [`UnixTimestamp`] type used for the `deadline` of a
//! [`ForwardRequest`](crate::types::ForwardRequest): the absolute point in time
//! after which a signed instruction is void and must not be relayed.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::SystemTime;

/// A Unix timestamp representing seconds since the Unix epoch (1970-01-01T00:00:00Z).
///
/// # Serialization
///
/// Serialized as a stringified integer to avoid loss of precision in JSON, since
/// `JavaScript`'s `Number` type cannot safely represent all 64-bit integers.
///
/// ```json
/// "1699999999"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnixTimestamp(u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(serde::de::Error::custom(
                "timestamp must be a string of decimal digits",
            ));
        }
        let ts = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp does not fit in 64 bits"))?;
        Ok(Self(ts))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.saturating_add(rhs))
    }
}

impl UnixTimestamp {
    /// Creates a new [`UnixTimestamp`] from a raw seconds value.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns the current system time as a [`UnixTimestamp`].
    ///
    /// # Panics
    ///
    /// Panics if the system clock is set to a time before the Unix epoch,
    /// which should never happen on properly configured systems.
    #[must_use]
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("SystemTime before UNIX epoch?!?")
            .as_secs();
        Self(now)
    }

    /// Returns the timestamp as raw seconds since the Unix epoch.
    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Adds `secs` seconds, returning `None` on overflow.
    #[must_use]
    pub const fn checked_add_secs(self, secs: u64) -> Option<Self> {
        match self.0.checked_add(secs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Returns `true` if this deadline has passed at `now`.
    ///
    /// A deadline equal to `now` is still valid.
    #[must_use]
    pub fn is_expired_at(&self, now: Self) -> bool {
        *self < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_decimal_string() {
        let ts = UnixTimestamp::from_secs(1_699_999_999);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "\"1699999999\"");
    }

    #[test]
    fn test_rejects_non_digit_strings() {
        assert!(serde_json::from_str::<UnixTimestamp>("\"-1\"").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("\"12a\"").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("\"\"").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("123").is_err());
    }

    #[test]
    fn test_rejects_overflowing_values() {
        let too_big = format!("\"{}0\"", u64::MAX);
        assert!(serde_json::from_str::<UnixTimestamp>(&too_big).is_err());
    }

    #[test]
    fn test_expiry_boundary() {
        let now = UnixTimestamp::from_secs(1_000);
        assert!(!UnixTimestamp::from_secs(1_000).is_expired_at(now));
        assert!(UnixTimestamp::from_secs(999).is_expired_at(now));
        assert!(!UnixTimestamp::from_secs(1_001).is_expired_at(now));
    }

    #[test]
    fn test_checked_add_overflow() {
        assert!(UnixTimestamp::from_secs(u64::MAX).checked_add_secs(1).is_none());
        assert_eq!(
            UnixTimestamp::from_secs(10).checked_add_secs(600),
            Some(UnixTimestamp::from_secs(610))
        );
    }
}
