//! Session PIN generation and parsing
//!
//! This module provides the short numeric identifier players enter to join
//! a live session. PINs are fixed-length six-digit decimal numbers so they
//! are easy to read out loud and type on a phone keyboard.

use std::{fmt::Display, num::ParseIntError, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};

/// Minimum value for generated PINs (inclusive)
const MIN_VALUE: u32 = 100_000;
/// Maximum value for generated PINs (exclusive)
const MAX_VALUE: u32 = 1_000_000;

/// A six-digit numeric identifier for a live session
///
/// PINs are generated randomly within the six-digit decimal range.
/// Uniqueness among live sessions is the registry's responsibility;
/// the type itself only guarantees the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pin(u32);

impl Pin {
    /// Creates a new random PIN
    ///
    /// The value is drawn uniformly from the six-digit decimal range so it
    /// always displays as exactly six digits.
    pub fn new() -> Self {
        Self(fastrand::u32(MIN_VALUE..MAX_VALUE))
    }
}

impl Default for Pin {
    /// Creates a new random PIN (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Pin {
    /// Formats the PIN as a six-digit decimal number
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl Serialize for Pin {
    /// Serializes the PIN as a decimal string
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pin {
    /// Deserializes a PIN from a decimal string
    fn deserialize<D>(deserializer: D) -> Result<Pin, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Pin::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing a PIN from a string
#[derive(Debug, thiserror::Error)]
pub enum ParsePinError {
    /// The string is not a decimal number
    #[error(transparent)]
    NotANumber(#[from] ParseIntError),
    /// The number is outside the six-digit range
    #[error("pin must be a six-digit number")]
    OutOfRange,
}

impl FromStr for Pin {
    type Err = ParsePinError;

    /// Parses a PIN from its six-digit decimal representation
    ///
    /// # Errors
    ///
    /// Returns [`ParsePinError`] if the string is not a decimal number or
    /// falls outside the six-digit range.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s.parse()?;
        if (MIN_VALUE..MAX_VALUE).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ParsePinError::OutOfRange)
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_pin_new_in_range() {
        for _ in 0..100 {
            let pin = Pin::new();
            assert!(pin.0 >= MIN_VALUE);
            assert!(pin.0 < MAX_VALUE);
        }
    }

    #[test]
    fn test_pin_display_is_six_digits() {
        let pin = Pin(MIN_VALUE);
        assert_eq!(pin.to_string(), "100000");

        let pin = Pin(MAX_VALUE - 1);
        assert_eq!(pin.to_string(), "999999");
    }

    #[test]
    fn test_pin_from_str() {
        let pin = Pin::from_str("123456").unwrap();
        assert_eq!(pin.0, 123_456);

        let pin = Pin::from_str("100000").unwrap();
        assert_eq!(pin.0, MIN_VALUE);
    }

    #[test]
    fn test_pin_from_str_invalid() {
        assert!(Pin::from_str("not-a-pin").is_err());
        assert!(Pin::from_str("").is_err());
        // Too short and too long are both out of range
        assert!(matches!(
            Pin::from_str("99999"),
            Err(ParsePinError::OutOfRange)
        ));
        assert!(matches!(
            Pin::from_str("1000000"),
            Err(ParsePinError::OutOfRange)
        ));
    }

    #[test]
    fn test_pin_serialization_round_trip() {
        let pin = Pin(654_321);
        let serialized = serde_json::to_string(&pin).unwrap();
        assert_eq!(serialized, "\"654321\"");

        let deserialized: Pin = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, pin);
    }

    #[test]
    fn test_pin_deserialization_rejects_numbers() {
        let result: Result<Pin, _> = serde_json::from_str("123456");
        assert!(result.is_err());
    }

    #[test]
    fn test_pin_hash_equality() {
        use std::collections::HashMap;

        let a = Pin(123_456);
        let b = Pin(123_456);
        let c = Pin(654_321);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut map = HashMap::new();
        map.insert(a, "first");
        map.insert(c, "second");
        assert_eq!(map.get(&b), Some(&"first"));
    }
}
