//! Identifier types for relay quota metering.
//!
//! This module provides strongly-typed identifiers for users, API tokens,
//! upstream channels and consume-log records.
//!
//! # Macro-based ID Types
//!
//! The `int_id_type!` macro reduces boilerplate for the integer row identifiers
//! handed to us by the gateway's authentication and routing layer, so a token id
//! can never be passed where a user id is expected.

use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Wire form of an integer id: gateway clients send both `7` and `"7"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawIntId {
    Int(i64),
    Str(String),
}

/// Macro to define an integer identifier type with standard trait implementations.
///
/// This macro generates a newtype wrapper around `i64` with implementations for:
/// - `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `Serialize` (as a bare integer), `Deserialize` (from an integer or a numeric string)
/// - `FromStr`, `Display`, `Debug`
/// - `From<i64>`
///
/// # Example
///
/// ```ignore
/// int_id_type!(MyId, "A custom identifier type.");
/// let id = MyId::new(7);
/// let parsed: MyId = "7".parse().unwrap();
/// ```
macro_rules! int_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                match RawIntId::deserialize(deserializer)? {
                    RawIntId::Int(id) => Ok(Self(id)),
                    RawIntId::Str(s) => s.parse().map_err(de::Error::custom),
                }
            }
        }

        impl $name {
            /// Create a new identifier from a raw row id.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Return the raw row id.
            #[must_use]
            pub const fn get(&self) -> i64 {
                self.0
            }

            /// Return the big-endian bytes of the id (8 bytes).
            #[must_use]
            pub const fn to_be_bytes(&self) -> [u8; 8] {
                self.0.to_be_bytes()
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<i64>()
                    .map(Self)
                    .map_err(|_| IdError::InvalidInteger)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

int_id_type!(
    UserId,
    "A user (account) identifier.\n\nThe cached balance and usage counters are keyed by it."
);
int_id_type!(
    TokenId,
    "An API token (credential) identifier.\n\nThe ledger pre-consumes and post-consumes against it."
);
int_id_type!(
    ChannelId,
    "An upstream channel identifier.\n\nChannels accumulate their own used-quota counter."
);

/// A consume-log identifier using ULID for time-ordering.
///
/// Log ids sort chronologically, so a ledger can range-scan recent usage.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConsumeLogId(Ulid);

impl ConsumeLogId {
    /// Generate a new `ConsumeLogId` with the current timestamp.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Return the bytes of the ULID (16 bytes).
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 16] {
        self.0.to_bytes()
    }
}

impl FromStr for ConsumeLogId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = Ulid::from_string(s).map_err(|_| IdError::InvalidUlid)?;
        Ok(Self(ulid))
    }
}

impl fmt::Debug for ConsumeLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsumeLogId({})", self.0)
    }
}

impl fmt::Display for ConsumeLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ConsumeLogId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConsumeLogId> for String {
    fn from(id: ConsumeLogId) -> Self {
        id.0.to_string()
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid integer id.
    #[error("invalid integer id")]
    InvalidInteger,

    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_parses_and_displays() {
        let id: UserId = " 42 ".parse().unwrap();
        assert_eq!(id, UserId::new(42));
        assert_eq!(id.to_string(), "42");
        assert_eq!(format!("{id:?}"), "UserId(42)");
    }

    #[test]
    fn token_id_rejects_garbage() {
        assert_eq!("tok-1".parse::<TokenId>(), Err(IdError::InvalidInteger));
    }

    #[test]
    fn channel_id_serializes_as_integer() {
        let json = serde_json::to_string(&ChannelId::new(9)).unwrap();
        assert_eq!(json, "9");
        let parsed: ChannelId = serde_json::from_str("9").unwrap();
        assert_eq!(parsed.get(), 9);
    }

    #[test]
    fn int_ids_deserialize_from_numeric_strings() {
        let parsed: UserId = serde_json::from_str(r#""7""#).unwrap();
        assert_eq!(parsed, UserId::new(7));
        let parsed: TokenId = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, TokenId::new(7));

        assert!(serde_json::from_str::<ChannelId>(r#""seven""#).is_err());
        assert!(serde_json::from_str::<ChannelId>("true").is_err());
    }

    #[test]
    fn consume_log_id_serializes_as_string() {
        let id = ConsumeLogId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.starts_with('"'));
        let parsed: ConsumeLogId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
