//! Opaque 128-bit identifiers shared by every entity in the data model.

use rand::RngCore;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 128-bit identifier rendered as 32 lowercase hex characters.
///
/// Every Pool/Endpoint/Snapshot/Operation/Repository id uses this single
/// type so the storage layer never has to special-case id generation
/// between the Postgres and SQLite drivers (both store it as `TEXT`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(u128);

impl Id {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let hi = rng.next_u64() as u128;
        let lo = rng.next_u64() as u128;
        Id((hi << 64) | lo)
    }

    pub fn as_u128(self) -> u128 {
        self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid id: {0}")]
pub struct ParseIdError(String);

impl FromStr for Id {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseIdError(s.to_string()));
        }
        let value = u128::from_str_radix(s, 16).map_err(|_| ParseIdError(s.to_string()))?;
        Ok(Id(value))
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Id::from_str(&raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let id = Id::new();
        let rendered = id.to_string();
        assert_eq!(rendered.len(), 32);
        let parsed: Id = rendered.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn round_trips_through_json() {
        let id = Id::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: Id = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!("not-hex".parse::<Id>().is_err());
        assert!("abc".parse::<Id>().is_err());
    }

    #[test]
    fn distinct_ids_are_not_equal() {
        assert_ne!(Id::new(), Id::new());
    }
}
