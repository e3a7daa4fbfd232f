//! Asset identity: stable 128-bit ids rendered as 32 lowercase hex digits

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

/// Number of hex digits in the textual form of an id
pub const ID_HEX_LEN: usize = 32;

/// A stable asset identifier that survives renames and moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(u128);

impl AssetId {
    /// Create a fresh id for an asset that has none yet
    pub fn generate() -> Self {
        Self(u128::from(Ulid::new()))
    }

    /// Create an id from its raw value
    pub fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// The raw 128-bit value
    pub fn as_u128(&self) -> u128 {
        self.0
    }

    /// Parse an id from its hex form
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        s.parse()
    }

    /// Whether a string looks like an id (used to tell ids from paths on the command line)
    pub fn is_id_like(s: &str) -> bool {
        s.len() == ID_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for AssetId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != ID_HEX_LEN {
            return Err(IdParseError::InvalidLength(s.to_string()));
        }
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| IdParseError::InvalidHex(s.to_string()))
    }
}

impl Serialize for AssetId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing asset ids
#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("invalid asset id '{0}': expected 32 hex digits")]
    InvalidLength(String),

    #[error("invalid asset id '{0}': not a hex number")]
    InvalidHex(String),
}
