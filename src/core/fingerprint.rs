//! Image fingerprints and their comparison
//!
//! Fingerprints are produced outside this crate and read from
//! `.refmerge/fingerprints.json`:
//!
//! ```json
//! {
//!   "0f3c...": { "hash": "0110...", "histogram": [0.0, 0.25, ...] }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::identity::AssetId;

/// Distance reported when either hash is empty
pub const EMPTY_HASH_DISTANCE: u32 = 32;

/// Longest supported perceptual hash
pub const MAX_HASH_BITS: usize = 64;

/// Fixed-length bit string, most significant bit first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerceptualHash {
    bits: u64,
    len: u8,
}

impl PerceptualHash {
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bit(&self, i: usize) -> bool {
        (self.bits >> (self.len() - 1 - i)) & 1 == 1
    }
}

impl FromStr for PerceptualHash {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > MAX_HASH_BITS {
            return Err(FingerprintError::InvalidHash(s.to_string()));
        }
        let mut bits = 0u64;
        for c in s.chars() {
            bits = (bits << 1)
                | match c {
                    '0' => 0,
                    '1' => 1,
                    _ => return Err(FingerprintError::InvalidHash(s.to_string())),
                };
        }
        Ok(Self {
            bits,
            len: s.len() as u8,
        })
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.len() {
            f.write_str(if self.bit(i) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl Serialize for PerceptualHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PerceptualHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Normalized color histogram
pub type Histogram = Vec<f64>;

/// Everything needed to compare two images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub hash: PerceptualHash,
    pub histogram: Histogram,
}

/// Number of differing bits
///
/// Bits present in only the longer hash count as different.
pub fn hamming_distance(a: &PerceptualHash, b: &PerceptualHash) -> u32 {
    if a.is_empty() || b.is_empty() {
        return EMPTY_HASH_DISTANCE;
    }
    let common = a.len().min(b.len());
    let differing = (0..common).filter(|&i| a.bit(i) != b.bit(i)).count();
    (differing + a.len().max(b.len()) - common) as u32
}

/// Bhattacharyya coefficient, 1.0 for identical distributions
pub fn bhattacharyya(p: &[f64], q: &[f64]) -> f64 {
    p.iter().zip(q).map(|(a, b)| (a * b).sqrt()).sum()
}

/// How confident a match is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    /// Both the hash and the histogram pass
    High,
    /// Exactly one passes
    Low,
    None,
}

/// Pass criteria for a match
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Hash distance must be strictly below this
    pub max_hash_distance: u32,
    /// Histogram similarity must be at least this
    pub min_histogram_similarity: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_hash_distance: 3,
            min_histogram_similarity: 0.9,
        }
    }
}

impl Thresholds {
    pub fn classify(&self, hash_distance: u32, histogram_similarity: f64) -> MatchConfidence {
        let hash_pass = hash_distance < self.max_hash_distance;
        let histogram_pass = histogram_similarity >= self.min_histogram_similarity;
        match (hash_pass, histogram_pass) {
            (true, true) => MatchConfidence::High,
            (true, false) | (false, true) => MatchConfidence::Low,
            (false, false) => MatchConfidence::None,
        }
    }

    pub fn compare(&self, a: &Fingerprint, b: &Fingerprint) -> Comparison {
        let hash_distance = hamming_distance(&a.hash, &b.hash);
        let histogram_similarity = bhattacharyya(&a.histogram, &b.histogram);
        Comparison {
            hash_distance,
            histogram_similarity,
            confidence: self.classify(hash_distance, histogram_similarity),
        }
    }
}

/// Scores of one comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub hash_distance: u32,
    pub histogram_similarity: f64,
    pub confidence: MatchConfidence,
}

/// Source of fingerprints by asset id
pub trait FingerprintProvider {
    /// Fingerprint of an asset, if one is available
    fn get_or_compute(&self, id: AssetId) -> Option<Fingerprint>;
}

#[derive(Debug, Error, Diagnostic)]
pub enum FingerprintError {
    #[error("invalid perceptual hash '{0}': expected up to 64 '0' or '1' characters")]
    #[diagnostic(code(refmerge::fingerprint::invalid_hash))]
    InvalidHash(String),

    #[error("no fingerprint for {0}")]
    #[diagnostic(
        code(refmerge::fingerprint::missing),
        help("add the asset to .refmerge/fingerprints.json")
    )]
    Missing(String),

    #[error("failed to read fingerprints from {path}: {message}")]
    #[diagnostic(
        code(refmerge::fingerprint::read),
        help("fingerprints.json maps asset ids to objects with a hash and a histogram")
    )]
    Read { path: PathBuf, message: String },
}

/// Precomputed fingerprints loaded from JSON
#[derive(Debug, Default)]
pub struct JsonFingerprintStore {
    entries: HashMap<AssetId, Fingerprint>,
}

impl JsonFingerprintStore {
    /// Load the store; a missing file is an empty store
    pub fn open(path: &Path) -> Result<Self, FingerprintError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no fingerprints at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(FingerprintError::Read {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        let entries = serde_json::from_str(&contents).map_err(|e| FingerprintError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self { entries })
    }

    pub fn insert(&mut self, id: AssetId, fingerprint: Fingerprint) {
        self.entries.insert(id, fingerprint);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FingerprintProvider for JsonFingerprintStore {
    fn get_or_compute(&self, id: AssetId) -> Option<Fingerprint> {
        self.entries.get(&id).cloned()
    }
}
