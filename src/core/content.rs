//! Asset content access
//!
//! The graph store and the replacement engine never touch the filesystem
//! directly; they go through a [`ContentStore`] so tests can run against an
//! in-memory tree.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use miette::Diagnostic;
use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::codec::write_atomic;
use crate::core::identity::AssetId;

/// Sidecar extension holding an asset's id
pub const META_EXTENSION: &str = "meta";

/// Read/write access to asset bytes by project-relative path
pub trait ContentStore {
    /// Read the full content of an asset
    fn read(&self, path: &str) -> Result<Vec<u8>, ContentError>;

    /// Replace the content of an asset
    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), ContentError>;

    /// Whether an asset exists at the path
    fn exists(&self, path: &str) -> bool;

    /// Delete an asset together with its sidecar
    fn delete(&self, path: &str) -> Result<(), ContentError>;
}

/// Content IO failures
#[derive(Debug, Error, Diagnostic)]
pub enum ContentError {
    #[error("asset not found: {0}")]
    #[diagnostic(code(refmerge::content::not_found))]
    NotFound(String),

    #[error("failed to access {path}: {source}")]
    #[diagnostic(code(refmerge::content::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Content store over the project directory
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn io_error(path: &str, source: std::io::Error) -> ContentError {
        if source.kind() == std::io::ErrorKind::NotFound {
            ContentError::NotFound(path.to_string())
        } else {
            ContentError::Io {
                path: path.to_string(),
                source,
            }
        }
    }
}

impl ContentStore for FsContentStore {
    fn read(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        std::fs::read(self.full_path(path)).map_err(|e| Self::io_error(path, e))
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), ContentError> {
        write_atomic(&self.full_path(path), bytes).map_err(|e| Self::io_error(path, e))
    }

    fn exists(&self, path: &str) -> bool {
        self.full_path(path).is_file()
    }

    fn delete(&self, path: &str) -> Result<(), ContentError> {
        let full = self.full_path(path);
        std::fs::remove_file(&full).map_err(|e| Self::io_error(path, e))?;
        let meta = meta_path(&full);
        if meta.exists() {
            std::fs::remove_file(&meta).map_err(|e| Self::io_error(path, e))?;
        }
        Ok(())
    }
}

/// Path of the sidecar for an asset file
pub fn meta_path(asset: &Path) -> PathBuf {
    let mut s = asset.as_os_str().to_owned();
    s.push(".");
    s.push(META_EXTENSION);
    PathBuf::from(s)
}

/// Compute SHA256 hash of content
pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"guid:\s*([0-9a-fA-F]{32})\b").expect("reference pattern is valid")
    })
}

/// Extract the ids an asset references, in first-occurrence order without duplicates
///
/// References are `guid: <32 hex>` tokens. Content that is not UTF-8 has none.
pub fn extract_dependencies(content: &[u8]) -> Vec<AssetId> {
    let Ok(text) = std::str::from_utf8(content) else {
        return Vec::new();
    };
    let mut seen = std::collections::HashSet::new();
    reference_pattern()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| AssetId::parse(m.as_str()).ok())
        .filter(|id| seen.insert(*id))
        .collect()
}
