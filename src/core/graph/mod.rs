//! Asset dependency graph with a persisted binary snapshot
//!
//! This module provides the graph store that:
//! - Records, for every asset, the ids its content references
//! - Derives the inverse back-reference sets used by where-used queries
//! - Rebuilds from content, reusing edges of assets whose hash is unchanged
//! - Applies add/delete/move notifications incrementally
//! - Persists a compact versioned snapshot under .refmerge/
//!
//! The snapshot is a cache. A missing, outdated, or damaged snapshot is
//! never an error: the store reports a miss and the caller rebuilds.

mod snapshot;
mod sync;

pub use snapshot::{decode_snapshot, encode_snapshot, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
pub use sync::{PathChanges, RebuildOptions, RebuildOutcome, RebuildTask, SyncStats};

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::core::codec::{write_atomic, DecodeError};
use crate::core::content::ContentError;
use crate::core::identity::AssetId;

/// Display state of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetState {
    /// Content matches the recorded hash
    Normal,
    /// Content changed since the graph was built
    Changed,
    /// No file behind the id (deleted or never scanned)
    Missing,
    /// Known to the resolver but never scanned into the graph
    NoData,
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetState::Normal => write!(f, "normal"),
            AssetState::Changed => write!(f, "changed"),
            AssetState::Missing => write!(f, "missing"),
            AssetState::NoData => write!(f, "no-data"),
        }
    }
}

/// One asset in the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetNode {
    pub id: AssetId,
    pub path: String,
    pub content_hash: String,
    /// Ids this asset references, in first-occurrence order
    pub dependencies: Vec<AssetId>,
    /// Ids of assets that reference this one (derived)
    pub back_references: BTreeSet<AssetId>,
    pub state: AssetState,
}

impl AssetNode {
    pub fn new(id: AssetId, path: String, content_hash: String, dependencies: Vec<AssetId>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let dependencies = dependencies
            .into_iter()
            .filter(|d| seen.insert(*d))
            .collect();
        Self {
            id,
            path,
            content_hash,
            dependencies,
            back_references: BTreeSet::new(),
            state: AssetState::Normal,
        }
    }

    /// Placeholder for an id the resolver knows but the graph never scanned
    pub fn placeholder(id: AssetId, path: String) -> Self {
        Self {
            state: AssetState::NoData,
            ..Self::new(id, path, String::new(), Vec::new())
        }
    }
}

/// Node map plus a path index
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashMap<AssetId, AssetNode>,
    by_path: HashMap<String, AssetId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: AssetId) -> Option<&AssetNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: AssetId) -> Option<&mut AssetNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn id_at(&self, path: &str) -> Option<AssetId> {
        self.by_path.get(path).copied()
    }

    pub fn node_at(&self, path: &str) -> Option<&AssetNode> {
        self.id_at(path).and_then(|id| self.get(id))
    }

    /// All nodes, ordered by id
    pub fn nodes(&self) -> Vec<&AssetNode> {
        let mut nodes: Vec<_> = self.nodes.values().collect();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    /// Insert or replace a node
    ///
    /// A different node previously registered at the same path is removed.
    pub fn insert(&mut self, node: AssetNode) {
        if let Some(other) = self.by_path.get(&node.path).copied() {
            if other != node.id {
                self.remove(other);
            }
        }
        if let Some(old) = self.nodes.get(&node.id) {
            if old.path != node.path {
                self.by_path.remove(&old.path);
            }
        }
        self.by_path.insert(node.path.clone(), node.id);
        self.nodes.insert(node.id, node);
    }

    /// Remove a node and strip it from its dependencies' back-references
    ///
    /// Nodes that reference the removed id keep it as a dangling dependency.
    pub fn remove(&mut self, id: AssetId) -> Option<AssetNode> {
        let node = self.nodes.remove(&id)?;
        if self.by_path.get(&node.path) == Some(&id) {
            self.by_path.remove(&node.path);
        }
        for dep in &node.dependencies {
            if let Some(target) = self.nodes.get_mut(dep) {
                target.back_references.remove(&id);
            }
        }
        Some(node)
    }

    /// Move a node to a new path, keeping its id and edges
    pub fn rename(&mut self, id: AssetId, new_path: &str) -> bool {
        let Some(old_path) = self.nodes.get(&id).map(|n| n.path.clone()) else {
            return false;
        };
        if let Some(other) = self.by_path.get(new_path).copied() {
            if other != id {
                self.remove(other);
            }
        }
        self.by_path.remove(&old_path);
        self.by_path.insert(new_path.to_string(), id);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.path = new_path.to_string();
        }
        true
    }

    /// Recompute every back-reference set from the dependency lists in one pass
    pub fn derive_back_references(&mut self) {
        for node in self.nodes.values_mut() {
            node.back_references.clear();
        }
        let edges: Vec<(AssetId, AssetId)> = self
            .nodes
            .values()
            .flat_map(|n| n.dependencies.iter().map(move |d| (n.id, *d)))
            .collect();
        for (from, to) in edges {
            if let Some(target) = self.nodes.get_mut(&to) {
                target.back_references.insert(from);
            }
        }
    }

    /// State of an id; ids without a node are `Missing`
    pub fn state_of(&self, id: AssetId) -> AssetState {
        self.get(id).map(|n| n.state).unwrap_or(AssetState::Missing)
    }

    pub fn back_references(&self, id: AssetId) -> Vec<AssetId> {
        self.get(id)
            .map(|n| n.back_references.iter().copied().collect())
            .unwrap_or_default()
    }

    /// (referencer, target) pairs whose target has no node
    pub fn dangling_edges(&self) -> Vec<(AssetId, AssetId)> {
        let nodes = &self.nodes;
        let mut edges: Vec<_> = nodes
            .values()
            .flat_map(|n| {
                n.dependencies
                    .iter()
                    .filter(move |d| !nodes.contains_key(*d))
                    .map(move |d| (n.id, *d))
            })
            .collect();
        edges.sort();
        edges
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.dependencies.len()).sum()
    }
}

/// Errors raised by the graph store
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("graph snapshot version {found} does not match {expected}")]
    #[diagnostic(
        code(refmerge::graph::version_mismatch),
        help("the snapshot is rebuilt automatically")
    )]
    CacheVersionMismatch { found: u32, expected: u32 },

    #[error("graph snapshot is corrupt: {0}")]
    #[diagnostic(
        code(refmerge::graph::corrupt_snapshot),
        help("the snapshot is rebuilt automatically")
    )]
    CorruptSnapshot(String),

    #[error("failed to persist graph snapshot to {path}: {source}")]
    #[diagnostic(code(refmerge::graph::persist))]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("asset {0} is not in the dependency graph")]
    #[diagnostic(
        code(refmerge::graph::not_found),
        help("run 'refmerge graph sync --scan' to pick up new assets")
    )]
    IdentifierNotFound(AssetId),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Content(#[from] ContentError),
}

impl From<DecodeError> for GraphError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::VersionMismatch { found, expected } => {
                GraphError::CacheVersionMismatch { found, expected }
            }
            DecodeError::Corrupt(msg) => GraphError::CorruptSnapshot(msg),
        }
    }
}

/// Result of reading the snapshot at session start
#[derive(Debug)]
pub enum LoadOutcome {
    /// Snapshot decoded; number of nodes
    Loaded(usize),
    /// No snapshot on disk
    Absent,
    /// Snapshot unusable (version mismatch, corruption, unreadable)
    Miss(GraphError),
}

/// The dependency graph together with its snapshot location
#[derive(Debug)]
pub struct GraphStore {
    graph: DependencyGraph,
    snapshot_path: PathBuf,
    built_at: Option<i64>,
}

impl GraphStore {
    /// An empty store persisting to `snapshot_path`
    pub fn new(snapshot_path: &Path) -> Self {
        Self {
            graph: DependencyGraph::new(),
            snapshot_path: snapshot_path.to_path_buf(),
            built_at: None,
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Unix millis at which the current graph was last persisted
    pub fn built_at(&self) -> Option<i64> {
        self.built_at
    }

    /// Replace the in-memory graph with the snapshot on disk
    ///
    /// On a miss the in-memory graph is left untouched.
    pub fn load(&mut self) -> LoadOutcome {
        let bytes = match std::fs::read(&self.snapshot_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return LoadOutcome::Absent,
            Err(e) => {
                return LoadOutcome::Miss(GraphError::CorruptSnapshot(format!(
                    "unreadable: {}",
                    e
                )))
            }
        };

        match decode_snapshot(&bytes) {
            Ok((graph, built_at)) => {
                let count = graph.len();
                tracing::debug!("loaded graph snapshot with {} nodes", count);
                self.graph = graph;
                self.built_at = Some(built_at);
                LoadOutcome::Loaded(count)
            }
            Err(e) => {
                tracing::warn!("discarding graph snapshot: {}", e);
                LoadOutcome::Miss(e)
            }
        }
    }

    /// Write the snapshot atomically
    ///
    /// A failure leaves both the in-memory graph and the previous file intact.
    pub fn persist(&mut self) -> Result<(), GraphError> {
        let built_at = chrono::Utc::now().timestamp_millis();
        let bytes = encode_snapshot(&self.graph, built_at);
        write_atomic(&self.snapshot_path, &bytes).map_err(|source| GraphError::Persist {
            path: self.snapshot_path.clone(),
            source,
        })?;
        self.built_at = Some(built_at);
        tracing::debug!(
            "persisted graph snapshot ({} nodes, {} bytes)",
            self.graph.len(),
            bytes.len()
        );
        Ok(())
    }

    /// Persist, logging instead of failing; returns whether the write succeeded
    pub(crate) fn persist_or_warn(&mut self) -> bool {
        match self.persist() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        }
    }

    /// Delete the snapshot file and empty the graph
    pub fn clear(&mut self) -> std::io::Result<bool> {
        self.graph = DependencyGraph::new();
        self.built_at = None;
        match std::fs::remove_file(&self.snapshot_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn get_node(&self, id: AssetId) -> Option<&AssetNode> {
        self.graph.get(id)
    }

    /// Node for an id, or `IdentifierNotFound`
    pub fn require_node(&self, id: AssetId) -> Result<&AssetNode, GraphError> {
        self.graph.get(id).ok_or(GraphError::IdentifierNotFound(id))
    }

    pub fn get_back_references(&self, id: AssetId) -> Vec<AssetId> {
        self.graph.back_references(id)
    }

    /// Drop an asset that was deleted through the replacement engine
    pub fn remove_asset(&mut self, id: AssetId) -> Option<AssetNode> {
        self.graph.remove(id)
    }

    #[cfg(test)]
    pub(crate) fn graph_mut(&mut self) -> &mut DependencyGraph {
        &mut self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::id;

    fn node(n: u128, deps: &[u128]) -> AssetNode {
        AssetNode::new(
            id(n),
            format!("Assets/{}.asset", n),
            format!("hash{}", n),
            deps.iter().map(|d| id(*d)).collect(),
        )
    }

    fn graph(nodes: Vec<AssetNode>) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for n in nodes {
            g.insert(n);
        }
        g.derive_back_references();
        g
    }

    fn assert_mirrored(g: &DependencyGraph) {
        for x in g.nodes() {
            for y in g.nodes() {
                assert_eq!(
                    y.dependencies.contains(&x.id),
                    x.back_references.contains(&y.id),
                    "edge {} -> {} not mirrored",
                    y.id,
                    x.id
                );
            }
        }
    }

    #[test]
    fn test_new_node_dedupes_dependencies() {
        let n = node(1, &[2, 3, 2]);
        assert_eq!(n.dependencies, vec![id(2), id(3)]);
    }

    #[test]
    fn test_derive_back_references_mirrors_dependencies() {
        let g = graph(vec![node(1, &[2, 3]), node(2, &[3]), node(3, &[1]), node(4, &[4])]);
        assert_mirrored(&g);
        assert_eq!(g.back_references(id(3)), vec![id(1), id(2)]);
        assert_eq!(g.back_references(id(4)), vec![id(4)]);
    }

    #[test]
    fn test_remove_keeps_dangling_dependency() {
        let mut g = graph(vec![node(1, &[2]), node(3, &[2]), node(2, &[])]);
        g.remove(id(2));

        assert!(g.get(id(2)).is_none());
        assert_eq!(g.get(id(1)).unwrap().dependencies, vec![id(2)]);
        assert_eq!(g.get(id(3)).unwrap().dependencies, vec![id(2)]);
        assert_eq!(g.state_of(id(2)), AssetState::Missing);
        assert_eq!(g.dangling_edges(), vec![(id(1), id(2)), (id(3), id(2))]);
        assert_mirrored(&g);
    }

    #[test]
    fn test_remove_strips_back_references() {
        let mut g = graph(vec![node(1, &[2]), node(2, &[])]);
        g.remove(id(1));
        assert!(g.get(id(2)).unwrap().back_references.is_empty());
    }

    #[test]
    fn test_insert_replaces_node_at_same_path() {
        let mut g = graph(vec![node(1, &[])]);
        let mut other = node(9, &[]);
        other.path = "Assets/1.asset".to_string();
        g.insert(other);
        assert!(g.get(id(1)).is_none());
        assert_eq!(g.id_at("Assets/1.asset"), Some(id(9)));
    }

    #[test]
    fn test_rename_updates_path_index() {
        let mut g = graph(vec![node(1, &[2]), node(2, &[])]);
        assert!(g.rename(id(2), "Moved/two.asset"));
        assert_eq!(g.id_at("Moved/two.asset"), Some(id(2)));
        assert_eq!(g.id_at("Assets/2.asset"), None);
        assert_eq!(g.back_references(id(2)), vec![id(1)]);
        assert!(!g.rename(id(7), "x"));
    }

    #[test]
    fn test_store_load_absent_and_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("graph.snapshot");
        let mut store = GraphStore::new(&path);
        assert!(matches!(store.load(), LoadOutcome::Absent));

        std::fs::write(&path, b"garbage").unwrap();
        assert!(matches!(
            store.load(),
            LoadOutcome::Miss(GraphError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_store_persist_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("graph.snapshot");
        let mut store = GraphStore::new(&path);
        *store.graph_mut() = graph(vec![node(1, &[2]), node(2, &[1])]);
        store.persist().unwrap();
        assert!(store.built_at().is_some());

        let mut fresh = GraphStore::new(&path);
        assert!(matches!(fresh.load(), LoadOutcome::Loaded(2)));
        assert_eq!(fresh.get_back_references(id(1)), vec![id(2)]);
    }

    #[test]
    fn test_persist_failure_keeps_memory() {
        let tmp = tempfile::tempdir().unwrap();
        // A directory where the file should go makes the rename fail
        let path = tmp.path().join("graph.snapshot");
        std::fs::create_dir_all(path.join("blocker")).unwrap();
        let mut store = GraphStore::new(&path);
        *store.graph_mut() = graph(vec![node(1, &[])]);

        let err = store.persist().unwrap_err();
        assert!(matches!(err, GraphError::Persist { .. }));
        assert_eq!(store.graph().len(), 1);
        assert!(store.built_at().is_none());
    }
}
