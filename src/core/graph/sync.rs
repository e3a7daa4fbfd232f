//! Graph synchronization with asset content
//!
//! Full rebuilds run as a cooperative [`RebuildTask`]; incremental updates
//! apply a batch of path changes directly.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::Serialize;

use crate::core::content::{compute_hash, extract_dependencies, ContentStore};
use crate::core::identity::AssetId;
use crate::core::resolver::{file_name, IdentityResolver};
use crate::core::task::{run_to_completion, CancelToken, Progress, Step, Task, TaskOutcome, RECLAIM_INTERVAL};

use super::{AssetNode, AssetState, DependencyGraph, GraphStore};

/// Counters reported by rebuild and sync operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub assets_scanned: usize,
    pub added: usize,
    pub updated: usize,
    /// Assets whose cached edges were reused because the hash was unchanged
    pub reused: usize,
    pub renamed: usize,
    pub removed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    /// Whether the snapshot was written afterwards
    pub persisted: bool,
}

impl SyncStats {
    pub fn changed(&self) -> bool {
        self.added + self.updated + self.renamed + self.removed > 0
    }
}

/// Rebuild tuning
#[derive(Debug, Clone, Copy)]
pub struct RebuildOptions {
    /// Reuse dependency lists of assets whose content hash is unchanged
    pub reuse_cache: bool,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self { reuse_cache: true }
    }
}

/// How a full rebuild ended
#[derive(Debug)]
pub enum RebuildOutcome {
    /// The new graph was committed
    Completed(SyncStats),
    /// Nothing was committed or persisted; `partial` holds what was scanned
    Cancelled {
        partial: DependencyGraph,
        stats: SyncStats,
    },
}

/// Batch of path notifications
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathChanges {
    pub imported: Vec<String>,
    pub deleted: Vec<String>,
    /// New paths of moved assets
    pub moved_to: Vec<String>,
    /// Old paths of moved assets
    pub moved_from: Vec<String>,
}

impl PathChanges {
    pub fn is_empty(&self) -> bool {
        self.imported.is_empty()
            && self.deleted.is_empty()
            && self.moved_to.is_empty()
            && self.moved_from.is_empty()
    }

    pub fn len(&self) -> usize {
        self.imported.len() + self.deleted.len() + self.moved_to.len() + self.moved_from.len()
    }

    /// Compare the graph against the resolver and content to find changes
    /// nobody reported
    pub fn detect(
        graph: &DependencyGraph,
        resolver: &dyn IdentityResolver,
        content: &dyn ContentStore,
    ) -> Self {
        let mut changes = PathChanges::default();

        for path in resolver.asset_paths() {
            let Some(id) = resolver.id_for_path(&path) else {
                continue;
            };
            match graph.get(id) {
                Some(node) if node.path != path => {
                    changes.moved_from.push(node.path.clone());
                    changes.moved_to.push(path);
                }
                Some(node) => {
                    let stale = content
                        .read(&path)
                        .map(|bytes| compute_hash(&bytes) != node.content_hash)
                        .unwrap_or(false);
                    if stale {
                        changes.imported.push(path);
                    }
                }
                None => changes.imported.push(path),
            }
        }

        for node in graph.nodes() {
            if resolver.path_for_id(node.id).is_none() {
                changes.deleted.push(node.path.clone());
            }
        }

        changes
    }
}

/// Build a node for freshly read content, reusing cached edges when allowed
fn build_node(
    id: AssetId,
    path: &str,
    bytes: &[u8],
    cached: Option<&AssetNode>,
    reuse: bool,
    stats: &mut SyncStats,
) -> AssetNode {
    let hash = compute_hash(bytes);
    match cached {
        Some(cached) if reuse && cached.content_hash == hash => {
            stats.reused += 1;
            AssetNode::new(id, path.to_string(), hash, cached.dependencies.clone())
        }
        Some(_) => {
            stats.updated += 1;
            AssetNode::new(id, path.to_string(), hash, extract_dependencies(bytes))
        }
        None => {
            stats.added += 1;
            AssetNode::new(id, path.to_string(), hash, extract_dependencies(bytes))
        }
    }
}

/// One-asset-per-step full rebuild
pub struct RebuildTask<'a> {
    resolver: &'a dyn IdentityResolver,
    content: &'a dyn ContentStore,
    cancel: CancelToken,
    reuse: bool,
    paths: Vec<String>,
    cursor: usize,
    /// Previous graph's nodes; entries are consumed as assets are seen
    cache: HashMap<AssetId, AssetNode>,
    staged: DependencyGraph,
    stats: SyncStats,
    started: Instant,
}

impl<'a> RebuildTask<'a> {
    pub fn new(
        previous: &DependencyGraph,
        resolver: &'a dyn IdentityResolver,
        content: &'a dyn ContentStore,
        cancel: CancelToken,
        options: RebuildOptions,
    ) -> Self {
        let cache = previous
            .nodes()
            .into_iter()
            .map(|n| (n.id, n.clone()))
            .collect();
        Self {
            resolver,
            content,
            cancel,
            reuse: options.reuse_cache,
            paths: resolver.asset_paths(),
            cursor: 0,
            cache,
            staged: DependencyGraph::new(),
            stats: SyncStats::default(),
            started: Instant::now(),
        }
    }

    fn scan_one(&mut self, path: &str) {
        self.stats.assets_scanned += 1;

        let Some(id) = self.resolver.id_for_path(path) else {
            tracing::debug!("no id for {}, skipping", path);
            return;
        };
        let bytes = match self.content.read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("skipping {}: {}", path, e);
                self.stats.failed += 1;
                return;
            }
        };

        let cached = self.cache.remove(&id);
        let node = build_node(id, path, &bytes, cached.as_ref(), self.reuse, &mut self.stats);
        self.staged.insert(node);
    }

    /// Take whatever was scanned so far, with back-references derived
    pub fn into_partial(mut self) -> (DependencyGraph, SyncStats) {
        self.staged.derive_back_references();
        self.stats.duration_ms = self.started.elapsed().as_millis() as u64;
        (self.staged, self.stats)
    }
}

impl Task for RebuildTask<'_> {
    type Output = (DependencyGraph, SyncStats);

    fn step(&mut self) -> Step<Self::Output> {
        if self.cancel.is_cancelled() {
            return Step::Cancelled;
        }

        if self.cursor >= self.paths.len() {
            let mut graph = std::mem::take(&mut self.staged);
            graph.derive_back_references();
            let mut stats = std::mem::take(&mut self.stats);
            stats.removed = self.cache.len();
            stats.duration_ms = self.started.elapsed().as_millis() as u64;
            self.cache.clear();
            return Step::Done((graph, stats));
        }

        let path = self.paths[self.cursor].clone();
        self.cursor += 1;
        self.scan_one(&path);

        if self.cursor % RECLAIM_INTERVAL == 0 {
            self.cache.shrink_to_fit();
        }
        Step::Yield
    }

    fn progress(&self) -> Progress {
        Progress {
            done: self.cursor,
            total: self.paths.len(),
        }
    }
}

impl GraphStore {
    /// Start a cooperative rebuild against the current graph as cache
    pub fn begin_rebuild<'a>(
        &self,
        resolver: &'a dyn IdentityResolver,
        content: &'a dyn ContentStore,
        cancel: CancelToken,
        options: RebuildOptions,
    ) -> RebuildTask<'a> {
        RebuildTask::new(self.graph(), resolver, content, cancel, options)
    }

    /// Commit a finished rebuild and persist it
    pub fn commit_rebuild(&mut self, graph: DependencyGraph, mut stats: SyncStats) -> SyncStats {
        self.graph = graph;
        stats.persisted = self.persist_or_warn();
        tracing::info!(
            "rebuilt graph: {} assets ({} reused, {} rescanned)",
            self.graph.len(),
            stats.reused,
            stats.added + stats.updated
        );
        stats
    }

    /// Rebuild the whole graph, driving the task to the end
    pub fn full_rebuild(
        &mut self,
        resolver: &dyn IdentityResolver,
        content: &dyn ContentStore,
        cancel: &CancelToken,
        options: RebuildOptions,
        on_tick: impl FnMut(Progress),
    ) -> RebuildOutcome {
        let mut task = self.begin_rebuild(resolver, content, cancel.clone(), options);
        match run_to_completion(&mut task, on_tick) {
            TaskOutcome::Completed((graph, stats)) => {
                RebuildOutcome::Completed(self.commit_rebuild(graph, stats))
            }
            TaskOutcome::Cancelled => {
                let (partial, stats) = task.into_partial();
                tracing::info!(
                    "rebuild cancelled after {} assets; snapshot left untouched",
                    stats.assets_scanned
                );
                RebuildOutcome::Cancelled { partial, stats }
            }
        }
    }

    /// Apply a batch of add/delete/move notifications and persist
    pub fn incremental_update(
        &mut self,
        changes: &PathChanges,
        resolver: &dyn IdentityResolver,
        content: &dyn ContentStore,
    ) -> SyncStats {
        let started = Instant::now();
        let mut stats = SyncStats::default();

        // Pair moves by file name; only an unambiguous pair is a rename
        let mut to_name_counts: HashMap<&str, usize> = HashMap::new();
        for to in &changes.moved_to {
            *to_name_counts.entry(file_name(to)).or_default() += 1;
        }
        let mut from_by_name: HashMap<&str, Vec<&str>> = HashMap::new();
        for from in &changes.moved_from {
            from_by_name.entry(file_name(from)).or_default().push(from);
        }

        let mut matched_from: HashSet<&str> = HashSet::new();
        let mut recompute: Vec<&str> = changes.imported.iter().map(String::as_str).collect();

        for to in &changes.moved_to {
            let name = file_name(to);
            let candidates = from_by_name.get(name).map(Vec::as_slice).unwrap_or(&[]);
            let unique = to_name_counts.get(name) == Some(&1) && candidates.len() == 1;
            let renamed = unique && self.try_rename(candidates[0], to, resolver, content, &mut stats);
            if renamed {
                matched_from.insert(candidates[0]);
            } else {
                tracing::debug!("move to {} is ambiguous, recomputing", to);
                recompute.push(to);
            }
        }

        // Stale move sources and deletions
        let stale = changes
            .moved_from
            .iter()
            .filter(|from| !matched_from.contains(from.as_str()));
        for path in stale.chain(changes.deleted.iter()) {
            if let Some(id) = self.graph.id_at(path) {
                self.graph.remove(id);
                stats.removed += 1;
            }
        }

        for path in recompute {
            stats.assets_scanned += 1;
            let Some(id) = resolver.id_for_path(path) else {
                tracing::debug!("no id for {}, skipping", path);
                continue;
            };
            match content.read(path) {
                Ok(bytes) => {
                    let cached = self.graph.get(id).cloned();
                    let node = build_node(id, path, &bytes, cached.as_ref(), true, &mut stats);
                    self.graph.insert(node);
                }
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path, e);
                    stats.failed += 1;
                }
            }
        }

        self.graph.derive_back_references();
        stats.persisted = self.persist_or_warn();
        stats.duration_ms = started.elapsed().as_millis() as u64;
        stats
    }

    /// Identity-preserving rename; false when the pair cannot be trusted
    fn try_rename(
        &mut self,
        from: &str,
        to: &str,
        resolver: &dyn IdentityResolver,
        content: &dyn ContentStore,
        stats: &mut SyncStats,
    ) -> bool {
        let Some(id) = self.graph.id_at(from) else {
            return false;
        };
        if resolver.id_for_path(to).is_some_and(|resolved| resolved != id) {
            return false;
        }
        let Ok(bytes) = content.read(to) else {
            return false;
        };

        self.graph.rename(id, to);
        stats.renamed += 1;

        let unchanged = self
            .graph
            .get(id)
            .is_some_and(|n| n.content_hash == compute_hash(&bytes));
        if !unchanged {
            let node = build_node(id, to, &bytes, None, false, &mut SyncStats::default());
            self.graph.insert(node);
            stats.updated += 1;
        }
        true
    }

    /// Re-read assets whose content was rewritten and persist once
    pub fn notify_content_changed(
        &mut self,
        ids: &[AssetId],
        resolver: &dyn IdentityResolver,
        content: &dyn ContentStore,
    ) -> SyncStats {
        let started = Instant::now();
        let mut stats = SyncStats::default();

        for &id in ids {
            let Some(path) = self
                .graph
                .get(id)
                .map(|n| n.path.clone())
                .or_else(|| resolver.path_for_id(id))
            else {
                tracing::debug!("changed asset {} has no known path", id);
                continue;
            };
            stats.assets_scanned += 1;

            if !content.exists(&path) {
                if let Some(node) = self.graph.get_mut(id) {
                    node.state = AssetState::Missing;
                }
                continue;
            }
            match content.read(&path) {
                Ok(bytes) => {
                    let cached = self.graph.get(id).cloned();
                    let node = build_node(id, &path, &bytes, cached.as_ref(), true, &mut stats);
                    self.graph.insert(node);
                }
                Err(e) => {
                    tracing::warn!("failed to re-read {}: {}", path, e);
                    stats.failed += 1;
                }
            }
        }

        self.graph.derive_back_references();
        stats.persisted = self.persist_or_warn();
        stats.duration_ms = started.elapsed().as_millis() as u64;
        stats
    }

    /// Recheck the display state of the given assets against current content
    pub fn refresh_states(
        &mut self,
        ids: &[AssetId],
        resolver: &dyn IdentityResolver,
        content: &dyn ContentStore,
    ) -> Vec<(AssetId, AssetState)> {
        let mut states = Vec::with_capacity(ids.len());
        let mut inserted = false;

        for &id in ids {
            let state = match self.graph.get(id).map(|n| (n.path.clone(), n.content_hash.clone())) {
                Some((path, hash)) => {
                    let state = if !content.exists(&path) {
                        AssetState::Missing
                    } else {
                        match content.read(&path) {
                            Ok(bytes) if compute_hash(&bytes) == hash => AssetState::Normal,
                            Ok(_) => AssetState::Changed,
                            Err(_) => AssetState::Missing,
                        }
                    };
                    if let Some(node) = self.graph.get_mut(id) {
                        node.state = state;
                    }
                    state
                }
                None => match resolver.path_for_id(id) {
                    Some(path) => {
                        self.graph.insert(AssetNode::placeholder(id, path));
                        inserted = true;
                        AssetState::NoData
                    }
                    None => AssetState::Missing,
                },
            };
            states.push((id, state));
        }

        if inserted {
            self.graph.derive_back_references();
        }
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{id, ref_line, MemoryWorld};

    fn store() -> (tempfile::TempDir, GraphStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = GraphStore::new(&tmp.path().join("graph.snapshot"));
        (tmp, store)
    }

    fn rebuild(store: &mut GraphStore, world: &MemoryWorld) -> SyncStats {
        match store.full_rebuild(world, world, &CancelToken::new(), RebuildOptions::default(), |_| {}) {
            RebuildOutcome::Completed(stats) => stats,
            RebuildOutcome::Cancelled { .. } => panic!("rebuild cancelled"),
        }
    }

    /// A -> B, C -> B, B -> (nothing)
    fn fan_in_world() -> MemoryWorld {
        let world = MemoryWorld::new();
        world.add("Assets/b.png", id(2), "png-bytes");
        world.add("Assets/a.prefab", id(1), &ref_line(id(2)));
        world.add("Assets/c.prefab", id(3), &ref_line(id(2)));
        world
    }

    fn assert_mirrored(g: &DependencyGraph) {
        for x in g.nodes() {
            for y in g.nodes() {
                assert_eq!(
                    y.dependencies.contains(&x.id),
                    x.back_references.contains(&y.id)
                );
            }
        }
    }

    #[test]
    fn test_full_rebuild_builds_mirrored_edges() {
        let (_tmp, mut store) = store();
        let world = fan_in_world();
        world.add("Assets/loop.prefab", id(4), &(ref_line(id(4)) + &ref_line(id(1))));

        let stats = rebuild(&mut store, &world);

        assert_eq!(stats.added, 4);
        assert!(stats.persisted);
        assert!(store.snapshot_path().exists());
        assert_mirrored(store.graph());
        assert_eq!(store.get_back_references(id(2)), vec![id(1), id(3)]);
        assert_eq!(store.get_back_references(id(4)), vec![id(4)]);
    }

    #[test]
    fn test_full_rebuild_reuses_unchanged_edges() {
        let (_tmp, mut store) = store();
        let world = fan_in_world();
        rebuild(&mut store, &world);

        world.set_content("Assets/c.prefab", "no refs any more");
        let stats = rebuild(&mut store, &world);

        assert_eq!(stats.reused, 2);
        assert_eq!(stats.updated, 1);
        assert_eq!(store.get_back_references(id(2)), vec![id(1)]);
    }

    #[test]
    fn test_full_rebuild_without_reuse_rescans() {
        let (_tmp, mut store) = store();
        let world = fan_in_world();
        rebuild(&mut store, &world);

        let outcome = store.full_rebuild(
            &world,
            &world,
            &CancelToken::new(),
            RebuildOptions { reuse_cache: false },
            |_| {},
        );
        let RebuildOutcome::Completed(stats) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(stats.reused, 0);
        assert_eq!(stats.updated, 3);
    }

    #[test]
    fn test_full_rebuild_counts_removed_assets() {
        let (_tmp, mut store) = store();
        let world = fan_in_world();
        rebuild(&mut store, &world);

        world.remove("Assets/c.prefab");
        let stats = rebuild(&mut store, &world);
        assert_eq!(stats.removed, 1);
        assert!(store.get_node(id(3)).is_none());
    }

    #[test]
    fn test_cancelled_rebuild_keeps_snapshot_and_graph() {
        let (_tmp, mut store) = store();
        let world = fan_in_world();
        rebuild(&mut store, &world);
        let before = std::fs::read(store.snapshot_path()).unwrap();

        world.add("Assets/d.prefab", id(5), &ref_line(id(1)));
        world.set_content("Assets/a.prefab", "changed");
        let cancel = CancelToken::new();
        let outcome = store.full_rebuild(&world, &world, &cancel, RebuildOptions::default(), |p| {
            if p.done == 2 {
                cancel.cancel();
            }
        });

        let RebuildOutcome::Cancelled { partial, stats } = outcome else {
            panic!("expected cancellation");
        };
        assert_eq!(stats.assets_scanned, 2);
        assert_eq!(partial.len(), 2);
        assert_eq!(std::fs::read(store.snapshot_path()).unwrap(), before);
        assert_eq!(store.graph().len(), 3);
        assert_eq!(store.get_node(id(1)).unwrap().dependencies, vec![id(2)]);
    }

    #[test]
    fn test_rebuild_task_steps_one_asset_at_a_time() {
        let (_tmp, store) = store();
        let world = fan_in_world();
        let mut task = store.begin_rebuild(&world, &world, CancelToken::new(), RebuildOptions::default());

        assert!(matches!(task.step(), Step::Yield));
        assert_eq!(task.progress(), Progress { done: 1, total: 3 });
        assert!(matches!(task.step(), Step::Yield));
        assert!(matches!(task.step(), Step::Yield));
        let Step::Done((graph, stats)) = task.step() else {
            panic!("expected done");
        };
        assert_eq!(graph.len(), 3);
        assert_eq!(stats.assets_scanned, 3);
    }

    #[test]
    fn test_incremental_delete_leaves_dangling_references() {
        let (_tmp, mut store) = store();
        let world = fan_in_world();
        rebuild(&mut store, &world);

        world.remove("Assets/b.png");
        let stats = store.incremental_update(
            &PathChanges {
                deleted: vec!["Assets/b.png".to_string()],
                ..Default::default()
            },
            &world,
            &world,
        );

        assert_eq!(stats.removed, 1);
        assert!(store.get_node(id(2)).is_none());
        assert_eq!(store.get_node(id(1)).unwrap().dependencies, vec![id(2)]);
        assert_eq!(store.get_node(id(3)).unwrap().dependencies, vec![id(2)]);
        assert_eq!(store.graph().state_of(id(2)), AssetState::Missing);
        assert_mirrored(store.graph());
    }

    #[test]
    fn test_incremental_rename_preserves_id_and_hash() {
        let (_tmp, mut store) = store();
        let world = fan_in_world();
        rebuild(&mut store, &world);
        let hash = store.get_node(id(2)).unwrap().content_hash.clone();

        world.rename("Assets/b.png", "Assets/moved/b.png");
        let stats = store.incremental_update(
            &PathChanges {
                moved_to: vec!["Assets/moved/b.png".to_string()],
                moved_from: vec!["Assets/b.png".to_string()],
                ..Default::default()
            },
            &world,
            &world,
        );

        assert_eq!(stats.renamed, 1);
        assert_eq!(stats.removed, 0);
        let node = store.get_node(id(2)).unwrap();
        assert_eq!(node.path, "Assets/moved/b.png");
        assert_eq!(node.content_hash, hash);
        assert_eq!(store.get_back_references(id(2)), vec![id(1), id(3)]);
    }

    #[test]
    fn test_incremental_ambiguous_move_recomputes() {
        let (_tmp, mut store) = store();
        let world = MemoryWorld::new();
        world.add("x/icon.png", id(1), "one");
        world.add("y/icon.png", id(2), "two");
        rebuild(&mut store, &world);

        world.rename("x/icon.png", "z1/icon.png");
        world.rename("y/icon.png", "z2/icon.png");
        let stats = store.incremental_update(
            &PathChanges {
                moved_to: vec!["z1/icon.png".to_string(), "z2/icon.png".to_string()],
                moved_from: vec!["x/icon.png".to_string(), "y/icon.png".to_string()],
                ..Default::default()
            },
            &world,
            &world,
        );

        assert_eq!(stats.renamed, 0);
        assert_eq!(stats.removed, 2);
        assert_eq!(store.get_node(id(1)).unwrap().path, "z1/icon.png");
        assert_eq!(store.get_node(id(2)).unwrap().path, "z2/icon.png");
        assert!(store.graph().id_at("x/icon.png").is_none());
    }

    #[test]
    fn test_incremental_import_adds_edges() {
        let (_tmp, mut store) = store();
        let world = fan_in_world();
        rebuild(&mut store, &world);

        world.add("Assets/d.prefab", id(4), &ref_line(id(1)));
        let stats = store.incremental_update(
            &PathChanges {
                imported: vec!["Assets/d.prefab".to_string()],
                ..Default::default()
            },
            &world,
            &world,
        );

        assert_eq!(stats.added, 1);
        assert_eq!(store.get_back_references(id(1)), vec![id(4)]);
    }

    #[test]
    fn test_detect_finds_moves_edits_and_deletes() {
        let (_tmp, mut store) = store();
        let world = fan_in_world();
        rebuild(&mut store, &world);

        world.rename("Assets/b.png", "Assets/art/b.png");
        world.set_content("Assets/a.prefab", "edited");
        world.remove("Assets/c.prefab");
        world.add("Assets/new.prefab", id(9), "");

        let changes = PathChanges::detect(store.graph(), &world, &world);
        assert_eq!(changes.moved_from, vec!["Assets/b.png".to_string()]);
        assert_eq!(changes.moved_to, vec!["Assets/art/b.png".to_string()]);
        assert_eq!(
            changes.imported,
            vec!["Assets/a.prefab".to_string(), "Assets/new.prefab".to_string()]
        );
        assert_eq!(changes.deleted, vec!["Assets/c.prefab".to_string()]);
    }

    #[test]
    fn test_notify_content_changed_updates_edges() {
        let (_tmp, mut store) = store();
        let world = fan_in_world();
        rebuild(&mut store, &world);

        world.set_content("Assets/a.prefab", &ref_line(id(3)));
        let stats = store.notify_content_changed(&[id(1)], &world, &world);

        assert_eq!(stats.updated, 1);
        assert_eq!(store.get_back_references(id(2)), vec![id(3)]);
        assert_eq!(store.get_back_references(id(3)), vec![id(1)]);
    }

    #[test]
    fn test_refresh_states() {
        let (_tmp, mut store) = store();
        let world = fan_in_world();
        rebuild(&mut store, &world);

        world.set_content("Assets/a.prefab", "edited");
        world.remove("Assets/c.prefab");
        world.add("Assets/late.png", id(8), "late");

        let states = store.refresh_states(&[id(1), id(2), id(3), id(8), id(99)], &world, &world);
        assert_eq!(
            states,
            vec![
                (id(1), AssetState::Changed),
                (id(2), AssetState::Normal),
                (id(3), AssetState::Missing),
                (id(8), AssetState::NoData),
                (id(99), AssetState::Missing),
            ]
        );
        assert_eq!(store.graph().state_of(id(8)), AssetState::NoData);
    }
}
