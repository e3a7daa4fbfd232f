//! Per-command session context
//!
//! A [`Workspace`] owns everything one command needs: the project, its
//! configuration, the identity resolver, the content store and the graph
//! store. Commands open it, act through it and close it; nothing is kept
//! in globals between calls.

use std::path::Path;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::core::codec::write_atomic;
use crate::core::config::Config;
use crate::core::content::FsContentStore;
use crate::core::fingerprint::{FingerprintError, JsonFingerprintStore};
use crate::core::graph::{
    AssetState, GraphError, GraphStore, LoadOutcome, PathChanges, RebuildOptions, RebuildOutcome,
    SyncStats,
};
use crate::core::identity::AssetId;
use crate::core::matching::{candidates, MatchSet, MatchTask, MatchedAsset};
use crate::core::modlog::{ModLogError, ModificationLog};
use crate::core::project::{Project, ProjectError};
use crate::core::replace::{BatchReport, Direction, ReplaceError, ReplacementEngine, Scope};
use crate::core::resolver::{IdentityResolver, MetaResolver};
use crate::core::task::{run_to_completion, CancelToken, Progress, TaskOutcome};

#[derive(Debug, Error, Diagnostic)]
pub enum WorkspaceError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ModLog(#[from] ModLogError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Fingerprint(#[from] FingerprintError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Replace(#[from] ReplaceError),

    #[error("replacement session {path} is unusable: {message}")]
    #[diagnostic(
        code(refmerge::session::invalid),
        help("discard it with 'refmerge replace end'")
    )]
    Session { path: String, message: String },

    #[error("no asset found for '{0}'")]
    #[diagnostic(
        code(refmerge::workspace::asset_not_found),
        help("pass a project-relative path or a 32-digit asset id")
    )]
    AssetNotFound(String),

    #[error("operation cancelled")]
    #[diagnostic(code(refmerge::workspace::cancelled))]
    Cancelled,
}

/// How a sync brought the graph up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    UpToDate,
    Incremental,
    FullRebuild,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub mode: SyncMode,
    /// Path notifications applied
    pub changes: usize,
    pub stats: SyncStats,
}

pub struct Workspace {
    project: Project,
    config: Config,
    resolver: MetaResolver,
    content: FsContentStore,
    store: GraphStore,
    needs_rebuild: bool,
    dirty: bool,
}

impl Workspace {
    /// Scan sidecars and load the graph snapshot
    pub fn open(project: Project) -> Self {
        let config = Config::load(Some(&project));
        let resolver = MetaResolver::scan(project.root());
        let content = FsContentStore::new(project.root());
        let mut store = GraphStore::new(&project.snapshot_path());

        let needs_rebuild = match store.load() {
            LoadOutcome::Loaded(_) => false,
            LoadOutcome::Absent => {
                tracing::debug!("no graph snapshot yet");
                true
            }
            LoadOutcome::Miss(e) => {
                tracing::info!("graph snapshot unusable ({}); a rebuild is required", e);
                true
            }
        };

        Self {
            project,
            config,
            resolver,
            content,
            store,
            needs_rebuild,
            dirty: false,
        }
    }

    /// Persist state changes made without a write of their own
    pub fn close(mut self) -> Result<(), WorkspaceError> {
        if self.dirty {
            self.store.persist()?;
        }
        Ok(())
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &MetaResolver {
        &self.resolver
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Whether the snapshot was absent or unusable at open
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    /// Rebuild if needed, otherwise apply pending notifications
    pub fn ensure_current(
        &mut self,
        on_tick: impl FnMut(Progress),
    ) -> Result<Option<SyncSummary>, WorkspaceError> {
        if self.needs_rebuild || self.project.modlog_path().exists() {
            return self.sync(false, on_tick).map(Some);
        }
        Ok(None)
    }

    /// Full rebuild; the modification log is obsolete once it completes
    pub fn rebuild(
        &mut self,
        options: RebuildOptions,
        cancel: &CancelToken,
        on_tick: impl FnMut(Progress),
    ) -> Result<RebuildOutcome, WorkspaceError> {
        let outcome = self
            .store
            .full_rebuild(&self.resolver, &self.content, cancel, options, on_tick);
        if let RebuildOutcome::Completed(stats) = &outcome {
            self.needs_rebuild = false;
            if stats.persisted {
                ModificationLog::discard(&self.project.modlog_path())?;
            }
        }
        Ok(outcome)
    }

    /// Bring the graph up to date
    ///
    /// Consumes the modification log, or with `scan` compares the graph
    /// against the files on disk. A corrupt log or a missing snapshot
    /// falls back to a full rebuild.
    pub fn sync(
        &mut self,
        scan: bool,
        on_tick: impl FnMut(Progress),
    ) -> Result<SyncSummary, WorkspaceError> {
        if self.needs_rebuild {
            return self.rebuild_for_sync(on_tick);
        }

        let log_path = self.project.modlog_path();
        let logged = match ModificationLog::open(&log_path) {
            Ok(log) => log.to_changes(),
            Err(e @ ModLogError::Corrupt { .. }) => {
                tracing::warn!("{}; running a full rebuild", e);
                ModificationLog::discard(&log_path)?;
                return self.rebuild_for_sync(on_tick);
            }
            Err(e) => return Err(e.into()),
        };

        let changes = if scan {
            PathChanges::detect(self.store.graph(), &self.resolver, &self.content)
        } else {
            logged
        };
        if changes.is_empty() {
            ModificationLog::discard(&log_path)?;
            return Ok(SyncSummary {
                mode: SyncMode::UpToDate,
                changes: 0,
                stats: SyncStats::default(),
            });
        }

        let stats = self
            .store
            .incremental_update(&changes, &self.resolver, &self.content);
        if stats.persisted {
            ModificationLog::discard(&log_path)?;
        } else {
            tracing::warn!("graph snapshot not written; keeping the modification log");
        }
        Ok(SyncSummary {
            mode: SyncMode::Incremental,
            changes: changes.len(),
            stats,
        })
    }

    fn rebuild_for_sync(&mut self, on_tick: impl FnMut(Progress)) -> Result<SyncSummary, WorkspaceError> {
        match self.rebuild(RebuildOptions::default(), &CancelToken::new(), on_tick)? {
            RebuildOutcome::Completed(stats) => Ok(SyncSummary {
                mode: SyncMode::FullRebuild,
                changes: 0,
                stats,
            }),
            RebuildOutcome::Cancelled { .. } => Err(WorkspaceError::Cancelled),
        }
    }

    /// Append notifications to the modification log; returns pending entries
    pub fn record_changes(&self, changes: &PathChanges) -> Result<usize, WorkspaceError> {
        let mut log = ModificationLog::open(&self.project.modlog_path())?;
        log.record(changes);
        log.save()?;
        Ok(log.len())
    }

    /// Delete the snapshot and any pending notifications
    pub fn clear(&mut self) -> Result<bool, WorkspaceError> {
        let removed = self.store.clear().map_err(|source| GraphError::Persist {
            path: self.store.snapshot_path().to_path_buf(),
            source,
        })?;
        ModificationLog::discard(&self.project.modlog_path())?;
        self.needs_rebuild = true;
        self.dirty = false;
        Ok(removed)
    }

    /// Resolve a path (project-relative or on disk) or an id to an asset
    pub fn find_asset(&self, query: &str) -> Result<(AssetId, String), WorkspaceError> {
        if AssetId::is_id_like(query) {
            if let Ok(id) = AssetId::parse(query) {
                let path = self
                    .store
                    .get_node(id)
                    .map(|n| n.path.clone())
                    .or_else(|| self.resolver.path_for_id(id));
                if let Some(path) = path {
                    return Ok((id, path));
                }
            }
            return Err(WorkspaceError::AssetNotFound(query.to_string()));
        }

        let normalized = query.trim_start_matches("./").replace('\\', "/");
        let candidates = [
            Some(normalized),
            self.project.asset_path(Path::new(query)),
        ];
        for path in candidates.into_iter().flatten() {
            let id = self
                .store
                .graph()
                .id_at(&path)
                .or_else(|| self.resolver.id_for_path(&path));
            if let Some(id) = id {
                return Ok((id, path));
            }
        }
        Err(WorkspaceError::AssetNotFound(query.to_string()))
    }

    /// A matched-asset view of a query, with container info
    pub fn matched_asset(&self, query: &str) -> Result<MatchedAsset, WorkspaceError> {
        let (id, path) = self.find_asset(query)?;
        Ok(MatchedAsset::new(id, path, &self.resolver))
    }

    /// Compare a subject against every candidate image
    pub fn find_matches(
        &self,
        subject: MatchedAsset,
        cancel: &CancelToken,
        on_tick: impl FnMut(Progress),
    ) -> Result<MatchSet, WorkspaceError> {
        let provider = JsonFingerprintStore::open(&self.project.fingerprints_path())?;
        let found = candidates(self.store.graph(), &self.config, subject.id);
        tracing::debug!(
            "comparing {} against {} candidates ({} fingerprints)",
            subject.path,
            found.len(),
            provider.len()
        );

        let mut task = MatchTask::new(
            subject,
            found,
            &provider,
            &self.resolver,
            self.config.thresholds(),
            cancel.clone(),
        )?;
        match run_to_completion(&mut task, on_tick) {
            TaskOutcome::Completed(set) => Ok(set),
            TaskOutcome::Cancelled => Err(WorkspaceError::Cancelled),
        }
    }

    /// Current display state of the given assets
    pub fn refresh_states(&mut self, ids: &[AssetId]) -> Vec<(AssetId, AssetState)> {
        let states = self.store.refresh_states(ids, &self.resolver, &self.content);
        if states.iter().any(|(_, s)| *s == AssetState::NoData) {
            self.dirty = true;
        }
        states
    }

    // =========================================================================
    // Replacement session
    // =========================================================================

    pub fn has_session(&self) -> bool {
        self.project.session_path().exists()
    }

    pub fn load_session(&self) -> Result<ReplacementEngine, WorkspaceError> {
        let path = self.project.session_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReplaceError::NoSession.into())
            }
            Err(e) => return Err(session_error(&path, e)),
        };
        serde_json::from_str(&contents).map_err(|e| session_error(&path, e))
    }

    pub fn save_session(&self, engine: &ReplacementEngine) -> Result<(), WorkspaceError> {
        let path = self.project.session_path();
        let bytes = serde_json::to_vec_pretty(engine).map_err(|e| session_error(&path, e))?;
        write_atomic(&path, &bytes).map_err(|e| session_error(&path, e))
    }

    /// Discard the session; returns whether one existed
    pub fn end_session(&self) -> Result<bool, WorkspaceError> {
        let path = self.project.session_path();
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(session_error(&path, e)),
        }
    }

    /// Choose or switch the replacement source
    pub fn select_source(
        &self,
        engine: &mut ReplacementEngine,
        source: MatchedAsset,
        confirmed: bool,
    ) -> Result<(), WorkspaceError> {
        engine.select_source(source, self.store.graph(), confirmed)?;
        Ok(())
    }

    /// Replace or revert a scope, keeping the resolver in step with deletions
    pub fn apply(
        &mut self,
        engine: &mut ReplacementEngine,
        scope: &Scope,
        direction: Direction,
        delete_after: bool,
    ) -> Result<BatchReport, WorkspaceError> {
        let report = engine.apply(
            scope,
            direction,
            delete_after,
            &mut self.store,
            &self.resolver,
            &self.content,
        )?;
        for path in &report.deleted {
            self.resolver.remove_path(path);
        }
        Ok(report)
    }
}

fn session_error(path: &Path, e: impl std::fmt::Display) -> WorkspaceError {
    WorkspaceError::Session {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}
