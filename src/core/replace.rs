//! Graph-directed reference replacement with per-pair rollback
//!
//! A pair is one (referencing asset, matched asset) edge found through the
//! graph's back-references. Replacing a pair rewrites the referencer so it
//! points at the chosen source instead of the matched asset; reverting
//! rewrites it back. Every pair's state lives in a [`ReplacementRecord`].
//!
//! Substitution is purely textual. A referencer that mentions both the
//! matched asset and the source cannot be told apart on revert: reverting
//! rewrites every occurrence of the source back to the matched asset.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::content::{ContentError, ContentStore};
use crate::core::graph::{DependencyGraph, GraphStore};
use crate::core::identity::AssetId;
use crate::core::matching::{MatchSet, MatchedAsset};
use crate::core::resolver::{ContainerRef, IdentityResolver};
use crate::core::tree::{MatchCategory, ReferenceForest, TreeRow};

/// How a referencer reaches the matched asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    /// References the asset's own id
    Direct,
    /// References the asset through its container and sub id
    Container,
}

/// Identity of one replaceable pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PairKey {
    pub referencer: AssetId,
    /// The matched asset's own path, for both kinds
    pub matched_path: String,
    pub kind: RefKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PairState {
    NotReplaced,
    Replaced,
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairState::NotReplaced => write!(f, "pending"),
            PairState::Replaced => write!(f, "replaced"),
        }
    }
}

type PairMap = BTreeMap<AssetId, BTreeMap<String, bool>>;

/// Replaced flags per referencer and matched path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplacementRecord {
    #[serde(default)]
    pub direct: PairMap,
    #[serde(default)]
    pub container: PairMap,
}

impl ReplacementRecord {
    /// A record with every pair reachable from the matches, all not replaced
    ///
    /// The source itself never gets pairs.
    pub fn build(matches: &MatchSet, source: &MatchedAsset, graph: &DependencyGraph) -> Self {
        let mut record = Self::default();
        for asset in matches.all().filter(|m| m.id != source.id) {
            for referencer in graph.back_references(asset.id) {
                record
                    .direct
                    .entry(referencer)
                    .or_default()
                    .insert(asset.path.clone(), false);
            }
            if let Some(container) = &asset.container {
                for referencer in graph.back_references(container.id) {
                    record
                        .container
                        .entry(referencer)
                        .or_default()
                        .insert(asset.path.clone(), false);
                }
            }
        }
        record
    }

    fn map(&self, kind: RefKind) -> &PairMap {
        match kind {
            RefKind::Direct => &self.direct,
            RefKind::Container => &self.container,
        }
    }

    fn map_mut(&mut self, kind: RefKind) -> &mut PairMap {
        match kind {
            RefKind::Direct => &mut self.direct,
            RefKind::Container => &mut self.container,
        }
    }

    pub fn state(&self, key: &PairKey) -> Option<PairState> {
        self.map(key.kind)
            .get(&key.referencer)
            .and_then(|m| m.get(&key.matched_path))
            .map(|&replaced| {
                if replaced {
                    PairState::Replaced
                } else {
                    PairState::NotReplaced
                }
            })
    }

    /// Set the state of a recorded pair; unknown pairs are ignored
    fn set(&mut self, key: &PairKey, state: PairState) {
        if let Some(flag) = self
            .map_mut(key.kind)
            .get_mut(&key.referencer)
            .and_then(|m| m.get_mut(&key.matched_path))
        {
            *flag = state == PairState::Replaced;
        }
    }

    /// Drop every pair of a matched path
    fn purge(&mut self, kind: RefKind, matched_path: &str) {
        let map = self.map_mut(kind);
        for paths in map.values_mut() {
            paths.remove(matched_path);
        }
        map.retain(|_, paths| !paths.is_empty());
    }

    /// Keys of a matched path, in referencer order
    pub fn keys_for(&self, kind: RefKind, matched_path: &str) -> Vec<PairKey> {
        self.map(kind)
            .iter()
            .filter(|(_, paths)| paths.contains_key(matched_path))
            .map(|(referencer, _)| PairKey {
                referencer: *referencer,
                matched_path: matched_path.to_string(),
                kind,
            })
            .collect()
    }

    /// Every pair with its state
    pub fn pairs(&self) -> Vec<(PairKey, PairState)> {
        let mut pairs = Vec::new();
        for kind in [RefKind::Direct, RefKind::Container] {
            for (referencer, paths) in self.map(kind) {
                for (path, &replaced) in paths {
                    let state = if replaced {
                        PairState::Replaced
                    } else {
                        PairState::NotReplaced
                    };
                    pairs.push((
                        PairKey {
                            referencer: *referencer,
                            matched_path: path.clone(),
                            kind,
                        },
                        state,
                    ));
                }
            }
        }
        pairs
    }

    pub fn any_replaced(&self) -> bool {
        self.direct
            .values()
            .chain(self.container.values())
            .any(|paths| paths.values().any(|&r| r))
    }

    pub fn len(&self) -> usize {
        self.direct
            .values()
            .chain(self.container.values())
            .map(|paths| paths.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a replace or revert operation covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every pair of every match in a category
    Category(MatchCategory),
    /// One matched asset's pairs of one kind, by the asset's own path
    Matched { path: String, kind: RefKind },
    /// A single pair
    Pair(PairKey),
}

impl Scope {
    /// Scope of a tree row; rows deeper than the direct referencers have none
    pub fn for_row(row: &TreeRow, forest: &ReferenceForest) -> Option<Scope> {
        match row {
            TreeRow::CategoryRoot { category } => Some(Scope::Category(*category)),
            TreeRow::MatchedAsset {
                origin,
                via_container,
                ..
            } => {
                let (_, asset) = forest.matched(*origin)?;
                Some(Scope::Matched {
                    path: asset.path.clone(),
                    kind: kind_of(*via_container),
                })
            }
            TreeRow::ReferencingAsset {
                id,
                origin,
                depth: 1,
                via_container,
            } => {
                let (_, asset) = forest.matched(*origin)?;
                let kind = kind_of(*via_container);
                Some(Scope::Pair(PairKey {
                    referencer: *id,
                    matched_path: key_path(asset, kind)?.to_string(),
                    kind,
                }))
            }
            TreeRow::ReferencingAsset { .. } => None,
        }
    }
}

fn kind_of(via_container: bool) -> RefKind {
    if via_container {
        RefKind::Container
    } else {
        RefKind::Direct
    }
}

/// Record key of a matched asset for a kind; container keys need a container
///
/// Container pairs are keyed by the member, not the container, so members
/// packed into the same container keep separate states.
fn key_path(asset: &MatchedAsset, kind: RefKind) -> Option<&str> {
    match kind {
        RefKind::Direct => Some(&asset.path),
        RefKind::Container => asset.container.as_ref().map(|_| asset.path.as_str()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Replace,
    Revert,
}

impl Direction {
    fn target(self) -> PairState {
        match self {
            Direction::Replace => PairState::Replaced,
            Direction::Revert => PairState::NotReplaced,
        }
    }
}

/// Result for one pair in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "kebab-case")]
pub enum PairOutcome {
    /// Content rewritten and state flipped
    Applied,
    /// Already in the target state
    Skipped,
    /// The identifier to substitute is no longer in the content
    Mismatch,
    /// Reading or writing the referencer failed
    Failed(String),
}

/// Per-pair outcomes of one batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<(PairKey, PairOutcome)>,
    /// Paths deleted by delete-after-replace
    pub deleted: Vec<String>,
}

impl BatchReport {
    pub fn count(&self, outcome: &PairOutcome) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| std::mem::discriminant(o) == std::mem::discriminant(outcome))
            .count()
    }

    pub fn applied(&self) -> usize {
        self.count(&PairOutcome::Applied)
    }

    /// Pairs that were neither applied nor skipped
    pub fn problems(&self) -> impl Iterator<Item = &(PairKey, PairOutcome)> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !matches!(o, PairOutcome::Applied | PairOutcome::Skipped))
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ReplaceError {
    #[error("no replacement source selected")]
    #[diagnostic(
        code(refmerge::replace::no_source),
        help("choose one with 'refmerge replace source <PATH>'")
    )]
    NoSource,

    #[error("switching the source would discard rollback state of {replaced} replaced pair(s)")]
    #[diagnostic(
        code(refmerge::replace::source_switch_blocked),
        help("revert the replaced pairs first, or confirm the switch")
    )]
    SourceSwitchBlocked { replaced: usize },

    #[error("no replacement session in progress")]
    #[diagnostic(
        code(refmerge::replace::no_session),
        help("start one with 'refmerge replace start <SUBJECT>'")
    )]
    NoSession,

    #[error("'{0}' is not part of this replacement session")]
    #[diagnostic(code(refmerge::replace::unknown_asset))]
    UnknownAsset(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Content(#[from] ContentError),
}

/// Replacement session state: matches, chosen source and pair record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacementEngine {
    pub matches: MatchSet,
    #[serde(default)]
    pub source: Option<MatchedAsset>,
    #[serde(default)]
    pub record: ReplacementRecord,
    #[serde(default)]
    pub deleted_paths: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One pair resolved against the session's matched assets
struct Job {
    key: PairKey,
    asset: MatchedAsset,
}

impl ReplacementEngine {
    pub fn new(matches: MatchSet) -> Self {
        Self {
            matches,
            source: None,
            record: ReplacementRecord::default(),
            deleted_paths: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Choose the replacement source and rebuild the record
    ///
    /// Blocked while any pair is replaced unless `confirmed`; a confirmed
    /// switch resets every pair to not replaced.
    pub fn select_source(
        &mut self,
        source: MatchedAsset,
        graph: &DependencyGraph,
        confirmed: bool,
    ) -> Result<(), ReplaceError> {
        let replaced = self
            .record
            .pairs()
            .iter()
            .filter(|(_, s)| *s == PairState::Replaced)
            .count();
        if replaced > 0 && !confirmed {
            return Err(ReplaceError::SourceSwitchBlocked { replaced });
        }
        if replaced > 0 {
            tracing::warn!("discarding rollback state of {} replaced pair(s)", replaced);
        }
        self.record = ReplacementRecord::build(&self.matches, &source, graph);
        self.source = Some(source);
        Ok(())
    }

    pub fn source(&self) -> Result<&MatchedAsset, ReplaceError> {
        self.source.as_ref().ok_or(ReplaceError::NoSource)
    }

    /// Matched asset by its own path, excluding deleted ones
    pub fn matched(&self, path: &str) -> Result<&MatchedAsset, ReplaceError> {
        self.matches
            .find_by_path(path)
            .filter(|m| !self.deleted_paths.contains(&m.path))
            .ok_or_else(|| ReplaceError::UnknownAsset(path.to_string()))
    }

    fn category(&self, category: MatchCategory) -> Vec<&MatchedAsset> {
        match category {
            MatchCategory::Subject => vec![&self.matches.subject],
            MatchCategory::High => self.matches.high.iter().collect(),
            MatchCategory::Low => self.matches.low.iter().collect(),
        }
    }

    /// Whether pairs of this kind can be acted on with the current source
    fn kind_enabled(&self, kind: RefKind) -> bool {
        match kind {
            RefKind::Direct => true,
            RefKind::Container => self
                .source
                .as_ref()
                .is_some_and(|s| s.container.is_some()),
        }
    }

    fn jobs_for(&self, asset: &MatchedAsset, kind: RefKind) -> Vec<Job> {
        let is_source = self.source.as_ref().is_some_and(|s| s.id == asset.id);
        if is_source || !self.kind_enabled(kind) {
            return Vec::new();
        }
        let Some(path) = key_path(asset, kind) else {
            return Vec::new();
        };
        self.record
            .keys_for(kind, path)
            .into_iter()
            .map(|key| Job {
                key,
                asset: asset.clone(),
            })
            .collect()
    }

    fn resolve(&self, scope: &Scope) -> Result<Vec<Job>, ReplaceError> {
        let jobs = match scope {
            Scope::Category(category) => self
                .category(*category)
                .into_iter()
                .flat_map(|asset| {
                    let mut jobs = self.jobs_for(asset, RefKind::Direct);
                    jobs.extend(self.jobs_for(asset, RefKind::Container));
                    jobs
                })
                .collect(),
            Scope::Matched { path, kind } => {
                let asset = self.matched(path)?;
                self.jobs_for(asset, *kind)
            }
            Scope::Pair(key) => {
                if self.record.state(key).is_none() {
                    return Err(ReplaceError::UnknownAsset(key.matched_path.clone()));
                }
                let asset = self.matched(&key.matched_path)?;
                self.jobs_for(asset, key.kind)
                    .into_iter()
                    .filter(|job| job.key == *key)
                    .collect()
            }
        };
        Ok(jobs)
    }

    fn any_in_state(&self, scope: &Scope, state: PairState) -> bool {
        self.source.is_some()
            && self
                .resolve(scope)
                .map(|jobs| jobs.iter().any(|j| self.record.state(&j.key) == Some(state)))
                .unwrap_or(false)
    }

    pub fn can_replace(&self, scope: &Scope) -> bool {
        self.any_in_state(scope, PairState::NotReplaced)
    }

    pub fn can_revert(&self, scope: &Scope) -> bool {
        self.any_in_state(scope, PairState::Replaced)
    }

    /// Replace a single pair
    pub fn replace(
        &mut self,
        key: &PairKey,
        store: &mut GraphStore,
        resolver: &dyn IdentityResolver,
        content: &dyn ContentStore,
    ) -> Result<PairOutcome, ReplaceError> {
        let report = self.apply(&Scope::Pair(key.clone()), Direction::Replace, false, store, resolver, content)?;
        Ok(single_outcome(report))
    }

    /// Revert a single pair
    pub fn revert(
        &mut self,
        key: &PairKey,
        store: &mut GraphStore,
        resolver: &dyn IdentityResolver,
        content: &dyn ContentStore,
    ) -> Result<PairOutcome, ReplaceError> {
        let report = self.apply(&Scope::Pair(key.clone()), Direction::Revert, false, store, resolver, content)?;
        Ok(single_outcome(report))
    }

    pub fn replace_all(
        &mut self,
        scope: &Scope,
        delete_after: bool,
        store: &mut GraphStore,
        resolver: &dyn IdentityResolver,
        content: &dyn ContentStore,
    ) -> Result<BatchReport, ReplaceError> {
        self.apply(scope, Direction::Replace, delete_after, store, resolver, content)
    }

    pub fn revert_all(
        &mut self,
        scope: &Scope,
        store: &mut GraphStore,
        resolver: &dyn IdentityResolver,
        content: &dyn ContentStore,
    ) -> Result<BatchReport, ReplaceError> {
        self.apply(scope, Direction::Revert, false, store, resolver, content)
    }

    /// Run a batch: one read and one write per referencer, one graph update
    pub fn apply(
        &mut self,
        scope: &Scope,
        direction: Direction,
        delete_after: bool,
        store: &mut GraphStore,
        resolver: &dyn IdentityResolver,
        content: &dyn ContentStore,
    ) -> Result<BatchReport, ReplaceError> {
        let source = self.source()?.clone();
        let jobs = self.resolve(scope)?;
        let target = direction.target();
        let mut report = BatchReport::default();

        let mut by_referencer: BTreeMap<AssetId, Vec<Job>> = BTreeMap::new();
        for job in jobs {
            if self.record.state(&job.key) == Some(target) {
                report.outcomes.push((job.key, PairOutcome::Skipped));
            } else {
                by_referencer.entry(job.key.referencer).or_default().push(job);
            }
        }

        let mut touched = Vec::new();
        for (referencer, jobs) in by_referencer {
            let path = store
                .get_node(referencer)
                .map(|n| n.path.clone())
                .or_else(|| resolver.path_for_id(referencer));
            let Some(path) = path else {
                let reason = format!("no path for {}", referencer);
                report
                    .outcomes
                    .extend(jobs.into_iter().map(|j| (j.key, PairOutcome::Failed(reason.clone()))));
                continue;
            };
            let text = match content.read(&path) {
                Ok(bytes) => String::from_utf8(bytes).ok(),
                Err(e) => {
                    let reason = e.to_string();
                    report
                        .outcomes
                        .extend(jobs.into_iter().map(|j| (j.key, PairOutcome::Failed(reason.clone()))));
                    continue;
                }
            };
            let Some(mut text) = text else {
                report
                    .outcomes
                    .extend(jobs.into_iter().map(|j| (j.key, PairOutcome::Mismatch)));
                continue;
            };

            let mut applied = Vec::new();
            for job in jobs {
                let rewritten = match job.key.kind {
                    RefKind::Direct => {
                        let (from, to) = ends(direction, job.asset.id, source.id);
                        substitute_id(&text, from, to)
                    }
                    RefKind::Container => match (&job.asset.container, &source.container) {
                        (Some(matched), Some(src)) => {
                            let (from, to) = ends(direction, matched, src);
                            substitute_in_container(&text, from, to)
                        }
                        _ => None,
                    },
                };
                match rewritten {
                    Some(new_text) => {
                        text = new_text;
                        applied.push(job.key);
                    }
                    None => {
                        tracing::warn!(
                            "{}: expected reference for {} not found",
                            path,
                            job.key.matched_path
                        );
                        report.outcomes.push((job.key, PairOutcome::Mismatch));
                    }
                }
            }
            if applied.is_empty() {
                continue;
            }

            match content.write(&path, text.as_bytes()) {
                Ok(()) => {
                    for key in applied {
                        self.record.set(&key, target);
                        report.outcomes.push((key, PairOutcome::Applied));
                    }
                    touched.push(referencer);
                }
                Err(e) => {
                    let reason = e.to_string();
                    report
                        .outcomes
                        .extend(applied.into_iter().map(|k| (k, PairOutcome::Failed(reason.clone()))));
                }
            }
        }

        if delete_after && direction == Direction::Replace {
            report.deleted = self.delete_replaced(scope, store, content);
        }

        // One persist per batch, covering both rewrites and deletions
        if !touched.is_empty() {
            store.notify_content_changed(&touched, resolver, content);
        } else if !report.deleted.is_empty() {
            store.persist_or_warn();
        }

        Ok(report)
    }

    /// Delete matched assets of the scope whose direct pairs are all replaced
    fn delete_replaced(
        &mut self,
        scope: &Scope,
        store: &mut GraphStore,
        content: &dyn ContentStore,
    ) -> Vec<String> {
        let source_id = self.source.as_ref().map(|s| s.id);
        let candidates: BTreeSet<String> = match scope {
            Scope::Category(category) => self
                .category(*category)
                .into_iter()
                .map(|m| m.path.clone())
                .collect(),
            Scope::Matched {
                path,
                kind: RefKind::Direct,
            } => BTreeSet::from([path.clone()]),
            Scope::Pair(key) if key.kind == RefKind::Direct => {
                BTreeSet::from([key.matched_path.clone()])
            }
            Scope::Matched { .. } | Scope::Pair(_) => BTreeSet::new(),
        };

        let mut deleted = Vec::new();
        for path in candidates {
            if self.deleted_paths.contains(&path) {
                continue;
            }
            let Some(asset) = self.matches.find_by_path(&path).cloned() else {
                continue;
            };
            if Some(asset.id) == source_id {
                continue;
            }
            let all_replaced = self
                .record
                .keys_for(RefKind::Direct, &path)
                .iter()
                .all(|k| self.record.state(k) == Some(PairState::Replaced));
            if !all_replaced {
                tracing::info!("keeping {}: not every reference was replaced", path);
                continue;
            }

            if let Err(e) = content.delete(&path) {
                tracing::warn!("failed to delete {}: {}", path, e);
                continue;
            }
            self.record.purge(RefKind::Direct, &path);
            store.remove_asset(asset.id);
            self.deleted_paths.push(path.clone());
            deleted.push(path);
        }
        deleted
    }
}

fn single_outcome(report: BatchReport) -> PairOutcome {
    report
        .outcomes
        .into_iter()
        .next()
        .map(|(_, o)| o)
        .unwrap_or(PairOutcome::Skipped)
}

/// (from, to) for a direction, given the matched side and the source side
fn ends<T>(direction: Direction, matched: T, source: T) -> (T, T) {
    match direction {
        Direction::Replace => (matched, source),
        Direction::Revert => (source, matched),
    }
}

/// Replace every occurrence of `from` with `to`; None when `from` is absent
pub fn substitute_id(text: &str, from: AssetId, to: AssetId) -> Option<String> {
    let from = from.to_string();
    if !text.contains(&from) {
        return None;
    }
    Some(text.replace(&from, &to.to_string()))
}

/// Rewrite references into a container
///
/// Only lines naming both the container id and `fileID: <sub id>` change,
/// and both parts are rewritten. None when no line matched.
pub fn substitute_in_container(text: &str, from: &ContainerRef, to: &ContainerRef) -> Option<String> {
    let from_id = from.id.to_string();
    let to_id = to.id.to_string();
    let from_sub = format!("fileID: {}", from.sub_id);
    let to_sub = format!("fileID: {}", to.sub_id);

    let mut changed = false;
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        if line.contains(&from_id) && contains_token(line, &from_sub) {
            out.push_str(&replace_token(&line.replace(&from_id, &to_id), &from_sub, &to_sub));
            changed = true;
        } else {
            out.push_str(line);
        }
    }
    changed.then_some(out)
}

/// `needle` followed by a non-digit (so `fileID: 12` does not match `fileID: 123`)
fn contains_token(line: &str, needle: &str) -> bool {
    line.match_indices(needle).any(|(i, _)| {
        !line[i + needle.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    })
}

fn replace_token(line: &str, from: &str, to: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(i) = rest.find(from) {
        let after = &rest[i + from.len()..];
        out.push_str(&rest[..i]);
        if after.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            out.push_str(from);
        } else {
            out.push_str(to);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}
