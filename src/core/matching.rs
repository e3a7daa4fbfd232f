//! Fingerprint matching of a subject against candidate images

use serde::{Deserialize, Serialize};

use crate::core::config::Config;
use crate::core::fingerprint::{
    Comparison, Fingerprint, FingerprintError, FingerprintProvider, MatchConfidence, Thresholds,
};
use crate::core::graph::DependencyGraph;
use crate::core::identity::AssetId;
use crate::core::resolver::{ContainerRef, IdentityResolver};
use crate::core::task::{CancelToken, Progress, Step, Task};

/// An asset taking part in a match, with its container if packed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedAsset {
    pub id: AssetId,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerRef>,
    /// Scores against the subject; absent for the subject itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Comparison>,
}

impl MatchedAsset {
    pub fn new(id: AssetId, path: String, resolver: &dyn IdentityResolver) -> Self {
        let container = resolver.container_of(&path);
        Self {
            id,
            path,
            container,
            comparison: None,
        }
    }
}

/// Output of a matching run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSet {
    pub subject: MatchedAsset,
    #[serde(default)]
    pub high: Vec<MatchedAsset>,
    #[serde(default)]
    pub low: Vec<MatchedAsset>,
    /// Candidates skipped for lack of a fingerprint
    #[serde(default)]
    pub unfingerprinted: usize,
}

impl MatchSet {
    /// A set holding only the subject
    pub fn subject_only(subject: MatchedAsset) -> Self {
        Self {
            subject,
            high: Vec::new(),
            low: Vec::new(),
            unfingerprinted: 0,
        }
    }

    /// Subject, then high, then low confidence matches
    pub fn all(&self) -> impl Iterator<Item = &MatchedAsset> {
        std::iter::once(&self.subject)
            .chain(self.high.iter())
            .chain(self.low.iter())
    }

    pub fn find_by_path(&self, path: &str) -> Option<&MatchedAsset> {
        self.all().find(|m| m.path == path)
    }

    pub fn find_by_id(&self, id: AssetId) -> Option<&MatchedAsset> {
        self.all().find(|m| m.id == id)
    }
}

/// Graph nodes that are comparable images, sorted by path
pub fn candidates(graph: &DependencyGraph, config: &Config, subject: AssetId) -> Vec<(AssetId, String)> {
    let root = config.compare_root().map(|r| format!("{}/", r));
    let mut found: Vec<(AssetId, String)> = graph
        .nodes()
        .into_iter()
        .filter(|n| n.id != subject && config.is_texture_path(&n.path))
        .filter(|n| root.as_deref().map_or(true, |r| n.path.starts_with(r)))
        .map(|n| (n.id, n.path.clone()))
        .collect();
    found.sort_by(|a, b| a.1.cmp(&b.1));
    found
}

/// One-comparison-per-step matcher
pub struct MatchTask<'a> {
    provider: &'a dyn FingerprintProvider,
    resolver: &'a dyn IdentityResolver,
    cancel: CancelToken,
    thresholds: Thresholds,
    subject: MatchedAsset,
    subject_fingerprint: Fingerprint,
    candidates: Vec<(AssetId, String)>,
    cursor: usize,
    high: Vec<MatchedAsset>,
    low: Vec<MatchedAsset>,
    unfingerprinted: usize,
}

impl<'a> MatchTask<'a> {
    pub fn new(
        subject: MatchedAsset,
        candidates: Vec<(AssetId, String)>,
        provider: &'a dyn FingerprintProvider,
        resolver: &'a dyn IdentityResolver,
        thresholds: Thresholds,
        cancel: CancelToken,
    ) -> Result<Self, FingerprintError> {
        let subject_fingerprint = provider
            .get_or_compute(subject.id)
            .ok_or_else(|| FingerprintError::Missing(subject.path.clone()))?;
        Ok(Self {
            provider,
            resolver,
            cancel,
            thresholds,
            subject,
            subject_fingerprint,
            candidates,
            cursor: 0,
            high: Vec::new(),
            low: Vec::new(),
            unfingerprinted: 0,
        })
    }

    fn compare_one(&mut self, id: AssetId, path: String) {
        let Some(fingerprint) = self.provider.get_or_compute(id) else {
            self.unfingerprinted += 1;
            return;
        };
        let comparison = self.thresholds.compare(&self.subject_fingerprint, &fingerprint);
        let bucket = match comparison.confidence {
            MatchConfidence::High => &mut self.high,
            MatchConfidence::Low => &mut self.low,
            MatchConfidence::None => return,
        };
        tracing::debug!(
            "{} matches with {:?} confidence (distance {}, similarity {:.3})",
            path,
            comparison.confidence,
            comparison.hash_distance,
            comparison.histogram_similarity
        );
        let mut matched = MatchedAsset::new(id, path, self.resolver);
        matched.comparison = Some(comparison);
        bucket.push(matched);
    }
}

impl Task for MatchTask<'_> {
    type Output = MatchSet;

    fn step(&mut self) -> Step<MatchSet> {
        if self.cancel.is_cancelled() {
            return Step::Cancelled;
        }
        let Some((id, path)) = self.candidates.get(self.cursor).cloned() else {
            return Step::Done(MatchSet {
                subject: self.subject.clone(),
                high: std::mem::take(&mut self.high),
                low: std::mem::take(&mut self.low),
                unfingerprinted: self.unfingerprinted,
            });
        };
        self.cursor += 1;
        self.compare_one(id, path);
        Step::Yield
    }

    fn progress(&self) -> Progress {
        Progress {
            done: self.cursor,
            total: self.candidates.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fingerprint::JsonFingerprintStore;
    use crate::core::graph::AssetNode;
    use crate::core::task::{run_to_completion, TaskOutcome};
    use crate::core::testing::{id, MemoryWorld};

    fn fp(hash: &str, histogram: &[f64]) -> Fingerprint {
        Fingerprint {
            hash: hash.parse().unwrap(),
            histogram: histogram.to_vec(),
        }
    }

    fn graph(paths: &[(u128, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for (n, path) in paths {
            g.insert(AssetNode::new(id(*n), path.to_string(), String::new(), Vec::new()));
        }
        g
    }

    #[test]
    fn test_candidates_filter_extension_root_and_subject() {
        let g = graph(&[
            (1, "Assets/ui/a.png"),
            (2, "Assets/ui/b.PNG"),
            (3, "Assets/ui/c.prefab"),
            (4, "Assets/fx/d.png"),
        ]);
        let config = Config {
            compare_root: Some("Assets/ui/".to_string()),
            ..Default::default()
        };
        assert_eq!(
            candidates(&g, &config, id(1)),
            vec![(id(2), "Assets/ui/b.PNG".to_string())]
        );
    }

    #[test]
    fn test_match_task_classifies() {
        let world = MemoryWorld::new();
        let mut store = JsonFingerprintStore::default();
        store.insert(id(1), fp("00000000", &[0.5, 0.5]));
        store.insert(id(2), fp("00000000", &[0.5, 0.5]));
        store.insert(id(3), fp("00000111", &[0.5, 0.5]));
        store.insert(id(4), fp("11111111", &[1.0, 0.0]));

        let subject = MatchedAsset::new(id(1), "a.png".to_string(), &world);
        let candidates = vec![
            (id(2), "b.png".to_string()),
            (id(3), "c.png".to_string()),
            (id(4), "d.png".to_string()),
            (id(5), "e.png".to_string()),
        ];
        let mut task = MatchTask::new(
            subject,
            candidates,
            &store,
            &world,
            Thresholds::default(),
            CancelToken::new(),
        )
        .unwrap();

        let TaskOutcome::Completed(set) = run_to_completion(&mut task, |_| {}) else {
            panic!("expected completion");
        };
        assert_eq!(set.high.len(), 1);
        assert_eq!(set.high[0].id, id(2));
        assert_eq!(set.high[0].comparison.unwrap().hash_distance, 0);
        assert_eq!(set.low.len(), 1);
        assert_eq!(set.low[0].id, id(3));
        assert_eq!(set.unfingerprinted, 1);
    }

    #[test]
    fn test_match_task_requires_subject_fingerprint() {
        let world = MemoryWorld::new();
        let store = JsonFingerprintStore::default();
        let subject = MatchedAsset::new(id(1), "a.png".to_string(), &world);
        let err = MatchTask::new(
            subject,
            Vec::new(),
            &store,
            &world,
            Thresholds::default(),
            CancelToken::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, FingerprintError::Missing(_)));
    }

    #[test]
    fn test_matched_asset_carries_container() {
        let world = MemoryWorld::new();
        let atlas = ContainerRef {
            id: id(9),
            path: "ui.spriteatlas".to_string(),
            sub_id: "2100".to_string(),
        };
        world.set_container("icon.png", atlas.clone());
        let m = MatchedAsset::new(id(1), "icon.png".to_string(), &world);
        assert_eq!(m.container, Some(atlas));
    }
}
