//! Reference trees: who references the matched assets, transitively
//!
//! The forest is a flat pre-order list of rows. Each row knows its depth
//! and the matched asset it descends from, which is all the replacement
//! engine and the printers need.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::core::graph::DependencyGraph;
use crate::core::identity::AssetId;
use crate::core::matching::{MatchSet, MatchedAsset};

/// Grouping of matched assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchCategory {
    Subject,
    High,
    Low,
}

impl fmt::Display for MatchCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchCategory::Subject => write!(f, "search subject"),
            MatchCategory::High => write!(f, "high confidence"),
            MatchCategory::Low => write!(f, "low confidence"),
        }
    }
}

/// One row of the forest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "row", rename_all = "kebab-case")]
pub enum TreeRow {
    CategoryRoot {
        category: MatchCategory,
    },
    /// A matched asset, or its container when `via_container` is set
    MatchedAsset {
        id: AssetId,
        origin: usize,
        via_container: bool,
    },
    /// An asset referencing the row above it; depth 1 references the match
    ReferencingAsset {
        id: AssetId,
        origin: usize,
        depth: usize,
        via_container: bool,
    },
}

impl TreeRow {
    /// Indentation level when printed
    pub fn depth(&self) -> usize {
        match self {
            TreeRow::CategoryRoot { .. } => 0,
            TreeRow::MatchedAsset { .. } => 1,
            TreeRow::ReferencingAsset { depth, .. } => depth + 1,
        }
    }

    pub fn id(&self) -> Option<AssetId> {
        match self {
            TreeRow::CategoryRoot { .. } => None,
            TreeRow::MatchedAsset { id, .. } | TreeRow::ReferencingAsset { id, .. } => Some(*id),
        }
    }
}

/// Rows plus the matched assets they originate from
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReferenceForest {
    rows: Vec<TreeRow>,
    matched: Vec<(MatchCategory, MatchedAsset)>,
    missing: Vec<AssetId>,
}

impl ReferenceForest {
    /// Build the forest for every category of a match set
    pub fn build(matches: &MatchSet, graph: &DependencyGraph) -> Self {
        let mut forest = ReferenceForest::default();
        let categories = [
            (MatchCategory::Subject, std::slice::from_ref(&matches.subject)),
            (MatchCategory::High, matches.high.as_slice()),
            (MatchCategory::Low, matches.low.as_slice()),
        ];

        for (category, assets) in categories {
            if assets.is_empty() {
                continue;
            }
            forest.rows.push(TreeRow::CategoryRoot { category });
            for asset in assets {
                let origin = forest.matched.len();
                forest.matched.push((category, asset.clone()));
                forest.add_subtree(graph, asset.id, origin, false);
                if let Some(container) = &asset.container {
                    forest.add_subtree(graph, container.id, origin, true);
                }
            }
        }
        forest
    }

    fn add_subtree(&mut self, graph: &DependencyGraph, root: AssetId, origin: usize, via_container: bool) {
        if !graph.contains(root) {
            tracing::debug!("matched asset {} has no graph node", root);
            if !self.missing.contains(&root) {
                self.missing.push(root);
            }
            return;
        }
        self.rows.push(TreeRow::MatchedAsset {
            id: root,
            origin,
            via_container,
        });

        struct Frame {
            id: AssetId,
            children: Vec<AssetId>,
            next: usize,
        }

        let mut on_path: HashSet<AssetId> = HashSet::from([root]);
        let mut stack = vec![Frame {
            id: root,
            children: graph.back_references(root),
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let Some(&child) = frame.children.get(frame.next) else {
                on_path.remove(&frame.id);
                stack.pop();
                continue;
            };
            frame.next += 1;

            self.rows.push(TreeRow::ReferencingAsset {
                id: child,
                origin,
                depth: stack.len(),
                via_container,
            });
            // Shown, but not expanded again while it is an ancestor
            if !on_path.insert(child) {
                continue;
            }
            stack.push(Frame {
                id: child,
                children: graph.back_references(child),
                next: 0,
            });
        }
    }

    pub fn rows(&self) -> &[TreeRow] {
        &self.rows
    }

    pub fn matched(&self, origin: usize) -> Option<&(MatchCategory, MatchedAsset)> {
        self.matched.get(origin)
    }

    /// Matched ids (or container ids) without a graph node
    pub fn missing(&self) -> &[AssetId] {
        &self.missing
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::AssetNode;
    use crate::core::resolver::ContainerRef;
    use crate::core::testing::id;

    fn graph(edges: &[(u128, &[u128])]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for (n, deps) in edges {
            g.insert(AssetNode::new(
                id(*n),
                format!("Assets/{}.asset", n),
                String::new(),
                deps.iter().map(|d| id(*d)).collect(),
            ));
        }
        g.derive_back_references();
        g
    }

    fn matched(n: u128) -> MatchedAsset {
        MatchedAsset {
            id: id(n),
            path: format!("Assets/{}.asset", n),
            container: None,
            comparison: None,
        }
    }

    fn referencing(rows: &[TreeRow]) -> Vec<(u128, usize)> {
        rows.iter()
            .filter_map(|r| match r {
                TreeRow::ReferencingAsset { id, depth, .. } => Some((id.as_u128(), *depth)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_two_node_cycle_terminates() {
        // 1 -> 2 -> 1
        let g = graph(&[(1, &[2]), (2, &[1])]);
        let forest = ReferenceForest::build(&MatchSet::subject_only(matched(1)), &g);

        assert_eq!(forest.rows().len(), 4);
        assert_eq!(referencing(forest.rows()), vec![(2, 1), (1, 2)]);
    }

    #[test]
    fn test_self_loop_terminates() {
        let g = graph(&[(1, &[1])]);
        let forest = ReferenceForest::build(&MatchSet::subject_only(matched(1)), &g);
        assert_eq!(referencing(forest.rows()), vec![(1, 1)]);
    }

    #[test]
    fn test_chain_and_diamond() {
        // 2 -> 1, 3 -> 1, 4 -> 2, 4 -> 3
        let g = graph(&[(1, &[]), (2, &[1]), (3, &[1]), (4, &[2, 3])]);
        let forest = ReferenceForest::build(&MatchSet::subject_only(matched(1)), &g);
        assert_eq!(
            referencing(forest.rows()),
            vec![(2, 1), (4, 2), (3, 1), (4, 2)]
        );
    }

    #[test]
    fn test_categories_and_container_subtree() {
        let g = graph(&[(1, &[]), (2, &[]), (9, &[]), (5, &[2]), (6, &[9])]);
        let mut high = matched(2);
        high.container = Some(ContainerRef {
            id: id(9),
            path: "Assets/9.asset".to_string(),
            sub_id: "21300000".to_string(),
        });
        let set = MatchSet {
            subject: matched(1),
            high: vec![high],
            low: Vec::new(),
            unfingerprinted: 0,
        };

        let forest = ReferenceForest::build(&set, &g);
        let rows = forest.rows();
        assert_eq!(rows[0], TreeRow::CategoryRoot { category: MatchCategory::Subject });
        assert_eq!(rows[2], TreeRow::CategoryRoot { category: MatchCategory::High });
        assert_eq!(
            rows[3],
            TreeRow::MatchedAsset { id: id(2), origin: 1, via_container: false }
        );
        assert_eq!(
            rows[4],
            TreeRow::ReferencingAsset { id: id(5), origin: 1, depth: 1, via_container: false }
        );
        assert_eq!(
            rows[5],
            TreeRow::MatchedAsset { id: id(9), origin: 1, via_container: true }
        );
        assert_eq!(
            rows[6],
            TreeRow::ReferencingAsset { id: id(6), origin: 1, depth: 1, via_container: true }
        );
        assert_eq!(rows.len(), 7);
    }

    #[test]
    fn test_missing_match_is_skipped() {
        let g = graph(&[(1, &[])]);
        let set = MatchSet {
            subject: matched(1),
            high: vec![matched(7)],
            low: Vec::new(),
            unfingerprinted: 0,
        };
        let forest = ReferenceForest::build(&set, &g);
        assert_eq!(forest.missing(), &[id(7)]);
        assert_eq!(forest.rows().len(), 3);
    }
}
