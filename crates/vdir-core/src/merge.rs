//! Average-linkage merging of group centroids into a category hierarchy.
//!
//! # Dendrogram encoding
//!
//! Leaves are the `K` groups, `0..K-1` in centroid-store order. Merge step
//! `i` creates node `K + i`, so the root is node `2K - 2`. This matches the
//! SciPy convention used by [`kodama`].
//!
//! # Cut
//!
//! The hierarchy keeps `K_target` flat ("final") clusters:
//!
//! ```text
//! K_target = clamp(max(min_target, ceil(K × ratio)), 2, K)
//! ```
//!
//! Average linkage is monotone, so applying the first `K − K_target` merges
//! is the same as cutting the dendrogram below the lowest remaining merge
//! distance, and it always yields exactly `K_target` clusters even when
//! distances tie.
//!
//! Merges above the cut become internal categories. Their children are
//! either other above-cut merges or final clusters; files only ever hang off
//! final clusters.

use std::fmt;

use kodama::{linkage as kodama_linkage, Method as KodamaMethod};
use serde::{Deserialize, Serialize};

use crate::centroid::CentroidStore;
use crate::error::{check_vectors, Error, Result};
use crate::models::Label;

/// One agglomeration step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergeStep {
    pub left: usize,
    pub right: usize,
    /// Average cosine distance between the two merged sets.
    pub distance: f64,
    /// Number of leaves under the new node.
    pub size: usize,
}

/// Full binary merge tree over `leaves` groups.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MergeTree {
    leaves: usize,
    steps: Vec<MergeStep>,
}

impl MergeTree {
    /// Run average linkage with cosine distance. Fewer than two vectors
    /// give a tree with no steps.
    pub fn build(vectors: &[Vec<f32>]) -> Result<Self> {
        check_vectors(vectors)?;
        let k = vectors.len();
        if k < 2 {
            return Ok(Self {
                leaves: k,
                steps: Vec::new(),
            });
        }

        // Condensed upper triangle, row-major.
        let mut condensed = Vec::with_capacity(k * (k - 1) / 2);
        for row in 0..k - 1 {
            for col in row + 1..k {
                condensed.push(cosine_distance(&vectors[row], &vectors[col]));
            }
        }

        let dend = kodama_linkage(&mut condensed, k, KodamaMethod::Average);
        let steps = dend
            .steps()
            .iter()
            .map(|s| MergeStep {
                left: s.cluster1.min(s.cluster2),
                right: s.cluster1.max(s.cluster2),
                distance: s.dissimilarity,
                size: s.size,
            })
            .collect();

        Ok(Self { leaves: k, steps })
    }

    pub fn leaves(&self) -> usize {
        self.leaves
    }

    pub fn steps(&self) -> &[MergeStep] {
        &self.steps
    }

    /// Step that created `node`, if it is a merge node.
    pub fn step(&self, node: usize) -> Option<&MergeStep> {
        node.checked_sub(self.leaves).and_then(|i| self.steps.get(i))
    }
}

/// `1 - cos(a, b)`, clamped to `[0, 2]`. A zero vector sits at distance 1
/// from everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (na.sqrt() * nb.sqrt())).clamp(0.0, 2.0)
}

/// A node of the hierarchy that needs a category name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeId {
    /// Final cluster `0..K_target-1`.
    Final(usize),
    /// Dendrogram node `K + i` above the cut.
    Merge(usize),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Final(i) => write!(f, "C{i}"),
            NodeId::Merge(i) => write!(f, "N{i}"),
        }
    }
}

/// Merger policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HierarchicalMerger {
    target_ratio: f64,
    min_target: usize,
}

impl Default for HierarchicalMerger {
    fn default() -> Self {
        Self {
            target_ratio: 0.3,
            min_target: 2,
        }
    }
}

impl HierarchicalMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of groups kept as final clusters. Must be in `(0, 1]`.
    pub fn with_target_ratio(mut self, ratio: f64) -> Self {
        self.target_ratio = ratio;
        self
    }

    pub fn with_min_target(mut self, min_target: usize) -> Self {
        self.min_target = min_target;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.target_ratio > 0.0 && self.target_ratio <= 1.0) {
            return Err(Error::InvalidParameter {
                name: "target_ratio",
                message: format!("must be in (0, 1], got {}", self.target_ratio),
            });
        }
        if self.min_target < 2 {
            return Err(Error::InvalidParameter {
                name: "min_target",
                message: format!("must be at least 2, got {}", self.min_target),
            });
        }
        Ok(())
    }

    /// Number of final clusters for `k` groups. Only meaningful for `k >= 2`.
    pub fn target_for(&self, k: usize) -> usize {
        let by_ratio = (k as f64 * self.target_ratio).ceil() as usize;
        by_ratio.max(self.min_target).clamp(2, k.max(2))
    }

    /// Build the hierarchy over the groups in `store`.
    pub fn merge(&self, store: &CentroidStore) -> Result<Hierarchy> {
        self.validate()?;
        let centroids = store.centroids();
        let groups = store.labels().to_vec();
        let k = centroids.len();
        let tree = MergeTree::build(centroids)?;

        if k < 2 {
            return Ok(Hierarchy {
                groups,
                assignment: vec![0; k],
                members: if k == 1 { vec![vec![0]] } else { Vec::new() },
                relations: Vec::new(),
                final_centroids: centroids.to_vec(),
                node_centroids: centroids.to_vec(),
                cut: 0,
                tree,
            });
        }

        let target = self.target_for(k);
        let cut = k - target;
        let steps = tree.steps();

        // Union-find restricted to the below-cut merges.
        let mut top: Vec<usize> = (0..2 * k - 1).collect();
        for (i, s) in steps.iter().take(cut).enumerate() {
            top[s.left] = k + i;
            top[s.right] = k + i;
        }
        let find = |mut x: usize| {
            while top[x] != x {
                x = top[x];
            }
            x
        };

        // Number final clusters by smallest member leaf.
        let mut final_of_top = vec![usize::MAX; 2 * k - 1];
        let mut assignment = vec![0usize; k];
        let mut members: Vec<Vec<usize>> = Vec::with_capacity(target);
        for leaf in 0..k {
            let t = find(leaf);
            if final_of_top[t] == usize::MAX {
                final_of_top[t] = members.len();
                members.push(Vec::new());
            }
            assignment[leaf] = final_of_top[t];
            members[final_of_top[t]].push(leaf);
        }

        let mut relations = Vec::with_capacity(2 * (target - 1));
        for (i, s) in steps.iter().enumerate().skip(cut) {
            let parent = NodeId::Merge(k + i);
            for child in [s.left, s.right] {
                let child = if child >= k + cut {
                    NodeId::Merge(child)
                } else {
                    NodeId::Final(final_of_top[find(child)])
                };
                relations.push((parent, child));
            }
        }

        let mut node_centroids: Vec<Vec<f32>> = centroids.to_vec();
        for s in steps {
            let c = mean_of(&[&node_centroids[s.left], &node_centroids[s.right]]);
            node_centroids.push(c);
        }

        let final_centroids = members
            .iter()
            .map(|m| {
                let rows: Vec<&Vec<f32>> = m.iter().map(|&leaf| &centroids[leaf]).collect();
                mean_of(&rows)
            })
            .collect();

        Ok(Hierarchy {
            groups,
            assignment,
            members,
            relations,
            final_centroids,
            node_centroids,
            cut,
            tree,
        })
    }
}

fn mean_of(rows: &[&Vec<f32>]) -> Vec<f32> {
    let dims = rows.first().map_or(0, |r| r.len());
    let mut sum = vec![0.0f64; dims];
    for r in rows {
        for (s, &x) in sum.iter_mut().zip(r.iter()) {
            *s += x as f64;
        }
    }
    let n = rows.len().max(1) as f64;
    sum.into_iter().map(|s| (s / n) as f32).collect()
}

/// Result of merging: the cut, the above-cut relations and every node centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct Hierarchy {
    groups: Vec<Label>,
    assignment: Vec<usize>,
    members: Vec<Vec<usize>>,
    relations: Vec<(NodeId, NodeId)>,
    final_centroids: Vec<Vec<f32>>,
    node_centroids: Vec<Vec<f32>>,
    cut: usize,
    tree: MergeTree,
}

impl Hierarchy {
    /// Number of input groups (`K`).
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of final clusters (`K_target`, or `K` when `K < 2`).
    pub fn final_count(&self) -> usize {
        self.members.len()
    }

    /// Group label of each leaf.
    pub fn groups(&self) -> &[Label] {
        &self.groups
    }

    /// Final cluster of each leaf.
    pub fn assignment(&self) -> &[usize] {
        &self.assignment
    }

    /// Final cluster owning the group `label`.
    pub fn final_of_group(&self, label: Label) -> Option<usize> {
        self.groups
            .iter()
            .position(|&g| g == label)
            .map(|leaf| self.assignment[leaf])
    }

    /// Group labels inside final cluster `id`.
    pub fn members(&self, id: usize) -> Vec<Label> {
        self.members
            .get(id)
            .map(|m| m.iter().map(|&leaf| self.groups[leaf]).collect())
            .unwrap_or_default()
    }

    /// `(parent, child)` pairs in merge creation order. Empty for a flat hierarchy.
    pub fn relations(&self) -> &[(NodeId, NodeId)] {
        &self.relations
    }

    /// Every node that needs a name: final clusters, then above-cut merges in
    /// creation order.
    pub fn nodes(&self) -> Vec<NodeId> {
        let k = self.groups.len();
        let mut nodes: Vec<NodeId> = (0..self.final_count()).map(NodeId::Final).collect();
        if k >= 2 {
            nodes.extend((k + self.cut..2 * k - 1).map(NodeId::Merge));
        }
        nodes
    }

    /// Topmost node, if any.
    pub fn root(&self) -> Option<NodeId> {
        match self.groups.len() {
            0 => None,
            1 => Some(NodeId::Final(0)),
            k => Some(NodeId::Merge(2 * k - 2)),
        }
    }

    /// Centroid of a final cluster or merge node.
    pub fn centroid(&self, node: NodeId) -> Option<&[f32]> {
        match node {
            NodeId::Final(i) => self.final_centroids.get(i),
            NodeId::Merge(i) => self.node_centroids.get(i),
        }
        .map(Vec::as_slice)
    }

    /// Centroid of any dendrogram node (leaf or merge), by SciPy index.
    pub fn dendrogram_centroid(&self, node: usize) -> Option<&[f32]> {
        self.node_centroids.get(node).map(Vec::as_slice)
    }

    pub fn tree(&self) -> &MergeTree {
        &self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn store(vectors: Vec<Vec<f32>>) -> CentroidStore {
        let labels: Vec<Label> = (0..vectors.len() as Label).collect();
        CentroidStore::compute(&vectors, &labels).unwrap()
    }

    fn five_with_outlier() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.1, 0.0],
            vec![1.0, 0.15, 0.0],
            vec![0.1, 1.0, 0.0],
            vec![0.15, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ]
    }

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-12);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-12);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-12);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_outlier_merges_last() {
        let tree = MergeTree::build(&five_with_outlier()).unwrap();
        assert_eq!(tree.steps().len(), 4);
        let last = tree.steps()[3];
        assert!(last.left == 4 || last.right == 4);
        assert_eq!(last.size, 5);
        for s in &tree.steps()[..3] {
            assert!(s.distance <= last.distance);
        }
    }

    #[test]
    fn test_target_for() {
        let m = HierarchicalMerger::new();
        assert_eq!(m.target_for(2), 2);
        assert_eq!(m.target_for(5), 2);
        assert_eq!(m.target_for(10), 3);
        assert_eq!(m.target_for(11), 4);
        assert_eq!(HierarchicalMerger::new().with_min_target(4).target_for(3), 3);
    }

    #[test]
    fn test_two_groups_single_root() {
        let h = HierarchicalMerger::new()
            .merge(&store(vec![vec![1.0, 0.0], vec![0.0, 1.0]]))
            .unwrap();
        assert_eq!(h.final_count(), 2);
        assert_eq!(h.root(), Some(NodeId::Merge(2)));
        assert_eq!(
            h.relations(),
            &[
                (NodeId::Merge(2), NodeId::Final(0)),
                (NodeId::Merge(2), NodeId::Final(1))
            ]
        );
        assert_eq!(h.nodes(), vec![NodeId::Final(0), NodeId::Final(1), NodeId::Merge(2)]);
    }

    #[test]
    fn test_cut_groups_pairs() {
        let h = HierarchicalMerger::new()
            .merge(&store(five_with_outlier()))
            .unwrap();
        // ceil(5 * 0.3) = 2 final clusters: the four near vectors and the outlier.
        assert_eq!(h.final_count(), 2);
        assert_eq!(h.members(0), vec![0, 1, 2, 3]);
        assert_eq!(h.members(1), vec![4]);
        assert_eq!(h.final_of_group(4), Some(1));
        assert_eq!(h.relations().len(), 2);
        assert!(h
            .relations()
            .iter()
            .all(|(p, _)| *p == NodeId::Merge(8)));
    }

    #[test]
    fn test_flat_when_fewer_than_two() {
        let h = HierarchicalMerger::new()
            .merge(&store(vec![vec![1.0, 2.0]]))
            .unwrap();
        assert_eq!(h.final_count(), 1);
        assert!(h.relations().is_empty());
        assert_eq!(h.root(), Some(NodeId::Final(0)));
        assert_eq!(h.centroid(NodeId::Final(0)), Some(&[1.0, 2.0][..]));

        let empty = HierarchicalMerger::new().merge(&CentroidStore::default()).unwrap();
        assert_eq!(empty.final_count(), 0);
        assert!(empty.nodes().is_empty());
        assert_eq!(empty.root(), None);
    }

    #[test]
    fn test_centroid_propagation() {
        let h = HierarchicalMerger::new()
            .with_target_ratio(1.0)
            .merge(&store(vec![vec![2.0, 0.0], vec![4.0, 0.2], vec![0.0, 6.0]]))
            .unwrap();
        let tree = h.tree().clone();
        for (i, s) in tree.steps().iter().enumerate() {
            let node = h.dendrogram_centroid(3 + i).unwrap();
            let l = h.dendrogram_centroid(s.left).unwrap();
            let r = h.dendrogram_centroid(s.right).unwrap();
            for d in 0..2 {
                assert!((node[d] - (l[d] + r[d]) / 2.0).abs() < 1e-6);
            }
        }
        // Nothing is merged below the cut when every group is its own final cluster.
        assert_eq!(h.final_count(), 3);
        assert_eq!(h.relations().len(), 4);
    }

    #[test]
    fn test_final_centroid_is_flat_mean() {
        let h = HierarchicalMerger::new()
            .merge(&store(vec![
                vec![1.0, 0.0, 0.0],
                vec![1.0, 0.1, 0.0],
                vec![1.0, 0.2, 0.0],
                vec![0.0, 0.0, 1.0],
            ]))
            .unwrap();
        assert_eq!(h.members(0), vec![0, 1, 2]);
        let c = h.centroid(NodeId::Final(0)).unwrap();
        assert!((c[1] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_policy() {
        let s = store(vec![vec![1.0], vec![2.0]]);
        assert!(HierarchicalMerger::new().with_target_ratio(0.0).merge(&s).is_err());
        assert!(HierarchicalMerger::new().with_min_target(1).merge(&s).is_err());
    }

    #[test]
    fn test_node_display() {
        assert_eq!(NodeId::Final(3).to_string(), "C3");
        assert_eq!(NodeId::Merge(12).to_string(), "N12");
    }

    proptest! {
        #[test]
        fn prop_target_in_range(k in 2usize..500, ratio in 0.01f64..=1.0, floor in 2usize..10) {
            let t = HierarchicalMerger::new()
                .with_target_ratio(ratio)
                .with_min_target(floor)
                .target_for(k);
            prop_assert!((2..=k).contains(&t));
        }

        #[test]
        fn prop_cut_yields_target_clusters(
            rows in prop::collection::vec(prop::collection::vec(0.1f32..10.0, 3), 2..25),
        ) {
            let merger = HierarchicalMerger::new();
            let h = merger.merge(&store(rows.clone())).unwrap();
            let target = merger.target_for(rows.len());
            prop_assert_eq!(h.final_count(), target);
            prop_assert_eq!(h.relations().len(), 2 * (target - 1));
            prop_assert!(h.relations().iter().all(|(p, _)| matches!(p, NodeId::Merge(_))));
        }
    }
}
