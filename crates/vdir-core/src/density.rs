//! Density-based chunk clustering (HDBSCAN).
//!
//! # The Algorithm (Campello, Moulavi & Sander, 2013)
//!
//! HDBSCAN groups points by density without being told how many groups to
//! find. Unlike a fixed-radius DBSCAN it tolerates clusters of different
//! density and size, and it marks points in sparse regions as noise instead of
//! forcing them into the nearest group.
//!
//! ## Steps
//!
//! 1. **Core distance**: distance from each point to its `min_samples`-th
//!    nearest neighbour (the point itself counts as the first).
//! 2. **Mutual reachability**: `mr(a, b) = max(core(a), core(b), d(a, b))`.
//!    Sparse points are pushed away from everything else.
//! 3. **Minimum spanning tree** over mutual reachability (dense Prim).
//! 4. **Single-linkage hierarchy**: MST edges sorted ascending, merged with a
//!    union-find. Merge `i` creates node `n + i`.
//! 5. **Condensed tree**: walk the hierarchy top-down; a split only creates
//!    two new clusters when both sides hold at least `min_cluster_size`
//!    points. Smaller sides "fall out" of the parent as individual points.
//! 6. **Stability & selection**: each cluster's stability is
//!    `Σ (λ_point − λ_birth) × size` with `λ = 1 / distance`. Excess of mass
//!    keeps a cluster when it is more stable than the sum of its children.
//! 7. **Labeling**: every point takes the selected cluster it belongs to, or
//!    noise when it only belongs to the root.
//!
//! ## Complexity
//!
//! - **Time**: O(n² · D) distance evaluations.
//! - **Space**: O(n · D); no distance matrix is materialized.
//!
//! ## Determinism
//!
//! All ties resolve towards the lower index, MST edges sort by
//! `(weight, low endpoint, high endpoint)`, and selected clusters are numbered
//! in condensed-tree order. Identical input gives identical labels.

use serde::{Deserialize, Serialize};

use crate::error::{check_vectors, Error, Result};
use crate::models::{Label, NOISE};

/// Distances below this are treated as this value when converting to λ.
const MIN_DISTANCE: f64 = 1e-12;

/// Distance used between chunk vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// L2-normalize, then Euclidean. Monotone in cosine distance.
    #[default]
    Cosine,
    /// Raw Euclidean distance.
    Euclidean,
}

/// HDBSCAN clusterer over chunk embeddings.
#[derive(Debug, Clone)]
pub struct DensityClusterer {
    min_cluster_size: usize,
    min_samples: Option<usize>,
    metric: DistanceMetric,
    allow_single_cluster: bool,
}

/// One step of the single-linkage hierarchy.
#[derive(Debug, Clone, Copy)]
struct LinkageStep {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

/// One edge of the condensed tree. `child < n` is a point, otherwise a cluster.
#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

impl DensityClusterer {
    /// Create a clusterer. `min_samples` defaults to `min_cluster_size`.
    pub fn new(min_cluster_size: usize) -> Self {
        Self {
            min_cluster_size,
            min_samples: None,
            metric: DistanceMetric::Cosine,
            allow_single_cluster: false,
        }
    }

    /// Set the density-estimation neighbourhood size.
    pub fn with_min_samples(mut self, min_samples: Option<usize>) -> Self {
        self.min_samples = min_samples;
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Allow the whole dataset to come out as one cluster.
    pub fn with_allow_single_cluster(mut self, allow: bool) -> Self {
        self.allow_single_cluster = allow;
        self
    }

    pub fn min_cluster_size(&self) -> usize {
        self.min_cluster_size
    }

    /// Effective `min_samples`.
    pub fn min_samples(&self) -> usize {
        self.min_samples.unwrap_or(self.min_cluster_size)
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn validate(&self) -> Result<()> {
        if self.min_cluster_size < 2 {
            return Err(Error::InvalidParameter {
                name: "min_cluster_size",
                message: format!("must be at least 2, got {}", self.min_cluster_size),
            });
        }
        if self.min_samples == Some(0) {
            return Err(Error::InvalidParameter {
                name: "min_samples",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Cluster `data`, returning one label per row (`-1` = noise).
    ///
    /// An empty input yields an empty result; a single point is noise.
    pub fn fit(&self, data: &[Vec<f32>]) -> Result<Vec<Label>> {
        self.validate()?;
        let n = data.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        check_vectors(data)?;
        if n == 1 {
            return Ok(vec![NOISE]);
        }

        let points = self.prepare(data);
        let core = core_distances(&points, self.min_samples());
        let mst = mutual_reachability_mst(&points, &core);
        let hierarchy = single_linkage(mst, n);
        let condensed = condense_tree(&hierarchy, n, self.min_cluster_size);
        let selected = select_clusters(&condensed, n, self.allow_single_cluster);
        Ok(assign_labels(&condensed, &selected, n))
    }

    fn prepare(&self, data: &[Vec<f32>]) -> Vec<Vec<f64>> {
        data.iter()
            .map(|v| {
                let v: Vec<f64> = v.iter().map(|&x| x as f64).collect();
                match self.metric {
                    DistanceMetric::Euclidean => v,
                    DistanceMetric::Cosine => {
                        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
                        if norm > 0.0 {
                            v.into_iter().map(|x| x / norm).collect()
                        } else {
                            v
                        }
                    }
                }
            })
            .collect()
    }
}

impl Default for DensityClusterer {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Number of distinct non-noise labels.
pub fn cluster_count(labels: &[Label]) -> usize {
    let mut seen: Vec<Label> = labels.iter().copied().filter(|&l| l != NOISE).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

#[inline]
fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn core_distances(points: &[Vec<f64>], min_samples: usize) -> Vec<f64> {
    let n = points.len();
    let k = min_samples.clamp(1, n) - 1;
    let mut row = vec![0.0f64; n];
    points
        .iter()
        .map(|p| {
            for (j, q) in points.iter().enumerate() {
                row[j] = euclidean(p, q);
            }
            let (_, kth, _) = row.select_nth_unstable_by(k, |a, b| a.total_cmp(b));
            *kth
        })
        .collect()
}

/// Dense Prim over mutual reachability. Returns `n - 1` edges.
fn mutual_reachability_mst(points: &[Vec<f64>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = points.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0usize;
    in_tree[current] = true;

    for _ in 1..n {
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let d = euclidean(&points[current], &points[j])
                .max(core[current])
                .max(core[j]);
            if d < best[j] {
                best[j] = d;
                from[j] = current;
            }
        }

        let mut next = usize::MAX;
        for j in 0..n {
            if !in_tree[j] && (next == usize::MAX || best[j] < best[next]) {
                next = j;
            }
        }

        in_tree[next] = true;
        edges.push((from[next], next, best[next]));
        current = next;
    }

    edges
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    let mut root = x;
    while parent[root] != root {
        root = parent[root];
    }
    while parent[x] != root {
        let up = parent[x];
        parent[x] = root;
        x = up;
    }
    root
}

fn single_linkage(mut mst: Vec<(usize, usize, f64)>, n: usize) -> Vec<LinkageStep> {
    mst.sort_by(|a, b| {
        a.2.total_cmp(&b.2)
            .then_with(|| a.0.min(a.1).cmp(&b.0.min(b.1)))
            .then_with(|| a.0.max(a.1).cmp(&b.0.max(b.1)))
    });

    let total = 2 * n - 1;
    let mut parent: Vec<usize> = (0..total).collect();
    let mut size = vec![1usize; total];
    let mut steps = Vec::with_capacity(n - 1);

    for (i, (a, b, w)) in mst.into_iter().enumerate() {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        let node = n + i;
        parent[ra] = node;
        parent[rb] = node;
        size[node] = size[ra] + size[rb];
        steps.push(LinkageStep {
            left: ra.min(rb),
            right: ra.max(rb),
            distance: w,
            size: size[node],
        });
    }

    steps
}

fn subtree_bfs(hierarchy: &[LinkageStep], root: usize, n: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut frontier = vec![root];
    while !frontier.is_empty() {
        out.extend_from_slice(&frontier);
        let mut next = Vec::new();
        for node in frontier {
            if node >= n {
                let step = &hierarchy[node - n];
                next.push(step.left);
                next.push(step.right);
            }
        }
        frontier = next;
    }
    out
}

fn condense_tree(hierarchy: &[LinkageStep], n: usize, min_cluster_size: usize) -> Vec<CondensedEdge> {
    let root = 2 * n - 2;
    let size_of = |node: usize| if node < n { 1 } else { hierarchy[node - n].size };

    let mut relabel = vec![0usize; root + 1];
    relabel[root] = n;
    let mut next_label = n + 1;
    let mut ignore = vec![false; root + 1];
    let mut edges = Vec::new();

    for node in subtree_bfs(hierarchy, root, n) {
        if ignore[node] || node < n {
            continue;
        }
        let step = hierarchy[node - n];
        let lambda = 1.0 / step.distance.max(MIN_DISTANCE);
        let (left, right) = (step.left, step.right);
        let (left_count, right_count) = (size_of(left), size_of(right));
        let parent = relabel[node];

        // Emits every point under `side` as falling out of `parent` at `lambda`.
        let spill = |side: usize, edges: &mut Vec<CondensedEdge>, ignore: &mut [bool]| {
            for sub in subtree_bfs(hierarchy, side, n) {
                if sub < n {
                    edges.push(CondensedEdge {
                        parent,
                        child: sub,
                        lambda,
                        size: 1,
                    });
                }
                ignore[sub] = true;
            }
        };

        if left_count >= min_cluster_size && right_count >= min_cluster_size {
            for (side, count) in [(left, left_count), (right, right_count)] {
                relabel[side] = next_label;
                next_label += 1;
                edges.push(CondensedEdge {
                    parent,
                    child: relabel[side],
                    lambda,
                    size: count,
                });
            }
        } else if left_count < min_cluster_size && right_count < min_cluster_size {
            spill(left, &mut edges, &mut ignore);
            spill(right, &mut edges, &mut ignore);
        } else if left_count < min_cluster_size {
            relabel[right] = parent;
            spill(left, &mut edges, &mut ignore);
        } else {
            relabel[left] = parent;
            spill(right, &mut edges, &mut ignore);
        }
    }

    edges
}

/// Excess-of-mass selection. Returns `is_selected[cluster - n]`.
fn select_clusters(condensed: &[CondensedEdge], n: usize, allow_single_cluster: bool) -> Vec<bool> {
    let num_clusters = condensed
        .iter()
        .map(|e| e.parent.max(if e.child >= n { e.child } else { n }))
        .max()
        .map(|m| m - n + 1)
        .unwrap_or(1);

    let mut birth = vec![0.0f64; num_clusters];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); num_clusters];
    for e in condensed.iter().filter(|e| e.child >= n) {
        birth[e.child - n] = e.lambda;
        children[e.parent - n].push(e.child - n);
    }

    let mut stability = vec![0.0f64; num_clusters];
    for e in condensed {
        let c = e.parent - n;
        stability[c] += (e.lambda - birth[c]) * e.size as f64;
    }

    let mut selected = vec![false; num_clusters];
    for c in (0..num_clusters).rev() {
        if c == 0 && !allow_single_cluster {
            break;
        }
        let subtree: f64 = children[c].iter().map(|&ch| stability[ch]).sum();
        if subtree > stability[c] {
            stability[c] = subtree;
        } else {
            selected[c] = true;
            let mut stack = children[c].clone();
            while let Some(d) = stack.pop() {
                selected[d] = false;
                stack.extend_from_slice(&children[d]);
            }
        }
    }

    selected
}

/// Map every point to the label of its selected ancestor, or noise.
///
/// A selected root only keeps points that fall out of it no earlier than its
/// last split; points shed at lower lambda stay noise.
fn assign_labels(condensed: &[CondensedEdge], selected: &[bool], n: usize) -> Vec<Label> {
    let mut point_parent = vec![n; n];
    let mut point_lambda = vec![0.0f64; n];
    let mut cluster_parent = vec![n; selected.len()];
    let mut root_lambda = 0.0f64;
    for e in condensed {
        if e.child < n {
            point_parent[e.child] = e.parent;
            point_lambda[e.child] = e.lambda;
        } else {
            cluster_parent[e.child - n] = e.parent;
        }
        if e.parent == n {
            root_lambda = root_lambda.max(e.lambda);
        }
    }

    let mut label_of = vec![NOISE; selected.len()];
    let mut next: Label = 0;
    for (c, &is_selected) in selected.iter().enumerate() {
        if is_selected {
            label_of[c] = next;
            next += 1;
        }
    }

    point_parent
        .into_iter()
        .enumerate()
        .map(|(point, mut cluster)| loop {
            let c = cluster - n;
            if c == 0 {
                break if selected[0] && point_lambda[point] >= root_lambda {
                    label_of[0]
                } else {
                    NOISE
                };
            }
            if selected[c] {
                break label_of[c];
            }
            cluster = cluster_parent[c];
        })
        .collect()
}
