//! Per-group centroids.

use std::collections::HashMap;

use crate::error::{check_vectors, Error, Result};
use crate::models::{Label, NOISE};

/// One centroid per non-noise label, indexed `0..K-1` in ascending label order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CentroidStore {
    centroids: Vec<Vec<f32>>,
    labels: Vec<Label>,
    index_of: HashMap<Label, usize>,
}

impl CentroidStore {
    /// Mean of the raw vectors carrying each label. Noise rows are skipped.
    pub fn compute(vectors: &[Vec<f32>], labels: &[Label]) -> Result<Self> {
        if vectors.len() != labels.len() {
            return Err(Error::InputMismatch {
                what: "labels",
                expected: vectors.len(),
                found: labels.len(),
            });
        }
        let dims = check_vectors(vectors)?;

        let mut distinct: Vec<Label> = labels.iter().copied().filter(|&l| l != NOISE).collect();
        distinct.sort_unstable();
        distinct.dedup();
        let index_of: HashMap<Label, usize> =
            distinct.iter().enumerate().map(|(i, &l)| (l, i)).collect();

        let mut sums = vec![vec![0.0f64; dims]; distinct.len()];
        let mut counts = vec![0usize; distinct.len()];
        for (v, l) in vectors.iter().zip(labels) {
            let Some(&idx) = index_of.get(l) else {
                continue;
            };
            counts[idx] += 1;
            for (s, &x) in sums[idx].iter_mut().zip(v) {
                *s += x as f64;
            }
        }

        let centroids = sums
            .into_iter()
            .zip(counts)
            .map(|(sum, count)| sum.into_iter().map(|s| (s / count as f64) as f32).collect())
            .collect();

        Ok(Self {
            centroids,
            labels: distinct,
            index_of,
        })
    }

    /// Restrict to `keep` (labels not in the store are ignored), re-indexed ascending.
    pub fn retain(&self, keep: &[Label]) -> Self {
        let mut labels: Vec<Label> = keep
            .iter()
            .copied()
            .filter(|l| self.index_of.contains_key(l))
            .collect();
        labels.sort_unstable();
        labels.dedup();

        let centroids = labels
            .iter()
            .map(|l| self.centroids[self.index_of[l]].clone())
            .collect();
        let index_of = labels.iter().enumerate().map(|(i, &l)| (l, i)).collect();
        Self {
            centroids,
            labels,
            index_of,
        }
    }

    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    pub fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    /// Label of each centroid row.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn index_of(&self, label: Label) -> Option<usize> {
        self.index_of.get(&label).copied()
    }

    pub fn get(&self, label: Label) -> Option<&[f32]> {
        self.index_of(label).map(|i| self.centroids[i].as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mean_per_label() {
        let vectors = vec![
            vec![1.0, 0.0],
            vec![3.0, 2.0],
            vec![10.0, 10.0],
            vec![0.0, 4.0],
        ];
        let labels = vec![1, 1, -1, 0];
        let store = CentroidStore::compute(&vectors, &labels).unwrap();
        assert_eq!(store.labels(), &[0, 1]);
        assert_eq!(store.get(0), Some(&[0.0, 4.0][..]));
        assert_eq!(store.get(1), Some(&[2.0, 1.0][..]));
        assert_eq!(store.get(-1), None);
    }

    #[test]
    fn test_raw_vectors_not_normalized() {
        let store = CentroidStore::compute(&[vec![4.0, 0.0], vec![6.0, 0.0]], &[0, 0]).unwrap();
        assert_eq!(store.get(0), Some(&[5.0, 0.0][..]));
    }

    #[test]
    fn test_all_noise_is_empty() {
        let store = CentroidStore::compute(&[vec![1.0]], &[-1]).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_mismatch_errors() {
        assert!(CentroidStore::compute(&[vec![1.0]], &[0, 1]).is_err());
        assert!(CentroidStore::compute(&[vec![1.0], vec![1.0, 2.0]], &[0, 1]).is_err());
    }

    #[test]
    fn test_retain_reindexes() {
        let vectors = vec![vec![0.0], vec![1.0], vec![2.0]];
        let store = CentroidStore::compute(&vectors, &[0, 1, 2]).unwrap();
        let kept = store.retain(&[2, 0, 9]);
        assert_eq!(kept.labels(), &[0, 2]);
        assert_eq!(kept.index_of(2), Some(1));
        assert_eq!(kept.centroids(), &[vec![0.0], vec![2.0]]);
    }

    proptest! {
        #[test]
        fn prop_centroid_is_member_mean(
            rows in prop::collection::vec((0i32..3, -100i32..100), 1..40),
        ) {
            let vectors: Vec<Vec<f32>> = rows.iter().map(|&(_, x)| vec![x as f32]).collect();
            let labels: Vec<Label> = rows.iter().map(|&(l, _)| l).collect();
            let store = CentroidStore::compute(&vectors, &labels).unwrap();
            for &label in store.labels() {
                let members: Vec<f64> = rows
                    .iter()
                    .filter(|&&(l, _)| l == label)
                    .map(|&(_, x)| x as f64)
                    .collect();
                let mean = members.iter().sum::<f64>() / members.len() as f64;
                let got = store.get(label).unwrap()[0] as f64;
                prop_assert!((got - mean).abs() < 1e-3);
            }
        }
    }
}
