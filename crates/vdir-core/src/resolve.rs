//! File-level majority vote over chunk labels.
//!
//! A file owns many chunks and the density clusterer labels chunks, so each
//! file takes the label most of its non-noise chunks carry. Ties go to the
//! smaller label. Files whose chunks are all noise stay unassigned.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Label, NOISE};

/// Where a file ended up after the vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "label")]
pub enum Assignment {
    Group(Label),
    Unassigned,
}

impl Assignment {
    pub fn group(&self) -> Option<Label> {
        match self {
            Assignment::Group(l) => Some(*l),
            Assignment::Unassigned => None,
        }
    }
}

/// What happens to files with no non-noise chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnassignedPolicy {
    /// Drop them from the hierarchy.
    #[default]
    Exclude,
    /// File them under a bucket category directly below the root.
    Miscellaneous,
}

/// Per-file assignments, ordered by `doc_id`.
#[derive(Debug, Clone, Default)]
pub struct ResolvedFiles {
    assignments: BTreeMap<String, Assignment>,
    votes: BTreeMap<String, BTreeMap<Label, usize>>,
}

/// Resolve each file's group from its chunks' labels.
///
/// `labels[i]` and `doc_ids[i]` describe the same chunk.
pub fn resolve_files<S: AsRef<str>>(labels: &[Label], doc_ids: &[S]) -> Result<ResolvedFiles> {
    if labels.len() != doc_ids.len() {
        return Err(Error::InputMismatch {
            what: "labels",
            expected: doc_ids.len(),
            found: labels.len(),
        });
    }

    let mut votes: BTreeMap<String, BTreeMap<Label, usize>> = BTreeMap::new();
    for (&label, doc_id) in labels.iter().zip(doc_ids) {
        let tally = votes.entry(doc_id.as_ref().to_string()).or_default();
        if label != NOISE {
            *tally.entry(label).or_insert(0) += 1;
        }
    }

    let assignments = votes
        .iter()
        .map(|(doc_id, tally)| {
            // BTreeMap iterates labels ascending, so the first max wins ties.
            let mut best: Option<(Label, usize)> = None;
            for (&label, &count) in tally {
                if best.map_or(true, |(_, c)| count > c) {
                    best = Some((label, count));
                }
            }
            let assignment = match best {
                Some((label, _)) => Assignment::Group(label),
                None => Assignment::Unassigned,
            };
            (doc_id.clone(), assignment)
        })
        .collect();

    Ok(ResolvedFiles { assignments, votes })
}

impl ResolvedFiles {
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn get(&self, doc_id: &str) -> Option<Assignment> {
        self.assignments.get(doc_id).copied()
    }

    /// All `(doc_id, assignment)` pairs in `doc_id` order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Assignment)> {
        self.assignments.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Distinct labels that own at least one file, ascending.
    pub fn assigned_groups(&self) -> Vec<Label> {
        let mut groups: Vec<Label> = self.assignments.values().filter_map(|a| a.group()).collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }

    /// Files whose group is `label`.
    pub fn files_in(&self, label: Label) -> Vec<&str> {
        self.iter()
            .filter(|(_, a)| *a == Assignment::Group(label))
            .map(|(d, _)| d)
            .collect()
    }

    /// Files without any non-noise chunk.
    pub fn unassigned(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, a)| *a == Assignment::Unassigned)
            .map(|(d, _)| d)
            .collect()
    }

    /// Non-noise vote tally for a file, ascending by label.
    pub fn votes(&self, doc_id: &str) -> Vec<(Label, usize)> {
        self.votes
            .get(doc_id)
            .map(|t| t.iter().map(|(&l, &c)| (l, c)).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_two_vs_one_split() {
        let labels = [3, 3, 7];
        let docs = ["a.pdf", "a.pdf", "a.pdf"];
        let resolved = resolve_files(&labels, &docs).unwrap();
        assert_eq!(resolved.get("a.pdf"), Some(Assignment::Group(3)));
        assert_eq!(resolved.votes("a.pdf"), vec![(3, 2), (7, 1)]);
    }

    #[test]
    fn test_tie_goes_to_smaller_label() {
        let resolved = resolve_files(&[5, 2, 5, 2], &["x", "x", "x", "x"]).unwrap();
        assert_eq!(resolved.get("x"), Some(Assignment::Group(2)));
    }

    #[test]
    fn test_noise_is_ignored_in_vote() {
        let resolved = resolve_files(&[-1, -1, -1, 4], &["x", "x", "x", "x"]).unwrap();
        assert_eq!(resolved.get("x"), Some(Assignment::Group(4)));
    }

    #[test]
    fn test_all_noise_is_unassigned() {
        let resolved = resolve_files(&[-1, -1, 0], &["x", "x", "y"]).unwrap();
        assert_eq!(resolved.get("x"), Some(Assignment::Unassigned));
        assert_eq!(resolved.unassigned(), vec!["x"]);
        assert_eq!(resolved.files_in(0), vec!["y"]);
        assert_eq!(resolved.assigned_groups(), vec![0]);
    }

    #[test]
    fn test_length_mismatch() {
        let err = resolve_files(&[0, 1], &["a"]).unwrap_err();
        assert!(matches!(err, Error::InputMismatch { .. }));
    }

    #[test]
    fn test_ordered_by_doc_id() {
        let resolved = resolve_files(&[0, 1, 0], &["c", "a", "b"]).unwrap();
        let ids: Vec<&str> = resolved.iter().map(|(d, _)| d).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(resolved.assigned_groups(), vec![0, 1]);
    }

    #[test]
    fn test_policy_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrap {
            p: UnassignedPolicy,
        }
        let w: Wrap = serde_json::from_str(r#"{"p":"miscellaneous"}"#).unwrap();
        assert_eq!(w.p, UnassignedPolicy::Miscellaneous);
    }

    proptest! {
        #[test]
        fn prop_resolved_is_mode_of_non_noise(labels in prop::collection::vec(-1i32..4, 1..30)) {
            let docs = vec!["f"; labels.len()];
            let resolved = resolve_files(&labels, &docs).unwrap();

            let mut counts = [0usize; 4];
            for &l in labels.iter().filter(|&&l| l != NOISE) {
                counts[l as usize] += 1;
            }
            let max = counts.iter().copied().max().unwrap_or(0);
            let expected = if max == 0 {
                Assignment::Unassigned
            } else {
                let l = counts.iter().position(|&c| c == max).unwrap();
                Assignment::Group(l as Label)
            };
            prop_assert_eq!(resolved.get("f"), Some(expected));
        }
    }
}
