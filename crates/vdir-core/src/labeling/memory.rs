//! In-memory [`RepresentativeSearch`] over a loaded corpus snapshot.
//!
//! Brute-force cosine similarity against every chunk vector. Chunks with an
//! empty excerpt are skipped and duplicate excerpts count once.

use std::cmp::Ordering;

use anyhow::Result;
use async_trait::async_trait;

use crate::merge::cosine_distance;
use crate::models::VectorCorpus;

use super::RepresentativeSearch;

/// Nearest chunks of a [`VectorCorpus`].
pub struct CorpusSearch {
    corpus: VectorCorpus,
}

impl CorpusSearch {
    pub fn new(corpus: VectorCorpus) -> Self {
        Self { corpus }
    }

    pub fn corpus(&self) -> &VectorCorpus {
        &self.corpus
    }

    /// Indices of all chunks ranked by distance to `query`, ties by index.
    fn ranked(&self, query: &[f32]) -> Vec<usize> {
        let mut scored: Vec<(usize, f64)> = self
            .corpus
            .records()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.vector.len() == query.len())
            .map(|(i, r)| (i, cosine_distance(query, &r.vector)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.into_iter().map(|(i, _)| i).collect()
    }
}

#[async_trait]
impl RepresentativeSearch for CorpusSearch {
    async fn representatives(&self, centroid: &[f32], k: usize) -> Result<Vec<String>> {
        let records = self.corpus.records();
        let mut out: Vec<String> = Vec::with_capacity(k);
        for i in self.ranked(centroid) {
            if out.len() >= k {
                break;
            }
            let text = records[i].text.trim();
            if text.is_empty() || out.iter().any(|t| t == text) {
                continue;
            }
            out.push(text.to_string());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkRecord;

    fn chunk(doc: &str, v: Vec<f32>, text: &str) -> ChunkRecord {
        ChunkRecord {
            doc_id: doc.into(),
            vector: v,
            page: 0,
            chunk_index: 0,
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn test_nearest_distinct_texts() {
        let corpus = VectorCorpus::new(vec![
            chunk("a", vec![1.0, 0.0], "paging and TLB"),
            chunk("a", vec![0.9, 0.1], "paging and TLB"),
            chunk("b", vec![0.8, 0.3], "virtual memory"),
            chunk("c", vec![0.0, 1.0], "relational algebra"),
            chunk("c", vec![0.7, 0.2], ""),
        ])
        .unwrap();
        let search = CorpusSearch::new(corpus);

        let texts = search.representatives(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(texts, vec!["paging and TLB", "virtual memory"]);

        let all = search.representatives(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2], "relational algebra");
    }

    #[tokio::test]
    async fn test_empty_corpus() {
        let search = CorpusSearch::new(VectorCorpus::default());
        assert!(search.representatives(&[1.0], 5).await.unwrap().is_empty());
    }
}
