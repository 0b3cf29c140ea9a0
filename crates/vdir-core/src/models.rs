//! Core data models shared by every stage of the engine.
//!
//! A [`VectorCorpus`] is the batch snapshot the engine works on: one
//! [`ChunkRecord`] per embedded chunk, many chunks per file.

use serde::{Deserialize, Serialize};

use crate::error::{check_vectors, Error, Result};

/// Cluster label assigned to a chunk. Dense-packed `0..K-1` per run.
pub type Label = i32;

/// Label reserved for chunks with no sufficiently dense neighbourhood.
pub const NOISE: Label = -1;

/// One embedded chunk as delivered by the vector corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Stable path-like identifier of the owning file.
    pub doc_id: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub chunk_index: i64,
    /// Short excerpt used as a human-readable representative.
    #[serde(default)]
    pub text: String,
}

/// Validated batch of chunk records with a single shared dimension.
#[derive(Debug, Clone, Default)]
pub struct VectorCorpus {
    records: Vec<ChunkRecord>,
    dims: usize,
}

impl VectorCorpus {
    /// Build a corpus, rejecting records whose vectors disagree in dimension
    /// or carry NaN or infinite components.
    pub fn new(records: Vec<ChunkRecord>) -> Result<Self> {
        let dims = match records.first() {
            Some(r) => r.vector.len(),
            None => 0,
        };
        for (row, r) in records.iter().enumerate() {
            if r.vector.len() != dims {
                return Err(Error::DimensionMismatch {
                    row,
                    expected: dims,
                    found: r.vector.len(),
                });
            }
            if let Some(col) = r.vector.iter().position(|x| !x.is_finite()) {
                return Err(Error::NonFiniteValue { row, col });
            }
        }
        Ok(Self { records, dims })
    }

    /// Build a corpus from parallel vector and metadata arrays.
    ///
    /// Fails fast when the arrays disagree in length.
    pub fn from_parts(vectors: Vec<Vec<f32>>, doc_ids: Vec<String>) -> Result<Self> {
        if vectors.len() != doc_ids.len() {
            return Err(Error::InputMismatch {
                what: "doc_ids",
                expected: vectors.len(),
                found: doc_ids.len(),
            });
        }
        check_vectors(&vectors)?;
        let records = vectors
            .into_iter()
            .zip(doc_ids)
            .enumerate()
            .map(|(i, (vector, doc_id))| ChunkRecord {
                doc_id,
                vector,
                page: 0,
                chunk_index: i as i64,
                text: String::new(),
            })
            .collect();
        Self::new(records)
    }

    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Vector dimension (0 for an empty corpus).
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of distinct files.
    pub fn file_count(&self) -> usize {
        let mut ids: Vec<&str> = self.records.iter().map(|r| r.doc_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    /// Copy out the vector matrix, row-aligned with [`records`](Self::records).
    pub fn vectors(&self) -> Vec<Vec<f32>> {
        self.records.iter().map(|r| r.vector.clone()).collect()
    }

    /// Owning file of each chunk, row-aligned with [`records`](Self::records).
    pub fn doc_ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.doc_id.as_str()).collect()
    }
}

/// Display name for a file: the final component of its `doc_id` path.
///
/// Handles both `/` and `\` separators since ids come from arbitrary hosts.
pub fn file_name(doc_id: &str) -> String {
    let trimmed = doc_id.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(doc_id)
        .to_string()
}
