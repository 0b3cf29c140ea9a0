//! Error types for the `vdir-core` crate.

use thiserror::Error;

/// Errors raised by the clustering and hierarchy engine.
///
/// Only input problems are errors. Degenerate data (no dense groups, fewer
/// than two groups to merge) has documented fallbacks and never reaches this
/// type; labeling failures are absorbed as placeholder names.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Two parallel inputs disagree in length.
    #[error("input mismatch: {what} has {found} entries, expected {expected}")]
    InputMismatch {
        /// Which input was out of step.
        what: &'static str,
        /// Expected length.
        expected: usize,
        /// Actual length.
        found: usize,
    },

    /// A vector does not share the dimension of the first vector.
    #[error("dimension mismatch at row {row}: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Offending row index.
        row: usize,
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// A vector component is NaN or infinite.
    #[error("non-finite value at row {row}, column {col}")]
    NonFiniteValue {
        /// Offending row index.
        row: usize,
        /// Offending component.
        col: usize,
    },

    /// A required input was empty.
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    /// A tuning parameter is out of range.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// A file was placed in a category the plan does not know as a final cluster.
    #[error("file '{doc_id}' references unknown category '{category}'")]
    UnknownCategory {
        /// The file being placed.
        doc_id: String,
        /// The category name that did not resolve.
        category: String,
    },
}

/// Result alias for `vdir-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Check that every vector has the dimension of the first one and holds
/// only finite components.
///
/// Returns the shared dimension (0 for an empty slice).
pub(crate) fn check_vectors(vectors: &[Vec<f32>]) -> Result<usize> {
    let dim = match vectors.first() {
        Some(v) => v.len(),
        None => return Ok(0),
    };
    if let Some((row, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dim) {
        return Err(Error::DimensionMismatch {
            row,
            expected: dim,
            found: v.len(),
        });
    }
    check_finite(vectors)?;
    Ok(dim)
}

/// Reject NaN and infinite components.
fn check_finite(vectors: &[Vec<f32>]) -> Result<()> {
    for (row, v) in vectors.iter().enumerate() {
        if let Some(col) = v.iter().position(|x| !x.is_finite()) {
            return Err(Error::NonFiniteValue { row, col });
        }
    }
    Ok(())
}
