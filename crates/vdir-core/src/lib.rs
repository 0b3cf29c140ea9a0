//! # vdir core
//!
//! Runtime-free clustering and hierarchy logic for the AI virtual directory:
//! density clustering of chunk embeddings, file majority vote, centroids,
//! average-linkage merging with a dynamic cut, node naming through a pluggable
//! oracle, category plan validation and tree reconstruction.
//!
//! This crate contains no tokio, sqlx, network or filesystem I/O. The `vdir`
//! application crate supplies corpus sources, label providers and the SQLite
//! store.

pub mod centroid;
pub mod density;
pub mod engine;
pub mod error;
pub mod labeling;
pub mod merge;
pub mod models;
pub mod plan;
pub mod resolve;
pub mod tree;

pub use error::{Error, Result};
