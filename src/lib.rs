//! # vdir
//!
//! Builds an AI virtual directory: a named category tree over a corpus of
//! embedded document chunks, stored in SQLite.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────┐   ┌──────────┐
//! │   Corpus    │──▶│      vdir-core       │──▶│  SQLite  │
//! │ JSONL/Qdrant│   │ HDBSCAN → vote →     │   │ category │
//! └─────────────┘   │ centroids → linkage  │   │  + file  │
//!                   └──────────┬───────────┘   └────┬─────┘
//!                              │ names              │
//!                        ┌─────▼─────┐     ┌────────┴────────┐
//!                        │  Labeler  │     ▼                 ▼
//!                        │ kw/OpenAI │ ┌──────────┐    ┌──────────┐
//!                        └───────────┘ │   CLI    │    │   HTTP   │
//!                                      │  (tree)  │    │ (viewer) │
//!                                      └──────────┘    └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vdir init                     # create database
//! vdir run --dry-run            # preview the hierarchy
//! vdir run                      # cluster, name and store
//! vdir tree                     # print the stored tree
//! vdir serve                    # start the viewer API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`corpus`] | JSONL and Qdrant corpus sources |
//! | [`labeler`] | Label providers |
//! | [`pipeline`] | The `run` command |
//! | [`store`] | Category tree persistence and reconstruction |
//! | [`tree_cmd`] | The `tree` command |
//! | [`server`] | Viewer HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod corpus;
pub mod db;
pub mod labeler;
pub mod migrate;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod tree_cmd;
