//! The `vdir run` pipeline.
//!
//! ```text
//! corpus ──▶ cluster ──▶ name ──▶ plan ──▶ store
//! ```
//!
//! Compute stages are synchronous and live in `vdir-core`; this module only
//! wires I/O around them. A corpus or planning failure aborts before the
//! store is opened, so the previous tree stays intact.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use vdir_core::engine::ClusterRun;
use vdir_core::labeling::{name_hierarchy, CorpusSearch, NamedHierarchy};
use vdir_core::plan::CategoryPlan;

use crate::config::Config;
use crate::corpus::create_source;
use crate::labeler::create_labeler;
use crate::store::{CategoryStore, PersistSummary};
use crate::tree_cmd::print_forest;

/// Everything a run produced, for callers that want more than stdout.
pub struct RunOutcome {
    pub chunks: usize,
    pub files: usize,
    pub run: ClusterRun,
    pub plan: CategoryPlan,
    /// `None` on a dry run.
    pub persisted: Option<PersistSummary>,
}

/// Load, cluster, name and plan, without touching the store.
pub async fn build_plan(
    config: &Config,
    corpus_override: Option<&Path>,
) -> Result<(usize, usize, ClusterRun, CategoryPlan)> {
    let source = create_source(&config.corpus, corpus_override)?;
    info!(source = %source.describe(), "loading corpus");
    let corpus = source
        .load()
        .await
        .with_context(|| format!("Failed to load corpus from {}", source.describe()))?;
    let chunks = corpus.len();
    let files = corpus.file_count();

    let engine = config.engine();
    let run = engine.cluster(&corpus)?;

    let named = match create_labeler(&config.labeling)? {
        Some(oracle) => {
            info!(provider = oracle.name(), nodes = run.hierarchy.nodes().len(), "naming categories");
            let search = CorpusSearch::new(corpus);
            let options = engine.naming_options(config.labeling.representatives);
            name_hierarchy(&run.hierarchy, &search, oracle.as_ref(), &options).await
        }
        None => {
            info!("labeling disabled; using placeholder names");
            NamedHierarchy::from_names(&run.hierarchy, BTreeMap::new())
        }
    };

    let plan = engine.plan(&run, &named)?;
    for warning in plan.warnings() {
        warn!("{warning}");
    }
    Ok((chunks, files, run, plan))
}

/// Run the full pipeline and print a summary. With `dry_run` the planned
/// tree is printed instead of stored.
pub async fn run_pipeline(
    config: &Config,
    corpus_override: Option<&Path>,
    dry_run: bool,
) -> Result<RunOutcome> {
    let (chunks, files, run, plan) = build_plan(config, corpus_override).await?;

    println!("Corpus:     {} chunks, {} files", chunks, files);
    println!(
        "Clusters:   {} ({} noise chunks)",
        run.cluster_count(),
        run.noise_count()
    );
    println!(
        "Hierarchy:  {} groups → {} categories",
        run.hierarchy.group_count(),
        run.hierarchy.final_count()
    );
    println!("Unassigned: {} files", run.resolved.unassigned().len());

    if dry_run {
        println!();
        println!("Planned tree (dry run, store untouched):");
        print_forest(&plan.preview());
        return Ok(RunOutcome {
            chunks,
            files,
            run,
            plan,
            persisted: None,
        });
    }

    let store = CategoryStore::open(config).await?;
    let summary = store.replace(&plan).await?;
    store.pool().close().await;

    println!(
        "Stored:     {} categories, {} files in {}",
        summary.categories,
        summary.files,
        config.db.path.display()
    );

    Ok(RunOutcome {
        chunks,
        files,
        run,
        plan,
        persisted: Some(summary),
    })
}
