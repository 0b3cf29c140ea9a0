//! Sequential compute pipeline: density → resolve → centroids → merge.
//!
//! Naming is async and lives in [`labeling`](crate::labeling); the caller
//! runs it between [`Engine::cluster`] and [`Engine::plan`].

use tracing::{debug, info};

use crate::centroid::CentroidStore;
use crate::density::{cluster_count, DensityClusterer};
use crate::error::{Error, Result};
use crate::labeling::{NamedHierarchy, NamingOptions};
use crate::merge::{HierarchicalMerger, Hierarchy};
use crate::models::{Label, VectorCorpus, NOISE};
use crate::plan::CategoryPlan;
use crate::resolve::{resolve_files, Assignment, ResolvedFiles, UnassignedPolicy};

/// Output of the compute stages for one corpus snapshot.
#[derive(Debug, Clone)]
pub struct ClusterRun {
    /// Chunk labels, row-aligned with the corpus.
    pub labels: Vec<Label>,
    pub resolved: ResolvedFiles,
    /// Centroids of the groups that own at least one file.
    pub centroids: CentroidStore,
    pub hierarchy: Hierarchy,
}

impl ClusterRun {
    /// Distinct non-noise chunk labels.
    pub fn cluster_count(&self) -> usize {
        cluster_count(&self.labels)
    }

    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == NOISE).count()
    }
}

/// Clustering and hierarchy policy for a run.
#[derive(Debug, Clone)]
pub struct Engine {
    clusterer: DensityClusterer,
    merger: HierarchicalMerger,
    policy: UnassignedPolicy,
    root_name: String,
    miscellaneous_name: String,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(DensityClusterer::default(), HierarchicalMerger::default())
    }
}

impl Engine {
    pub fn new(clusterer: DensityClusterer, merger: HierarchicalMerger) -> Self {
        Self {
            clusterer,
            merger,
            policy: UnassignedPolicy::Exclude,
            root_name: "AI Virtual Directory".to_string(),
            miscellaneous_name: "Unclassified".to_string(),
        }
    }

    pub fn with_unassigned(mut self, policy: UnassignedPolicy, bucket: impl Into<String>) -> Self {
        self.policy = policy;
        self.miscellaneous_name = bucket.into();
        self
    }

    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    /// Naming options that keep node names clear of the root and bucket.
    pub fn naming_options(&self, representatives: usize) -> NamingOptions {
        NamingOptions {
            representatives,
            reserved: vec![self.root_name.clone(), self.miscellaneous_name.clone()],
        }
    }

    /// Run every compute stage over `corpus`.
    pub fn cluster(&self, corpus: &VectorCorpus) -> Result<ClusterRun> {
        let vectors = corpus.vectors();
        let labels = self.clusterer.fit(&vectors)?;
        info!(
            chunks = labels.len(),
            clusters = cluster_count(&labels),
            noise = labels.iter().filter(|&&l| l == NOISE).count(),
            "density clustering done"
        );

        let resolved = resolve_files(&labels, &corpus.doc_ids())?;
        let groups = resolved.assigned_groups();
        info!(
            files = resolved.len(),
            groups = groups.len(),
            unassigned = resolved.unassigned().len(),
            "files resolved"
        );

        let centroids = CentroidStore::compute(&vectors, &labels)?.retain(&groups);
        let hierarchy = self.merger.merge(&centroids)?;
        debug!(
            groups = hierarchy.group_count(),
            finals = hierarchy.final_count(),
            relations = hierarchy.relations().len(),
            "hierarchy merged"
        );

        Ok(ClusterRun {
            labels,
            resolved,
            centroids,
            hierarchy,
        })
    }

    /// Turn a named run into a validated category plan.
    pub fn plan(&self, run: &ClusterRun, named: &NamedHierarchy) -> Result<CategoryPlan> {
        let mut leaves: Vec<String> = named.final_names().to_vec();
        let mut files = Vec::with_capacity(run.resolved.len());
        let mut bucket_used = false;

        for (doc_id, assignment) in run.resolved.iter() {
            match assignment {
                Assignment::Group(label) => {
                    let category = run
                        .hierarchy
                        .final_of_group(label)
                        .and_then(|id| named.final_name(id))
                        .ok_or_else(|| Error::UnknownCategory {
                            doc_id: doc_id.to_string(),
                            category: format!("group {label}"),
                        })?;
                    files.push((doc_id.to_string(), category.to_string()));
                }
                Assignment::Unassigned => {
                    if self.policy == UnassignedPolicy::Miscellaneous {
                        bucket_used = true;
                        files.push((doc_id.to_string(), self.miscellaneous_name.clone()));
                    }
                }
            }
        }
        if bucket_used {
            leaves.push(self.miscellaneous_name.clone());
        }

        CategoryPlan::build(&self.root_name, named.relations(), &leaves, &files)
    }
}
