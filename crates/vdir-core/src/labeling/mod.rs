//! Naming hierarchy nodes through an external label oracle.
//!
//! For every node that becomes a category (final clusters first, then the
//! above-cut merges in creation order) the namer:
//!
//! 1. asks a [`RepresentativeSearch`] for the `k` texts nearest the node
//!    centroid,
//! 2. hands those texts to a [`LabelOracle`],
//! 3. cleans the answer and makes it unique.
//!
//! Any failure along the way gives the node a placeholder name
//! (`"Unlabeled C3"`). Naming never aborts a run.

pub mod memory;

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::merge::{Hierarchy, NodeId};

pub use memory::CorpusSearch;

/// Nearest-neighbour lookup of representative texts for a centroid.
#[async_trait]
pub trait RepresentativeSearch: Send + Sync {
    /// Up to `k` texts closest to `centroid`, best first.
    async fn representatives(&self, centroid: &[f32], k: usize) -> Result<Vec<String>>;
}

/// Produces a short category name from representative texts.
///
/// Implementations may call remote services and may fail; failures are
/// absorbed by [`name_hierarchy`].
#[async_trait]
pub trait LabelOracle: Send + Sync {
    /// Provider identifier for logs (e.g. `"keywords"`).
    fn name(&self) -> &str;

    async fn label(&self, texts: &[String]) -> Result<String>;
}

/// Knobs for [`name_hierarchy`].
#[derive(Debug, Clone)]
pub struct NamingOptions {
    /// Representative sample size per node.
    pub representatives: usize,
    /// Names no node may take (root, miscellaneous bucket).
    pub reserved: Vec<String>,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            representatives: 5,
            reserved: Vec::new(),
        }
    }
}

/// Placeholder used when a node cannot be named.
pub fn placeholder(node: NodeId) -> String {
    format!("Unlabeled {node}")
}

/// Normalize raw oracle output: first non-blank line, no `Label:` prefix,
/// no surrounding quotes.
pub fn clean_label(raw: &str) -> String {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");

    let mut s = line;
    if s.get(..6).is_some_and(|p| p.eq_ignore_ascii_case("label:")) {
        s = s[6..].trim_start();
    }

    loop {
        let trimmed = s
            .trim()
            .trim_start_matches(['"', '\'', '`', '“', '‘'])
            .trim_end_matches(['"', '\'', '`', '”', '’']);
        if trimmed == s {
            break;
        }
        s = trimmed;
    }
    s.trim().to_string()
}

/// Category names for a [`Hierarchy`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedHierarchy {
    names: BTreeMap<NodeId, String>,
    final_names: Vec<String>,
    relations: Vec<(String, String)>,
    root: Option<String>,
}

impl NamedHierarchy {
    /// Build from explicit names. Nodes missing from `names` get their placeholder.
    pub fn from_names(hierarchy: &Hierarchy, names: BTreeMap<NodeId, String>) -> Self {
        let name_of = |node: NodeId| names.get(&node).cloned().unwrap_or_else(|| placeholder(node));
        let final_names = (0..hierarchy.final_count())
            .map(|i| name_of(NodeId::Final(i)))
            .collect();
        let relations = hierarchy
            .relations()
            .iter()
            .map(|&(p, c)| (name_of(p), name_of(c)))
            .collect();
        let root = hierarchy.root().map(name_of);
        Self {
            names,
            final_names,
            relations,
            root,
        }
    }

    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.names.get(&node).map(String::as_str)
    }

    /// Name of final cluster `id`.
    pub fn final_name(&self, id: usize) -> Option<&str> {
        self.final_names.get(id).map(String::as_str)
    }

    pub fn final_names(&self) -> &[String] {
        &self.final_names
    }

    /// `(parent, child)` name pairs in merge creation order.
    pub fn relations(&self) -> &[(String, String)] {
        &self.relations
    }

    /// Name of the topmost hierarchy node.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }
}

/// Name every node of `hierarchy`.
pub async fn name_hierarchy(
    hierarchy: &Hierarchy,
    search: &dyn RepresentativeSearch,
    oracle: &dyn LabelOracle,
    options: &NamingOptions,
) -> NamedHierarchy {
    let mut used: HashSet<String> = options.reserved.iter().cloned().collect();
    let mut names = BTreeMap::new();

    for node in hierarchy.nodes() {
        let raw = propose(hierarchy, node, search, oracle, options.representatives).await;
        let base = raw.unwrap_or_else(|| placeholder(node));

        let mut name = base.clone();
        let mut attempt = 1;
        while used.contains(&name) {
            name = if attempt == 1 {
                format!("{base}_{node}")
            } else {
                format!("{base}_{node}_{attempt}")
            };
            attempt += 1;
        }
        debug!(%node, name = %name, "named node");
        used.insert(name.clone());
        names.insert(node, name);
    }

    NamedHierarchy::from_names(hierarchy, names)
}

async fn propose(
    hierarchy: &Hierarchy,
    node: NodeId,
    search: &dyn RepresentativeSearch,
    oracle: &dyn LabelOracle,
    k: usize,
) -> Option<String> {
    let centroid = hierarchy.centroid(node)?;

    let texts = match search.representatives(centroid, k).await {
        Ok(t) if t.is_empty() => {
            warn!(%node, "no representative texts; using placeholder");
            return None;
        }
        Ok(t) => t,
        Err(e) => {
            warn!(%node, error = %e, "representative search failed; using placeholder");
            return None;
        }
    };

    match oracle.label(&texts).await {
        Ok(raw) => {
            let cleaned = clean_label(&raw);
            if cleaned.is_empty() {
                warn!(%node, oracle = oracle.name(), "blank label; using placeholder");
                None
            } else {
                Some(cleaned)
            }
        }
        Err(e) => {
            warn!(%node, oracle = oracle.name(), error = %e, "labeling failed; using placeholder");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::centroid::CentroidStore;
    use crate::merge::HierarchicalMerger;
    use anyhow::bail;

    struct FixedSearch(Vec<String>);

    #[async_trait]
    impl RepresentativeSearch for FixedSearch {
        async fn representatives(&self, _centroid: &[f32], k: usize) -> Result<Vec<String>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    struct FailingSearch;

    #[async_trait]
    impl RepresentativeSearch for FailingSearch {
        async fn representatives(&self, _centroid: &[f32], _k: usize) -> Result<Vec<String>> {
            bail!("vector store unreachable")
        }
    }

    struct Constant(&'static str);

    #[async_trait]
    impl LabelOracle for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        async fn label(&self, _texts: &[String]) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl LabelOracle for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn label(&self, _texts: &[String]) -> Result<String> {
            bail!("timeout")
        }
    }

    fn hierarchy() -> Hierarchy {
        let vectors = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        let store = CentroidStore::compute(&vectors, &[0, 1, 2]).unwrap();
        HierarchicalMerger::new()
            .with_target_ratio(1.0)
            .merge(&store)
            .unwrap()
    }

    #[test]
    fn test_clean_label() {
        assert_eq!(clean_label("  \"Operating Systems\"  "), "Operating Systems");
        assert_eq!(clean_label("Label: Databases\nbecause..."), "Databases");
        assert_eq!(clean_label("\n\nlabel: 'Networks'"), "Networks");
        assert_eq!(clean_label("“Compilers”"), "Compilers");
        assert_eq!(clean_label("   "), "");
    }

    #[tokio::test]
    async fn test_duplicates_get_node_suffix() {
        let h = hierarchy();
        let named = name_hierarchy(
            &h,
            &FixedSearch(vec!["text".into()]),
            &Constant("Same"),
            &NamingOptions::default(),
        )
        .await;

        let nodes = h.nodes();
        assert_eq!(named.name(nodes[0]), Some("Same"));
        assert_eq!(named.name(nodes[1]), Some("Same_C1"));
        assert_eq!(named.name(nodes[2]), Some("Same_C2"));
        let mut all: Vec<&str> = nodes.iter().filter_map(|&n| named.name(n)).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), nodes.len());
    }

    #[tokio::test]
    async fn test_oracle_failure_gives_placeholder() {
        let h = hierarchy();
        let named = name_hierarchy(
            &h,
            &FixedSearch(vec!["text".into()]),
            &Broken,
            &NamingOptions::default(),
        )
        .await;
        assert_eq!(named.final_name(0), Some("Unlabeled C0"));
        assert_eq!(named.root(), Some("Unlabeled N4"));
    }

    #[tokio::test]
    async fn test_search_failure_and_empty_sample() {
        let h = hierarchy();
        let failed = name_hierarchy(&h, &FailingSearch, &Constant("X"), &NamingOptions::default()).await;
        assert_eq!(failed.final_name(1), Some("Unlabeled C1"));

        let empty = name_hierarchy(
            &h,
            &FixedSearch(Vec::new()),
            &Constant("X"),
            &NamingOptions::default(),
        )
        .await;
        assert_eq!(empty.final_name(2), Some("Unlabeled C2"));
    }

    #[tokio::test]
    async fn test_blank_label_and_reserved_names() {
        let h = hierarchy();
        let blank = name_hierarchy(
            &h,
            &FixedSearch(vec!["t".into()]),
            &Constant("  \n "),
            &NamingOptions::default(),
        )
        .await;
        assert_eq!(blank.final_name(0), Some("Unlabeled C0"));

        let reserved = name_hierarchy(
            &h,
            &FixedSearch(vec!["t".into()]),
            &Constant("AI Virtual Directory"),
            &NamingOptions {
                representatives: 3,
                reserved: vec!["AI Virtual Directory".into()],
            },
        )
        .await;
        assert_eq!(reserved.final_name(0), Some("AI Virtual Directory_C0"));
    }

    #[tokio::test]
    async fn test_relations_by_name() {
        let h = hierarchy();
        let named = name_hierarchy(
            &h,
            &FixedSearch(vec!["t".into()]),
            &Broken,
            &NamingOptions::default(),
        )
        .await;
        for (parent, child) in named.relations() {
            assert!(parent.starts_with("Unlabeled N"));
            assert!(child.starts_with("Unlabeled"));
        }
        assert_eq!(named.relations().len(), 4);
    }
}
