//! Validated category layout, ready to be written to a store.
//!
//! A [`CategoryPlan`] is computed entirely before the store is touched, so
//! bad input never leaves a half-replaced tree behind.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::file_name;
use crate::tree::{build_forest, CategoryRow, FileRow, Forest};

/// A category and the name of its parent (`None` only for the root).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedCategory {
    pub name: String,
    pub parent: Option<String>,
}

/// A file and the category it is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedFile {
    pub doc_id: String,
    pub name: String,
    pub category: String,
}

/// Categories (root first, then in order of first mention) and file placements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryPlan {
    root: String,
    categories: Vec<PlannedCategory>,
    files: Vec<PlannedFile>,
    #[serde(skip)]
    warnings: Vec<String>,
}

impl CategoryPlan {
    /// Validate relations and file placements into a plan.
    ///
    /// - `relations`: `(parent, child)` category names.
    /// - `leaves`: categories that may hold files (final clusters and the
    ///   miscellaneous bucket).
    /// - `files`: `(doc_id, category)` placements.
    ///
    /// Self-relations, second parents and cycle-closing relations are dropped
    /// with a warning. Categories left without a parent hang off the root.
    pub fn build(
        root: &str,
        relations: &[(String, String)],
        leaves: &[String],
        files: &[(String, String)],
    ) -> Result<Self> {
        let root = root.trim();
        if root.is_empty() {
            return Err(Error::EmptyInput("root category name"));
        }
        if relations
            .iter()
            .any(|(p, c)| p.trim().is_empty() || c.trim().is_empty())
            || leaves.iter().any(|l| l.trim().is_empty())
        {
            return Err(Error::EmptyInput("category name"));
        }
        if leaves.iter().any(|l| l == root) {
            return Err(Error::InvalidParameter {
                name: "root_name",
                message: format!("'{root}' is also used as a file category"),
            });
        }

        let mut warnings = Vec::new();
        let mut order: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut parent_of: HashMap<String, String> = HashMap::new();

        let mut mention = |name: &str, order: &mut Vec<String>| {
            if name != root && seen.insert(name.to_string()) {
                order.push(name.to_string());
            }
        };

        for (parent, child) in relations {
            mention(parent, &mut order);
            mention(child, &mut order);

            if parent == child {
                warnings.push(format!("ignored self-relation on '{child}'"));
                continue;
            }
            if child == root {
                warnings.push(format!("ignored relation making root a child of '{parent}'"));
                continue;
            }
            if let Some(existing) = parent_of.get(child) {
                if existing != parent {
                    warnings.push(format!(
                        "'{child}' already under '{existing}'; ignored second parent '{parent}'"
                    ));
                }
                continue;
            }
            if is_ancestor(&parent_of, child, parent) {
                warnings.push(format!("ignored '{parent}' -> '{child}': would close a cycle"));
                continue;
            }
            parent_of.insert(child.clone(), parent.clone());
        }
        for leaf in leaves {
            mention(leaf, &mut order);
        }

        let leaf_set: HashSet<&str> = leaves.iter().map(String::as_str).collect();
        let mut placed: HashSet<&str> = HashSet::new();
        let mut planned_files = Vec::with_capacity(files.len());
        for (doc_id, category) in files {
            if !leaf_set.contains(category.as_str()) {
                return Err(Error::UnknownCategory {
                    doc_id: doc_id.clone(),
                    category: category.clone(),
                });
            }
            if !placed.insert(doc_id.as_str()) {
                warnings.push(format!("'{doc_id}' placed twice; kept first placement"));
                continue;
            }
            planned_files.push(PlannedFile {
                doc_id: doc_id.clone(),
                name: file_name(doc_id),
                category: category.clone(),
            });
        }

        for w in &warnings {
            warn!("{w}");
        }

        let mut categories = Vec::with_capacity(order.len() + 1);
        categories.push(PlannedCategory {
            name: root.to_string(),
            parent: None,
        });
        categories.extend(order.into_iter().map(|name| PlannedCategory {
            parent: Some(parent_of.get(&name).cloned().unwrap_or_else(|| root.to_string())),
            name,
        }));

        Ok(Self {
            root: root.to_string(),
            categories,
            files: planned_files,
            warnings,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// All categories, root first.
    pub fn categories(&self) -> &[PlannedCategory] {
        &self.categories
    }

    pub fn files(&self) -> &[PlannedFile] {
        &self.files
    }

    /// Relations dropped during validation.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn parent_of(&self, name: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.parent.as_deref())
    }

    /// Preview as a forest, numbering categories from 1 in plan order.
    pub fn preview(&self) -> Forest {
        let ids: HashMap<&str, i64> = self
            .categories
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.as_str(), i as i64 + 1))
            .collect();
        let categories = self
            .categories
            .iter()
            .map(|c| CategoryRow {
                id: ids[c.name.as_str()],
                name: c.name.clone(),
                parent_id: c.parent.as_deref().and_then(|p| ids.get(p).copied()),
            })
            .collect();
        let files = self
            .files
            .iter()
            .map(|f| FileRow {
                doc_id: f.doc_id.clone(),
                name: f.name.clone(),
                category_id: ids.get(f.category.as_str()).copied().unwrap_or_default(),
            })
            .collect();
        build_forest(categories, files)
    }
}

/// True when `node` is `start` or one of its ancestors.
fn is_ancestor(parent_of: &HashMap<String, String>, node: &str, start: &str) -> bool {
    let mut cur = start;
    let mut steps = 0;
    loop {
        if cur == node {
            return true;
        }
        match parent_of.get(cur) {
            Some(p) if steps <= parent_of.len() => {
                cur = p;
                steps += 1;
            }
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(p: &str, c: &str) -> (String, String) {
        (p.to_string(), c.to_string())
    }

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_basic_plan() {
        let plan = CategoryPlan::build(
            "Root",
            &[rel("Top", "Systems"), rel("Top", "Theory")],
            &s(&["Systems", "Theory"]),
            &[rel("/a/os.pdf", "Systems")],
        )
        .unwrap();
        let names: Vec<&str> = plan.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Root", "Top", "Systems", "Theory"]);
        assert_eq!(plan.parent_of("Top"), Some("Root"));
        assert_eq!(plan.parent_of("Systems"), Some("Top"));
        assert_eq!(plan.parent_of("Root"), None);
        assert_eq!(plan.files()[0].name, "os.pdf");
        assert!(plan.warnings().is_empty());
    }

    #[test]
    fn test_out_of_order_relations() {
        let plan = CategoryPlan::build(
            "Root",
            &[rel("Mid", "Leaf"), rel("Top", "Mid")],
            &s(&["Leaf"]),
            &[],
        )
        .unwrap();
        assert_eq!(plan.parent_of("Leaf"), Some("Mid"));
        assert_eq!(plan.parent_of("Mid"), Some("Top"));
        assert_eq!(plan.parent_of("Top"), Some("Root"));
    }

    #[test]
    fn test_rejects_self_cycle_and_second_parent() {
        let plan = CategoryPlan::build(
            "Root",
            &[
                rel("A", "A"),
                rel("A", "B"),
                rel("C", "B"),
                rel("B", "A"),
            ],
            &s(&["B"]),
            &[],
        )
        .unwrap();
        assert_eq!(plan.parent_of("B"), Some("A"));
        assert_eq!(plan.parent_of("A"), Some("Root"));
        assert_eq!(plan.parent_of("C"), Some("Root"));
        assert_eq!(plan.warnings().len(), 3);
    }

    #[test]
    fn test_unknown_file_category() {
        let err = CategoryPlan::build("Root", &[rel("Top", "A")], &s(&["A"]), &[rel("f", "Top")])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownCategory { .. }));
    }

    #[test]
    fn test_flat_single_group() {
        let plan = CategoryPlan::build("Root", &[], &s(&["Only"]), &[rel("f.txt", "Only")]).unwrap();
        assert_eq!(plan.categories().len(), 2);
        assert_eq!(plan.parent_of("Only"), Some("Root"));
    }

    #[test]
    fn test_empty_root_name() {
        assert!(CategoryPlan::build("  ", &[], &[], &[]).is_err());
        assert!(CategoryPlan::build("Root", &[], &s(&["Root"]), &[]).is_err());
    }

    #[test]
    fn test_preview_forest() {
        let plan = CategoryPlan::build(
            "Root",
            &[rel("Top", "b"), rel("Top", "A")],
            &s(&["A", "b", "Misc"]),
            &[rel("x.pdf", "b"), rel("y.pdf", "Misc")],
        )
        .unwrap();
        let forest = plan.preview();
        assert!(forest.issues.is_empty());
        assert_eq!(forest.roots.len(), 1);
        let root = &forest.roots[0];
        let names: Vec<&str> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Misc", "Top"]);
        assert_eq!(forest.file_count(), 2);
    }
}
