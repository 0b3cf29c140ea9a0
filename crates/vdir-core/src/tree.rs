//! Reconstruct the category forest from flat rows.
//!
//! Rows come straight from the store. Before linking, every row is checked:
//!
//! | Problem | Handling |
//! |---------|----------|
//! | `parent_id` points at a missing category | [`TreeIssue::Orphan`], surfaced as a root |
//! | parent chain loops | [`TreeIssue::Cycle`], loop broken at its lowest id |
//! | file points at a missing category | [`TreeIssue::DanglingFile`], dropped |
//! | repeated category id | [`TreeIssue::DuplicateCategory`], first row kept |
//!
//! Proper roots (`NULL` parent) come first, then the recovered ones. Children
//! and files are ordered by case-insensitive name at every level.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A `category` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
}

/// A `file` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRow {
    pub doc_id: String,
    pub name: String,
    pub category_id: i64,
}

/// A file as shown in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub doc_id: String,
    pub name: String,
    /// Location of the file; the `doc_id` itself.
    pub path: String,
}

/// A category with its resolved children and files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub children: Vec<TreeNode>,
    pub files: Vec<FileEntry>,
}

impl TreeNode {
    /// Depth-first search for `id` in this subtree.
    pub fn find(&self, id: i64) -> Option<&TreeNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// Categories in this subtree, including `self`.
    pub fn category_count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::category_count).sum::<usize>()
    }

    /// Files in this subtree.
    pub fn file_count(&self) -> usize {
        self.files.len() + self.children.iter().map(TreeNode::file_count).sum::<usize>()
    }
}

/// Integrity problem found while rebuilding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeIssue {
    Orphan { category_id: i64, parent_id: i64 },
    Cycle { category_ids: Vec<i64> },
    DanglingFile { doc_id: String, category_id: i64 },
    DuplicateCategory { category_id: i64 },
}

impl fmt::Display for TreeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeIssue::Orphan {
                category_id,
                parent_id,
            } => write!(
                f,
                "category {category_id} references missing parent {parent_id}; shown as a root"
            ),
            TreeIssue::Cycle { category_ids } => {
                let head = category_ids.first().copied().unwrap_or_default();
                write!(f, "parent cycle among categories {category_ids:?}; broken at {head}")
            }
            TreeIssue::DanglingFile {
                doc_id,
                category_id,
            } => write!(f, "file '{doc_id}' references missing category {category_id}; skipped"),
            TreeIssue::DuplicateCategory { category_id } => {
                write!(f, "category id {category_id} appears more than once; first row kept")
            }
        }
    }
}

/// Reconstructed forest plus whatever was wrong with the rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forest {
    pub roots: Vec<TreeNode>,
    pub issues: Vec<TreeIssue>,
}

impl Forest {
    pub fn find(&self, id: i64) -> Option<&TreeNode> {
        self.roots.iter().find_map(|r| r.find(id))
    }

    pub fn category_count(&self) -> usize {
        self.roots.iter().map(TreeNode::category_count).sum()
    }

    pub fn file_count(&self) -> usize {
        self.roots.iter().map(TreeNode::file_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

fn name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Link rows into a sorted forest.
pub fn build_forest(categories: Vec<CategoryRow>, files: Vec<FileRow>) -> Forest {
    let mut issues = Vec::new();

    let mut rows: Vec<CategoryRow> = Vec::with_capacity(categories.len());
    let mut index_of: HashMap<i64, usize> = HashMap::new();
    for row in categories {
        if index_of.contains_key(&row.id) {
            issues.push(TreeIssue::DuplicateCategory { category_id: row.id });
            continue;
        }
        index_of.insert(row.id, rows.len());
        rows.push(row);
    }
    let n = rows.len();

    // Parent index for rows whose parent exists; orphans are reported here.
    let mut parent: Vec<Option<usize>> = vec![None; n];
    let mut recovered = vec![false; n];
    for (i, row) in rows.iter().enumerate() {
        if let Some(pid) = row.parent_id {
            match index_of.get(&pid) {
                Some(&p) => parent[i] = Some(p),
                None => {
                    issues.push(TreeIssue::Orphan {
                        category_id: row.id,
                        parent_id: pid,
                    });
                    recovered[i] = true;
                }
            }
        }
    }

    // Walk each parent chain once; a revisit while on the current path is a loop.
    const UNSEEN: u8 = 0;
    const ON_PATH: u8 = 1;
    const DONE: u8 = 2;
    let mut state = vec![UNSEEN; n];
    for start in 0..n {
        let mut path = Vec::new();
        let mut cur = start;
        loop {
            match state[cur] {
                DONE => break,
                ON_PATH => {
                    let pos = path.iter().position(|&x| x == cur).unwrap_or(0);
                    let mut members: Vec<usize> = path[pos..].to_vec();
                    members.sort_by_key(|&m| rows[m].id);
                    let head = members[0];
                    parent[head] = None;
                    recovered[head] = true;
                    issues.push(TreeIssue::Cycle {
                        category_ids: members.iter().map(|&m| rows[m].id).collect(),
                    });
                    break;
                }
                _ => {}
            }
            state[cur] = ON_PATH;
            path.push(cur);
            match parent[cur] {
                Some(p) => cur = p,
                None => break,
            }
        }
        for x in path {
            state[x] = DONE;
        }
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, p) in parent.iter().enumerate() {
        if let Some(p) = p {
            children[*p].push(i);
        }
    }

    let mut file_lists: Vec<Vec<FileEntry>> = vec![Vec::new(); n];
    for f in files {
        match index_of.get(&f.category_id) {
            Some(&i) => file_lists[i].push(FileEntry {
                path: f.doc_id.clone(),
                doc_id: f.doc_id,
                name: f.name,
            }),
            None => issues.push(TreeIssue::DanglingFile {
                doc_id: f.doc_id,
                category_id: f.category_id,
            }),
        }
    }

    let mut builder = Builder {
        rows: &rows,
        children: &children,
        files: &mut file_lists,
    };

    let (mut roots, mut second): (Vec<TreeNode>, Vec<TreeNode>) = (Vec::new(), Vec::new());
    for i in 0..n {
        if parent[i].is_some() {
            continue;
        }
        let node = builder.build(i);
        if recovered[i] {
            second.push(node);
        } else {
            roots.push(node);
        }
    }
    sort_nodes(&mut roots);
    sort_nodes(&mut second);
    roots.extend(second);

    Forest { roots, issues }
}

struct Builder<'a> {
    rows: &'a [CategoryRow],
    children: &'a [Vec<usize>],
    files: &'a mut [Vec<FileEntry>],
}

impl Builder<'_> {
    fn build(&mut self, i: usize) -> TreeNode {
        let links = self.children;
        let mut children: Vec<TreeNode> = links[i].iter().map(|&c| self.build(c)).collect();
        sort_nodes(&mut children);

        let mut files = std::mem::take(&mut self.files[i]);
        files.sort_by(|a, b| {
            name_key(&a.name)
                .cmp(&name_key(&b.name))
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });

        let row = &self.rows[i];
        TreeNode {
            id: row.id,
            name: row.name.clone(),
            parent_id: row.parent_id,
            children,
            files,
        }
    }
}

fn sort_nodes(nodes: &mut [TreeNode]) {
    nodes.sort_by(|a, b| name_key(&a.name).cmp(&name_key(&b.name)).then(a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: i64, name: &str, parent: Option<i64>) -> CategoryRow {
        CategoryRow {
            id,
            name: name.into(),
            parent_id: parent,
        }
    }

    fn file(doc: &str, category: i64) -> FileRow {
        FileRow {
            doc_id: doc.into(),
            name: crate::models::file_name(doc),
            category_id: category,
        }
    }

    #[test]
    fn test_builds_sorted_tree() {
        let forest = build_forest(
            vec![
                cat(1, "Root", None),
                cat(2, "systems", Some(1)),
                cat(3, "Algorithms", Some(1)),
                cat(4, "Networks", Some(2)),
            ],
            vec![file("/d/zeta.pdf", 4), file("/d/Alpha.pdf", 4), file("/d/b.txt", 3)],
        );
        assert!(forest.issues.is_empty());
        assert_eq!(forest.roots.len(), 1);
        let root = &forest.roots[0];
        let names: Vec<&str> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Algorithms", "systems"]);
        let net = forest.find(4).unwrap();
        let files: Vec<&str> = net.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(files, vec!["Alpha.pdf", "zeta.pdf"]);
        assert_eq!(net.files[0].path, "/d/Alpha.pdf");
        assert_eq!(forest.category_count(), 4);
        assert_eq!(forest.file_count(), 3);
    }

    #[test]
    fn test_order_independent() {
        let rows = vec![
            cat(1, "Root", None),
            cat(2, "b", Some(1)),
            cat(3, "a", Some(2)),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();
        assert_eq!(
            build_forest(rows, vec![file("x", 3)]),
            build_forest(reversed, vec![file("x", 3)])
        );
    }

    #[test]
    fn test_orphan_becomes_second_class_root() {
        let forest = build_forest(
            vec![cat(1, "Root", None), cat(5, "aaa lost", Some(99))],
            vec![],
        );
        assert_eq!(
            forest.issues,
            vec![TreeIssue::Orphan {
                category_id: 5,
                parent_id: 99
            }]
        );
        // Proper roots sort ahead of recovered ones regardless of name.
        assert_eq!(forest.roots[0].id, 1);
        assert_eq!(forest.roots[1].id, 5);
    }

    #[test]
    fn test_cycle_is_broken_at_lowest_id() {
        let forest = build_forest(
            vec![
                cat(1, "Root", None),
                cat(7, "x", Some(8)),
                cat(8, "y", Some(7)),
                cat(9, "under", Some(8)),
            ],
            vec![],
        );
        assert_eq!(
            forest.issues,
            vec![TreeIssue::Cycle {
                category_ids: vec![7, 8]
            }]
        );
        let broken = &forest.roots[1];
        assert_eq!(broken.id, 7);
        assert_eq!(broken.children[0].id, 8);
        assert_eq!(broken.children[0].children[0].id, 9);
        assert_eq!(forest.category_count(), 4);
    }

    #[test]
    fn test_self_parent_is_cycle() {
        let forest = build_forest(vec![cat(3, "loop", Some(3))], vec![]);
        assert_eq!(forest.roots.len(), 1);
        assert!(matches!(forest.issues[0], TreeIssue::Cycle { .. }));
    }

    #[test]
    fn test_dangling_file_dropped() {
        let forest = build_forest(vec![cat(1, "Root", None)], vec![file("gone.pdf", 42)]);
        assert_eq!(forest.file_count(), 0);
        assert_eq!(
            forest.issues,
            vec![TreeIssue::DanglingFile {
                doc_id: "gone.pdf".into(),
                category_id: 42
            }]
        );
    }

    #[test]
    fn test_duplicate_id_keeps_first() {
        let forest = build_forest(vec![cat(1, "first", None), cat(1, "second", None)], vec![]);
        assert_eq!(forest.roots.len(), 1);
        assert_eq!(forest.roots[0].name, "first");
    }

    #[test]
    fn test_multiple_roots_sorted() {
        let forest = build_forest(vec![cat(1, "beta", None), cat(2, "Alpha", None)], vec![]);
        assert_eq!(forest.roots[0].name, "Alpha");
    }

    #[test]
    fn test_json_shape() {
        let forest = build_forest(vec![cat(1, "Root", None)], vec![file("/a/b.pdf", 1)]);
        let json = serde_json::to_value(&forest.roots[0]).unwrap();
        assert_eq!(json["parent_id"], serde_json::Value::Null);
        assert_eq!(json["files"][0]["name"], "b.pdf");
        assert_eq!(json["files"][0]["path"], "/a/b.pdf");
        assert!(json["children"].as_array().unwrap().is_empty());
    }
}
