//! The `vdir tree` command.

use anyhow::Result;

use vdir_core::tree::{Forest, TreeNode};

use crate::config::Config;
use crate::store::CategoryStore;

/// Print the stored forest, as indented text or pretty JSON.
pub async fn run_tree(config: &Config, json: bool) -> Result<()> {
    let store = CategoryStore::open(config).await?;
    let forest = store.load().await?;
    store.pool().close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&forest)?);
        return Ok(());
    }

    if forest.is_empty() {
        println!("No categories stored. Run `vdir run` first.");
        return Ok(());
    }
    print_forest(&forest);
    if !forest.issues.is_empty() {
        eprintln!("{} integrity issue(s) found; see warnings above.", forest.issues.len());
    }
    Ok(())
}

/// Render `forest` as an indented listing.
pub fn render_forest(forest: &Forest) -> String {
    let mut out = String::new();
    for root in &forest.roots {
        render_node(root, 0, &mut out);
    }
    out
}

pub fn print_forest(forest: &Forest) {
    print!("{}", render_forest(forest));
}

fn render_node(node: &TreeNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    out.push_str(&format!(
        "{}{}/  ({} files)\n",
        indent,
        node.name,
        node.file_count()
    ));
    for child in &node.children {
        render_node(child, depth + 1, out);
    }
    for file in &node.files {
        out.push_str(&format!("{}  {}\n", indent, file.name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdir_core::tree::{build_forest, CategoryRow, FileRow};

    #[test]
    fn test_render_forest() {
        let forest = build_forest(
            vec![
                CategoryRow {
                    id: 1,
                    name: "Root".into(),
                    parent_id: None,
                },
                CategoryRow {
                    id: 2,
                    name: "Paging".into(),
                    parent_id: Some(1),
                },
            ],
            vec![FileRow {
                doc_id: "/os/vm.pdf".into(),
                name: "vm.pdf".into(),
                category_id: 2,
            }],
        );
        assert_eq!(
            render_forest(&forest),
            "Root/  (1 files)\n  Paging/  (1 files)\n    vm.pdf\n"
        );
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_forest(&Forest::default()), "");
    }
}
