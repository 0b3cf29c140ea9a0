//! SQLite category/file tree store.
//!
//! The tree is the only durable state. Each run replaces it wholesale in a
//! single transaction:
//!
//! 1. truncate `file`, unlink category parents, truncate `category`;
//! 2. insert every category with a `NULL` parent, root first;
//! 3. patch parent ids, now that every id is known;
//! 4. insert every file against its category id.
//!
//! If anything fails the transaction is dropped and sqlx rolls it back, so
//! the previous tree survives.

use std::collections::HashMap;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use vdir_core::plan::CategoryPlan;
use vdir_core::tree::{build_forest, CategoryRow, FileRow, Forest};

use crate::config::Config;
use crate::db;
use crate::migrate;

/// Row counts written by [`CategoryStore::replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistSummary {
    pub categories: usize,
    pub files: usize,
}

pub struct CategoryStore {
    pool: SqlitePool,
}

impl CategoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect using `config` and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Replace the stored tree with `plan`.
    pub async fn replace(&self, plan: &CategoryPlan) -> Result<PersistSummary> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM file").execute(&mut *tx).await?;
        sqlx::query("UPDATE category SET parent_id = NULL")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM category").execute(&mut *tx).await?;

        let mut ids: HashMap<&str, i64> = HashMap::with_capacity(plan.categories().len());
        for category in plan.categories() {
            let result = sqlx::query("INSERT INTO category (category_name, parent_id) VALUES (?, NULL)")
                .bind(&category.name)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to insert category '{}'", category.name))?;
            ids.insert(category.name.as_str(), result.last_insert_rowid());
        }

        for category in plan.categories() {
            let Some(parent) = category.parent.as_deref() else {
                continue;
            };
            let parent_id = ids
                .get(parent)
                .copied()
                .with_context(|| format!("Parent '{}' of '{}' was not inserted", parent, category.name))?;
            sqlx::query("UPDATE category SET parent_id = ? WHERE category_id = ?")
                .bind(parent_id)
                .bind(ids[category.name.as_str()])
                .execute(&mut *tx)
                .await?;
        }

        for file in plan.files() {
            let category_id = ids
                .get(file.category.as_str())
                .copied()
                .with_context(|| format!("Category '{}' of '{}' was not inserted", file.category, file.doc_id))?;
            sqlx::query("INSERT INTO file (doc_id, file_name, category_id) VALUES (?, ?, ?)")
                .bind(&file.doc_id)
                .bind(&file.name)
                .bind(category_id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to insert file '{}'", file.doc_id))?;
            debug!(doc_id = %file.doc_id, category = %file.category, "filed");
        }

        tx.commit().await?;

        let summary = PersistSummary {
            categories: plan.categories().len(),
            files: plan.files().len(),
        };
        info!(
            categories = summary.categories,
            files = summary.files,
            "category tree replaced"
        );
        Ok(summary)
    }

    /// Read every row back and rebuild the forest. Integrity issues are
    /// logged and returned alongside the tree.
    pub async fn load(&self) -> Result<Forest> {
        let categories: Vec<(i64, String, Option<i64>)> =
            sqlx::query_as("SELECT category_id, category_name, parent_id FROM category")
                .fetch_all(&self.pool)
                .await?;
        let files: Vec<(String, String, i64)> =
            sqlx::query_as("SELECT doc_id, file_name, category_id FROM file")
                .fetch_all(&self.pool)
                .await?;

        let forest = build_forest(
            categories
                .into_iter()
                .map(|(id, name, parent_id)| CategoryRow {
                    id,
                    name,
                    parent_id,
                })
                .collect(),
            files
                .into_iter()
                .map(|(doc_id, name, category_id)| FileRow {
                    doc_id,
                    name,
                    category_id,
                })
                .collect(),
        );

        for issue in &forest.issues {
            warn!("{issue}");
        }
        Ok(forest)
    }
}
