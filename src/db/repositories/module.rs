//! Module repository
//!
//! Modules are always addressed through their course: either by the course
//! id, or by the id of the user owning that course.

use super::purge_payloads_sql;
use crate::db::{Backend, DynDatabasePool};
use crate::models::{ContentKind, Module};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Module repository trait
#[async_trait]
pub trait ModuleRepository: Send + Sync {
    /// Modules of a course ordered by their order
    async fn list_by_course(&self, course_id: i64) -> Result<Vec<Module>>;

    /// Fetch a module whose course is owned by `owner_id`
    async fn get_owned(&self, id: i64, owner_id: i64) -> Result<Option<Module>>;

    /// Fetch a module only if it belongs to `course_id`
    async fn get_in_course(&self, id: i64, course_id: i64) -> Result<Option<Module>>;

    /// Module with the lowest order in a course
    async fn first_in_course(&self, course_id: i64) -> Result<Option<Module>>;

    /// Insert a module. Without an explicit order it goes after the last one.
    async fn create(
        &self,
        course_id: i64,
        title: &str,
        description: &str,
        order: Option<i32>,
    ) -> Result<Module>;

    /// Update a module of `course_id`; false when it is not part of it
    async fn update(
        &self,
        id: i64,
        course_id: i64,
        title: &str,
        description: &str,
        order: Option<i32>,
    ) -> Result<bool>;

    /// Delete a module of `course_id` with its contents and their items
    async fn delete(&self, id: i64, course_id: i64) -> Result<bool>;

    /// Set the order of a module if its course is owned by `owner_id`
    async fn update_order_owned(&self, id: i64, owner_id: i64, order: i32) -> Result<bool>;
}

/// SQLx-based module repository implementation
pub struct SqlxModuleRepository {
    pool: DynDatabasePool,
}

impl SqlxModuleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ModuleRepository> {
        Arc::new(Self::new(pool))
    }
}

const MODULE_COLUMNS: &str = "m.id, m.course_id, m.title, m.description, m.sort_order";

#[async_trait]
impl ModuleRepository for SqlxModuleRepository {
    async fn list_by_course(&self, course_id: i64) -> Result<Vec<Module>> {
        let sql = format!(
            "SELECT {} FROM modules m WHERE m.course_id = ? ORDER BY m.sort_order, m.id",
            MODULE_COLUMNS
        );
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(course_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list modules")?;
                Ok(rows.iter().map(row_to_module_sqlite).collect())
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(course_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list modules")?;
                Ok(rows.iter().map(row_to_module_mysql).collect())
            }
        }
    }

    async fn get_owned(&self, id: i64, owner_id: i64) -> Result<Option<Module>> {
        let sql = format!(
            r#"
            SELECT {} FROM modules m
            JOIN courses c ON c.id = m.course_id
            WHERE m.id = ? AND c.owner_id = ?
            "#,
            MODULE_COLUMNS
        );
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(owner_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get owned module")?;
                Ok(row.as_ref().map(row_to_module_sqlite))
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(owner_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get owned module")?;
                Ok(row.as_ref().map(row_to_module_mysql))
            }
        }
    }

    async fn get_in_course(&self, id: i64, course_id: i64) -> Result<Option<Module>> {
        let sql = format!(
            "SELECT {} FROM modules m WHERE m.id = ? AND m.course_id = ?",
            MODULE_COLUMNS
        );
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(course_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get module")?;
                Ok(row.as_ref().map(row_to_module_sqlite))
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(course_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get module")?;
                Ok(row.as_ref().map(row_to_module_mysql))
            }
        }
    }

    async fn first_in_course(&self, course_id: i64) -> Result<Option<Module>> {
        Ok(self.list_by_course(course_id).await?.into_iter().next())
    }

    async fn create(
        &self,
        course_id: i64,
        title: &str,
        description: &str,
        order: Option<i32>,
    ) -> Result<Module> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                create_module_sqlite(pool, course_id, title, description, order).await
            }
            Backend::Mysql(pool) => {
                create_module_mysql(pool, course_id, title, description, order).await
            }
        }
    }

    async fn update(
        &self,
        id: i64,
        course_id: i64,
        title: &str,
        description: &str,
        order: Option<i32>,
    ) -> Result<bool> {
        const SQL: &str = r#"
            UPDATE modules SET title = ?, description = ?, sort_order = COALESCE(?, sort_order)
            WHERE id = ? AND course_id = ?
        "#;
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(SQL)
                .bind(title)
                .bind(description)
                .bind(order)
                .bind(id)
                .bind(course_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(SQL)
                .bind(title)
                .bind(description)
                .bind(order)
                .bind(id)
                .bind(course_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to update module")?;
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64, course_id: i64) -> Result<bool> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => delete_module_sqlite(pool, id, course_id).await,
            Backend::Mysql(pool) => delete_module_mysql(pool, id, course_id).await,
        }
    }

    async fn update_order_owned(&self, id: i64, owner_id: i64, order: i32) -> Result<bool> {
        const SQL: &str = r#"
            UPDATE modules SET sort_order = ?
            WHERE id = ? AND course_id IN (SELECT id FROM courses WHERE owner_id = ?)
        "#;
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(SQL)
                .bind(order)
                .bind(id)
                .bind(owner_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(SQL)
                .bind(order)
                .bind(id)
                .bind(owner_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to update module order")?;
        Ok(affected > 0)
    }
}

const NEXT_ORDER: &str =
    "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM modules WHERE course_id = ?";

/// Statements removing a module's contents and their items
fn module_cleanup_statements() -> Vec<String> {
    let mut statements: Vec<String> = ContentKind::ALL
        .iter()
        .map(|kind| purge_payloads_sql(*kind, "module_id = ?"))
        .collect();
    statements.push("DELETE FROM contents WHERE module_id = ?".to_string());
    statements
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_module_sqlite(
    pool: &SqlitePool,
    course_id: i64,
    title: &str,
    description: &str,
    order: Option<i32>,
) -> Result<Module> {
    let order = match order {
        Some(order) => order,
        None => sqlx::query_scalar::<_, i32>(NEXT_ORDER)
            .bind(course_id)
            .fetch_one(pool)
            .await
            .context("Failed to compute module order")?,
    };

    let result = sqlx::query(
        "INSERT INTO modules (course_id, title, description, sort_order) VALUES (?, ?, ?, ?)",
    )
    .bind(course_id)
    .bind(title)
    .bind(description)
    .bind(order)
    .execute(pool)
    .await
    .context("Failed to create module")?;

    Ok(Module {
        id: result.last_insert_rowid(),
        course_id,
        title: title.to_string(),
        description: description.to_string(),
        order,
    })
}

async fn delete_module_sqlite(pool: &SqlitePool, id: i64, course_id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let found = sqlx::query("SELECT id FROM modules WHERE id = ? AND course_id = ?")
        .bind(id)
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up module")?;
    if found.is_none() {
        return Ok(false);
    }

    for statement in module_cleanup_statements() {
        sqlx::query(&statement)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete module contents")?;
    }
    sqlx::query("DELETE FROM modules WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete module")?;

    tx.commit().await?;
    Ok(true)
}

fn row_to_module_sqlite(row: &sqlx::sqlite::SqliteRow) -> Module {
    Module {
        id: row.get("id"),
        course_id: row.get("course_id"),
        title: row.get("title"),
        description: row.get("description"),
        order: row.get("sort_order"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_module_mysql(
    pool: &MySqlPool,
    course_id: i64,
    title: &str,
    description: &str,
    order: Option<i32>,
) -> Result<Module> {
    let order = match order {
        Some(order) => order,
        // MAX() over INT yields a BIGINT-compatible value in MySQL
        None => sqlx::query_scalar::<_, i64>(NEXT_ORDER)
            .bind(course_id)
            .fetch_one(pool)
            .await
            .context("Failed to compute module order")? as i32,
    };

    let result = sqlx::query(
        "INSERT INTO modules (course_id, title, description, sort_order) VALUES (?, ?, ?, ?)",
    )
    .bind(course_id)
    .bind(title)
    .bind(description)
    .bind(order)
    .execute(pool)
    .await
    .context("Failed to create module")?;

    Ok(Module {
        id: result.last_insert_id() as i64,
        course_id,
        title: title.to_string(),
        description: description.to_string(),
        order,
    })
}

async fn delete_module_mysql(pool: &MySqlPool, id: i64, course_id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let found = sqlx::query("SELECT id FROM modules WHERE id = ? AND course_id = ? FOR UPDATE")
        .bind(id)
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up module")?;
    if found.is_none() {
        return Ok(false);
    }

    for statement in module_cleanup_statements() {
        sqlx::query(&statement)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete module contents")?;
    }
    sqlx::query("DELETE FROM modules WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete module")?;

    tx.commit().await?;
    Ok(true)
}

fn row_to_module_mysql(row: &sqlx::mysql::MySqlRow) -> Module {
    Module {
        id: row.get("id"),
        course_id: row.get("course_id"),
        title: row.get("title"),
        description: row.get("description"),
        order: row.get("sort_order"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{seed_course, seed_user, setup_pool};

    #[tokio::test]
    async fn test_create_assigns_next_order() {
        let pool = setup_pool().await;
        let repo = SqlxModuleRepository::new(pool.clone());
        let owner = seed_user(&pool, "owner").await;
        let course = seed_course(&pool, owner, "rust").await;

        let first = repo.create(course, "Basics", "", None).await.unwrap();
        let second = repo.create(course, "Ownership", "", None).await.unwrap();
        let pinned = repo.create(course, "Preface", "", Some(-1)).await.unwrap();

        assert_eq!(first.order, 0);
        assert_eq!(second.order, 1);

        let titles: Vec<String> = repo
            .list_by_course(course)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, vec!["Preface", "Basics", "Ownership"]);
        assert_eq!(repo.first_in_course(course).await.unwrap().unwrap().id, pinned.id);
    }

    #[tokio::test]
    async fn test_ownership_and_course_scoping() {
        let pool = setup_pool().await;
        let repo = SqlxModuleRepository::new(pool.clone());
        let owner = seed_user(&pool, "owner").await;
        let other = seed_user(&pool, "other").await;
        let course = seed_course(&pool, owner, "rust").await;
        let foreign_course = seed_course(&pool, other, "go").await;
        let module = repo.create(course, "Basics", "", None).await.unwrap();

        assert!(repo.get_owned(module.id, owner).await.unwrap().is_some());
        assert!(repo.get_owned(module.id, other).await.unwrap().is_none());
        assert!(repo.get_in_course(module.id, foreign_course).await.unwrap().is_none());

        assert!(!repo.update_order_owned(module.id, other, 9).await.unwrap());
        assert!(repo.update_order_owned(module.id, owner, 9).await.unwrap());
        assert_eq!(repo.get_owned(module.id, owner).await.unwrap().unwrap().order, 9);

        assert!(!repo.update(module.id, foreign_course, "X", "", None).await.unwrap());
        assert!(repo.update(module.id, course, "Syntax", "intro", None).await.unwrap());
        let updated = repo.get_in_course(module.id, course).await.unwrap().unwrap();
        assert_eq!(updated.title, "Syntax");
        assert_eq!(updated.order, 9);

        assert!(!repo.delete(module.id, foreign_course).await.unwrap());
        assert!(repo.delete(module.id, course).await.unwrap());
        assert!(repo.list_by_course(course).await.unwrap().is_empty());
    }
}
