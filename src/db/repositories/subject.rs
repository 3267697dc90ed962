//! Subject repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Subject, SubjectWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Subject repository trait
#[async_trait]
pub trait SubjectRepository: Send + Sync {
    async fn create(&self, title: &str, slug: &str) -> Result<Subject>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Subject>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Subject>>;

    /// All subjects ordered by title
    async fn list(&self) -> Result<Vec<Subject>>;

    /// All subjects ordered by title, each with its course count
    async fn list_with_course_counts(&self) -> Result<Vec<SubjectWithCount>>;

    /// Number of courses filed under a subject
    async fn count_courses(&self, id: i64) -> Result<i64>;

    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based subject repository implementation
pub struct SqlxSubjectRepository {
    pool: DynDatabasePool,
}

impl SqlxSubjectRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubjectRepository> {
        Arc::new(Self::new(pool))
    }
}

const LIST_WITH_COUNTS: &str = r#"
    SELECT s.id, s.title, s.slug,
           (SELECT COUNT(*) FROM courses c WHERE c.subject_id = s.id) AS total_courses
    FROM subjects s
    ORDER BY s.title, s.id
"#;

#[async_trait]
impl SubjectRepository for SqlxSubjectRepository {
    async fn create(&self, title: &str, slug: &str) -> Result<Subject> {
        const SQL: &str = "INSERT INTO subjects (title, slug) VALUES (?, ?)";
        let id = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(SQL)
                .bind(title)
                .bind(slug)
                .execute(pool)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(pool) => sqlx::query(SQL)
                .bind(title)
                .bind(slug)
                .execute(pool)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create subject")?;

        Ok(Subject {
            id,
            title: title.to_string(),
            slug: slug.to_string(),
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Subject>> {
        const SQL: &str = "SELECT id, title, slug FROM subjects WHERE id = ?";
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(SQL)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get subject by ID")?;
                Ok(row.as_ref().map(row_to_subject_sqlite))
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(SQL)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get subject by ID")?;
                Ok(row.as_ref().map(row_to_subject_mysql))
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Subject>> {
        const SQL: &str = "SELECT id, title, slug FROM subjects WHERE slug = ?";
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(SQL)
                    .bind(slug)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get subject by slug")?;
                Ok(row.as_ref().map(row_to_subject_sqlite))
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(SQL)
                    .bind(slug)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get subject by slug")?;
                Ok(row.as_ref().map(row_to_subject_mysql))
            }
        }
    }

    async fn list(&self) -> Result<Vec<Subject>> {
        const SQL: &str = "SELECT id, title, slug FROM subjects ORDER BY title, id";
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(SQL)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list subjects")?;
                Ok(rows.iter().map(row_to_subject_sqlite).collect())
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(SQL)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list subjects")?;
                Ok(rows.iter().map(row_to_subject_mysql).collect())
            }
        }
    }

    async fn list_with_course_counts(&self) -> Result<Vec<SubjectWithCount>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => list_with_counts_sqlite(pool).await,
            Backend::Mysql(pool) => list_with_counts_mysql(pool).await,
        }
    }

    async fn count_courses(&self, id: i64) -> Result<i64> {
        const SQL: &str = "SELECT COUNT(*) FROM courses WHERE subject_id = ?";
        let count = match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                sqlx::query_scalar::<_, i64>(SQL)
                    .bind(id)
                    .fetch_one(pool)
                    .await
            }
            Backend::Mysql(pool) => {
                sqlx::query_scalar::<_, i64>(SQL)
                    .bind(id)
                    .fetch_one(pool)
                    .await
            }
        }
        .context("Failed to count subject courses")?;
        Ok(count)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        const SQL: &str = "DELETE FROM subjects WHERE id = ?";
        match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(SQL).bind(id).execute(pool).await.map(|_| ()),
            Backend::Mysql(pool) => sqlx::query(SQL).bind(id).execute(pool).await.map(|_| ()),
        }
        .context("Failed to delete subject")
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn list_with_counts_sqlite(pool: &SqlitePool) -> Result<Vec<SubjectWithCount>> {
    let rows = sqlx::query(LIST_WITH_COUNTS)
        .fetch_all(pool)
        .await
        .context("Failed to list subjects with course counts")?;

    Ok(rows
        .iter()
        .map(|row| SubjectWithCount {
            subject: row_to_subject_sqlite(row),
            total_courses: row.get("total_courses"),
        })
        .collect())
}

fn row_to_subject_sqlite(row: &sqlx::sqlite::SqliteRow) -> Subject {
    Subject {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn list_with_counts_mysql(pool: &MySqlPool) -> Result<Vec<SubjectWithCount>> {
    let rows = sqlx::query(LIST_WITH_COUNTS)
        .fetch_all(pool)
        .await
        .context("Failed to list subjects with course counts")?;

    Ok(rows
        .iter()
        .map(|row| SubjectWithCount {
            subject: row_to_subject_mysql(row),
            total_courses: row.get("total_courses"),
        })
        .collect())
}

fn row_to_subject_mysql(row: &sqlx::mysql::MySqlRow) -> Subject {
    Subject {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
    }
}
