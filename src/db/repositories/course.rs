//! Course repository
//!
//! Every mutating query that takes an `owner_id` filters on
//! `courses.owner_id`, so a caller can never reach another instructor's
//! course through it. Enrollment rows live in `course_students`.

use super::purge_payloads_sql;
use crate::db::{Backend, DynDatabasePool};
use crate::models::{ContentKind, Course, CourseWithModuleCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Course fields written on create and update
#[derive(Debug, Clone)]
pub struct CourseFields {
    pub subject_id: i64,
    pub title: String,
    pub slug: String,
    pub overview: String,
}

/// Course repository trait
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Insert a course owned by `owner_id`
    async fn create(&self, owner_id: i64, fields: &CourseFields) -> Result<Course>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Course>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Course>>;

    /// Fetch a course only if `owner_id` owns it
    async fn get_owned(&self, id: i64, owner_id: i64) -> Result<Option<Course>>;

    /// Courses owned by `owner_id`, newest first
    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Course>>;

    /// All courses, newest first
    async fn list(&self) -> Result<Vec<Course>>;

    /// Catalog listing with module counts, optionally restricted to a subject
    async fn list_with_module_counts(
        &self,
        subject_id: Option<i64>,
    ) -> Result<Vec<CourseWithModuleCount>>;

    /// Update an owned course; `None` when it is not owned by `owner_id`
    async fn update_owned(
        &self,
        id: i64,
        owner_id: i64,
        fields: &CourseFields,
    ) -> Result<Option<Course>>;

    /// Delete an owned course with its modules, contents, content items and
    /// enrollments. Returns false when the course is not owned by `owner_id`.
    async fn delete_owned(&self, id: i64, owner_id: i64) -> Result<bool>;

    /// Whether another course already uses `slug`
    async fn slug_taken(&self, slug: &str, except_id: Option<i64>) -> Result<bool>;

    /// Add a student to a course. Returns false if already enrolled.
    async fn enroll(&self, course_id: i64, user_id: i64) -> Result<bool>;

    async fn is_enrolled(&self, course_id: i64, user_id: i64) -> Result<bool>;

    /// Courses a student is enrolled in, newest first
    async fn list_enrolled(&self, user_id: i64) -> Result<Vec<Course>>;
}

/// SQLx-based course repository implementation
pub struct SqlxCourseRepository {
    pool: DynDatabasePool,
}

impl SqlxCourseRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CourseRepository> {
        Arc::new(Self::new(pool))
    }
}

const COURSE_COLUMNS: &str = "c.id, c.owner_id, c.subject_id, c.title, c.slug, c.overview, c.created_at";

#[async_trait]
impl CourseRepository for SqlxCourseRepository {
    async fn create(&self, owner_id: i64, fields: &CourseFields) -> Result<Course> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => create_course_sqlite(pool, owner_id, fields).await,
            Backend::Mysql(pool) => create_course_mysql(pool, owner_id, fields).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Course>> {
        let sql = format!("SELECT {} FROM courses c WHERE c.id = ?", COURSE_COLUMNS);
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get course by ID")?;
                Ok(row.as_ref().map(row_to_course_sqlite))
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get course by ID")?;
                Ok(row.as_ref().map(row_to_course_mysql))
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Course>> {
        let sql = format!("SELECT {} FROM courses c WHERE c.slug = ?", COURSE_COLUMNS);
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get course by slug")?;
                Ok(row.as_ref().map(row_to_course_sqlite))
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get course by slug")?;
                Ok(row.as_ref().map(row_to_course_mysql))
            }
        }
    }

    async fn get_owned(&self, id: i64, owner_id: i64) -> Result<Option<Course>> {
        let sql = format!(
            "SELECT {} FROM courses c WHERE c.id = ? AND c.owner_id = ?",
            COURSE_COLUMNS
        );
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(owner_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get owned course")?;
                Ok(row.as_ref().map(row_to_course_sqlite))
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(owner_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get owned course")?;
                Ok(row.as_ref().map(row_to_course_mysql))
            }
        }
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Course>> {
        let sql = format!(
            "SELECT {} FROM courses c WHERE c.owner_id = ? ORDER BY c.created_at DESC, c.id DESC",
            COURSE_COLUMNS
        );
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(owner_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list courses by owner")?;
                Ok(rows.iter().map(row_to_course_sqlite).collect())
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(owner_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list courses by owner")?;
                Ok(rows.iter().map(row_to_course_mysql).collect())
            }
        }
    }

    async fn list(&self) -> Result<Vec<Course>> {
        let sql = format!(
            "SELECT {} FROM courses c ORDER BY c.created_at DESC, c.id DESC",
            COURSE_COLUMNS
        );
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list courses")?;
                Ok(rows.iter().map(row_to_course_sqlite).collect())
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list courses")?;
                Ok(rows.iter().map(row_to_course_mysql).collect())
            }
        }
    }

    async fn list_with_module_counts(
        &self,
        subject_id: Option<i64>,
    ) -> Result<Vec<CourseWithModuleCount>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => list_with_module_counts_sqlite(pool, subject_id).await,
            Backend::Mysql(pool) => list_with_module_counts_mysql(pool, subject_id).await,
        }
    }

    async fn update_owned(
        &self,
        id: i64,
        owner_id: i64,
        fields: &CourseFields,
    ) -> Result<Option<Course>> {
        const SQL: &str = r#"
            UPDATE courses SET subject_id = ?, title = ?, slug = ?, overview = ?
            WHERE id = ? AND owner_id = ?
        "#;
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(SQL)
                .bind(fields.subject_id)
                .bind(&fields.title)
                .bind(&fields.slug)
                .bind(&fields.overview)
                .bind(id)
                .bind(owner_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(SQL)
                .bind(fields.subject_id)
                .bind(&fields.title)
                .bind(&fields.slug)
                .bind(&fields.overview)
                .bind(id)
                .bind(owner_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to update course")?;

        if affected == 0 {
            return Ok(None);
        }
        self.get_owned(id, owner_id).await
    }

    async fn delete_owned(&self, id: i64, owner_id: i64) -> Result<bool> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => delete_course_sqlite(pool, id, owner_id).await,
            Backend::Mysql(pool) => delete_course_mysql(pool, id, owner_id).await,
        }
    }

    async fn slug_taken(&self, slug: &str, except_id: Option<i64>) -> Result<bool> {
        const SQL: &str = "SELECT COUNT(*) FROM courses WHERE slug = ? AND id <> ?";
        let except_id = except_id.unwrap_or(0);
        let count = match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                sqlx::query_scalar::<_, i64>(SQL)
                    .bind(slug)
                    .bind(except_id)
                    .fetch_one(pool)
                    .await
            }
            Backend::Mysql(pool) => {
                sqlx::query_scalar::<_, i64>(SQL)
                    .bind(slug)
                    .bind(except_id)
                    .fetch_one(pool)
                    .await
            }
        }
        .context("Failed to check course slug")?;
        Ok(count > 0)
    }

    async fn enroll(&self, course_id: i64, user_id: i64) -> Result<bool> {
        let now = Utc::now();
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(
                "INSERT OR IGNORE INTO course_students (course_id, user_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(course_id)
            .bind(user_id)
            .bind(now)
            .execute(pool)
            .await
            .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(
                "INSERT IGNORE INTO course_students (course_id, user_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(course_id)
            .bind(user_id)
            .bind(now)
            .execute(pool)
            .await
            .map(|r| r.rows_affected()),
        }
        .context("Failed to enroll student")?;
        Ok(affected > 0)
    }

    async fn is_enrolled(&self, course_id: i64, user_id: i64) -> Result<bool> {
        const SQL: &str =
            "SELECT COUNT(*) FROM course_students WHERE course_id = ? AND user_id = ?";
        let count = match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                sqlx::query_scalar::<_, i64>(SQL)
                    .bind(course_id)
                    .bind(user_id)
                    .fetch_one(pool)
                    .await
            }
            Backend::Mysql(pool) => {
                sqlx::query_scalar::<_, i64>(SQL)
                    .bind(course_id)
                    .bind(user_id)
                    .fetch_one(pool)
                    .await
            }
        }
        .context("Failed to check enrollment")?;
        Ok(count > 0)
    }

    async fn list_enrolled(&self, user_id: i64) -> Result<Vec<Course>> {
        let sql = format!(
            r#"
            SELECT {} FROM courses c
            JOIN course_students cs ON cs.course_id = c.id
            WHERE cs.user_id = ?
            ORDER BY c.created_at DESC, c.id DESC
            "#,
            COURSE_COLUMNS
        );
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(user_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list enrolled courses")?;
                Ok(rows.iter().map(row_to_course_sqlite).collect())
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(user_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list enrolled courses")?;
                Ok(rows.iter().map(row_to_course_mysql).collect())
            }
        }
    }
}

fn module_counts_sql(filtered: bool) -> String {
    format!(
        r#"
        SELECT {},
               (SELECT COUNT(*) FROM modules m WHERE m.course_id = c.id) AS total_modules
        FROM courses c
        {}
        ORDER BY c.created_at DESC, c.id DESC
        "#,
        COURSE_COLUMNS,
        if filtered { "WHERE c.subject_id = ?" } else { "" }
    )
}

/// Statements removing everything hanging off a course, in dependency order
fn course_cleanup_statements() -> Vec<String> {
    const SCOPE: &str = "module_id IN (SELECT id FROM modules WHERE course_id = ?)";
    let mut statements: Vec<String> = ContentKind::ALL
        .iter()
        .map(|kind| purge_payloads_sql(*kind, SCOPE))
        .collect();
    statements.push(format!("DELETE FROM contents WHERE {}", SCOPE));
    statements.push("DELETE FROM modules WHERE course_id = ?".to_string());
    statements.push("DELETE FROM course_students WHERE course_id = ?".to_string());
    statements
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_course_sqlite(
    pool: &SqlitePool,
    owner_id: i64,
    fields: &CourseFields,
) -> Result<Course> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO courses (owner_id, subject_id, title, slug, overview, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(owner_id)
    .bind(fields.subject_id)
    .bind(&fields.title)
    .bind(&fields.slug)
    .bind(&fields.overview)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create course")?;

    Ok(Course {
        id: result.last_insert_rowid(),
        owner_id,
        subject_id: fields.subject_id,
        title: fields.title.clone(),
        slug: fields.slug.clone(),
        overview: fields.overview.clone(),
        created_at: now,
    })
}

async fn list_with_module_counts_sqlite(
    pool: &SqlitePool,
    subject_id: Option<i64>,
) -> Result<Vec<CourseWithModuleCount>> {
    let sql = module_counts_sql(subject_id.is_some());
    let mut query = sqlx::query(&sql);
    if let Some(subject_id) = subject_id {
        query = query.bind(subject_id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to list courses with module counts")?;

    Ok(rows
        .iter()
        .map(|row| CourseWithModuleCount {
            course: row_to_course_sqlite(row),
            total_modules: row.get("total_modules"),
        })
        .collect())
}

async fn delete_course_sqlite(pool: &SqlitePool, id: i64, owner_id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let owned = sqlx::query("SELECT id FROM courses WHERE id = ? AND owner_id = ?")
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up course")?;
    if owned.is_none() {
        return Ok(false);
    }

    for statement in course_cleanup_statements() {
        sqlx::query(&statement)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete course dependents")?;
    }
    sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete course")?;

    tx.commit().await?;
    Ok(true)
}

fn row_to_course_sqlite(row: &sqlx::sqlite::SqliteRow) -> Course {
    Course {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        subject_id: row.get("subject_id"),
        title: row.get("title"),
        slug: row.get("slug"),
        overview: row.get("overview"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_course_mysql(
    pool: &MySqlPool,
    owner_id: i64,
    fields: &CourseFields,
) -> Result<Course> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO courses (owner_id, subject_id, title, slug, overview, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(owner_id)
    .bind(fields.subject_id)
    .bind(&fields.title)
    .bind(&fields.slug)
    .bind(&fields.overview)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create course")?;

    Ok(Course {
        id: result.last_insert_id() as i64,
        owner_id,
        subject_id: fields.subject_id,
        title: fields.title.clone(),
        slug: fields.slug.clone(),
        overview: fields.overview.clone(),
        created_at: now,
    })
}

async fn list_with_module_counts_mysql(
    pool: &MySqlPool,
    subject_id: Option<i64>,
) -> Result<Vec<CourseWithModuleCount>> {
    let sql = module_counts_sql(subject_id.is_some());
    let mut query = sqlx::query(&sql);
    if let Some(subject_id) = subject_id {
        query = query.bind(subject_id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to list courses with module counts")?;

    Ok(rows
        .iter()
        .map(|row| CourseWithModuleCount {
            course: row_to_course_mysql(row),
            total_modules: row.get("total_modules"),
        })
        .collect())
}

async fn delete_course_mysql(pool: &MySqlPool, id: i64, owner_id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let owned = sqlx::query("SELECT id FROM courses WHERE id = ? AND owner_id = ? FOR UPDATE")
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up course")?;
    if owned.is_none() {
        return Ok(false);
    }

    for statement in course_cleanup_statements() {
        sqlx::query(&statement)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete course dependents")?;
    }
    sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete course")?;

    tx.commit().await?;
    Ok(true)
}

fn row_to_course_mysql(row: &sqlx::mysql::MySqlRow) -> Course {
    Course {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        subject_id: row.get("subject_id"),
        title: row.get("title"),
        slug: row.get("slug"),
        overview: row.get("overview"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{seed_subject, seed_user, setup_pool};

    fn fields(subject_id: i64, slug: &str) -> CourseFields {
        CourseFields {
            subject_id,
            title: slug.to_uppercase(),
            slug: slug.to_string(),
            overview: format!("About {}", slug),
        }
    }

    #[tokio::test]
    async fn test_owner_scoped_lookups() {
        let pool = setup_pool().await;
        let repo = SqlxCourseRepository::new(pool.clone());
        let alice = seed_user(&pool, "alice").await;
        let bob = seed_user(&pool, "bob").await;
        let subject = seed_subject(&pool, "programming").await;

        let course = repo.create(alice, &fields(subject, "intro")).await.unwrap();

        assert!(repo.get_owned(course.id, alice).await.unwrap().is_some());
        assert!(repo.get_owned(course.id, bob).await.unwrap().is_none());
        assert_eq!(repo.list_by_owner(alice).await.unwrap().len(), 1);
        assert!(repo.list_by_owner(bob).await.unwrap().is_empty());
        assert_eq!(
            repo.get_by_slug("intro").await.unwrap().map(|c| c.id),
            Some(course.id)
        );
    }

    #[tokio::test]
    async fn test_update_and_delete_require_ownership() {
        let pool = setup_pool().await;
        let repo = SqlxCourseRepository::new(pool.clone());
        let alice = seed_user(&pool, "alice").await;
        let bob = seed_user(&pool, "bob").await;
        let subject = seed_subject(&pool, "programming").await;
        let course = repo.create(alice, &fields(subject, "intro")).await.unwrap();

        let mut changed = fields(subject, "intro-2");
        changed.title = "Hijacked".into();
        assert!(repo.update_owned(course.id, bob, &changed).await.unwrap().is_none());
        assert!(!repo.delete_owned(course.id, bob).await.unwrap());
        assert_eq!(repo.get_by_id(course.id).await.unwrap().unwrap().title, "INTRO");

        changed.title = "Intro to Rust".into();
        let updated = repo.update_owned(course.id, alice, &changed).await.unwrap().unwrap();
        assert_eq!(updated.title, "Intro to Rust");
        assert_eq!(updated.slug, "intro-2");

        assert!(repo.delete_owned(course.id, alice).await.unwrap());
        assert!(repo.get_by_id(course.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enrollment_is_idempotent() {
        let pool = setup_pool().await;
        let repo = SqlxCourseRepository::new(pool.clone());
        let owner = seed_user(&pool, "owner").await;
        let student = seed_user(&pool, "student").await;
        let subject = seed_subject(&pool, "math").await;
        let course = repo.create(owner, &fields(subject, "algebra")).await.unwrap();

        assert!(!repo.is_enrolled(course.id, student).await.unwrap());
        assert!(repo.enroll(course.id, student).await.unwrap());
        assert!(!repo.enroll(course.id, student).await.unwrap());
        assert!(repo.is_enrolled(course.id, student).await.unwrap());

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM course_students")
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(repo.list_enrolled(student).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_slug_taken_and_module_counts() {
        let pool = setup_pool().await;
        let repo = SqlxCourseRepository::new(pool.clone());
        let owner = seed_user(&pool, "owner").await;
        let math = seed_subject(&pool, "math").await;
        let art = seed_subject(&pool, "art").await;
        let algebra = repo.create(owner, &fields(math, "algebra")).await.unwrap();
        repo.create(owner, &fields(art, "drawing")).await.unwrap();

        assert!(repo.slug_taken("algebra", None).await.unwrap());
        assert!(!repo.slug_taken("algebra", Some(algebra.id)).await.unwrap());
        assert!(!repo.slug_taken("geometry", None).await.unwrap());

        sqlx::query("INSERT INTO modules (course_id, title, sort_order) VALUES (?, 'M1', 0), (?, 'M2', 1)")
            .bind(algebra.id)
            .bind(algebra.id)
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();

        let all = repo.list_with_module_counts(None).await.unwrap();
        assert_eq!(all.len(), 2);
        let math_only = repo.list_with_module_counts(Some(math)).await.unwrap();
        assert_eq!(math_only.len(), 1);
        assert_eq!(math_only[0].total_modules, 2);
    }
}
