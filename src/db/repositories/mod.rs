//! Database repositories
//!
//! One repository per aggregate. Each exposes an async trait and an
//! `Sqlx*Repository` implementation covering SQLite and MySQL.

pub mod content;
pub mod course;
pub mod module;
pub mod session;
pub mod subject;
pub mod user;

pub use content::{ContentRepository, SqlxContentRepository};
pub use course::{CourseFields, CourseRepository, SqlxCourseRepository};
pub use module::{ModuleRepository, SqlxModuleRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use subject::{SqlxSubjectRepository, SubjectRepository};
pub use user::{SqlxUserRepository, UserRepository};

use crate::models::ContentKind;

/// `DELETE` for the items of `kind` linked by the contents matching `scope`.
///
/// `scope` is a condition on the `contents` table and may hold placeholders.
pub(crate) fn purge_payloads_sql(kind: ContentKind, scope: &str) -> String {
    format!(
        "DELETE FROM {} WHERE id IN (SELECT object_id FROM contents WHERE kind = '{}' AND {})",
        kind.table(),
        kind.as_str(),
        scope
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::db::{create_test_pool, migrations::run_migrations, DynDatabasePool};

    pub async fn setup_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    pub async fn seed_user(pool: &DynDatabasePool, username: &str) -> i64 {
        sqlx::query("INSERT INTO users (username, password_hash, role) VALUES (?, 'hash', 'instructor')")
            .bind(username)
            .execute(pool.as_sqlite().unwrap())
            .await
            .expect("Failed to seed user")
            .last_insert_rowid()
    }

    pub async fn seed_subject(pool: &DynDatabasePool, slug: &str) -> i64 {
        sqlx::query("INSERT INTO subjects (title, slug) VALUES (?, ?)")
            .bind(slug.to_uppercase())
            .bind(slug)
            .execute(pool.as_sqlite().unwrap())
            .await
            .expect("Failed to seed subject")
            .last_insert_rowid()
    }

    pub async fn seed_course(pool: &DynDatabasePool, owner_id: i64, slug: &str) -> i64 {
        let subject_id = seed_subject(pool, &format!("{}-subject", slug)).await;
        sqlx::query(
            "INSERT INTO courses (owner_id, subject_id, title, slug, overview, created_at) VALUES (?, ?, ?, ?, '', ?)",
        )
        .bind(owner_id)
        .bind(subject_id)
        .bind(slug)
        .bind(slug)
        .bind(chrono::Utc::now())
        .execute(pool.as_sqlite().unwrap())
        .await
        .expect("Failed to seed course")
        .last_insert_rowid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purge_payloads_sql_targets_kind_table() {
        let sql = purge_payloads_sql(ContentKind::Video, "module_id = ?");
        assert_eq!(
            sql,
            "DELETE FROM videos WHERE id IN (SELECT object_id FROM contents WHERE kind = 'video' AND module_id = ?)"
        );
    }
}
