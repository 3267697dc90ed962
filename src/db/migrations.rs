//! Database migrations
//!
//! Schema changes are embedded in the binary as SQL strings, with one
//! variant per supported backend. Applied versions are recorded in the
//! `_migrations` table so that `run_migrations` is idempotent.

use anyhow::{Context, Result};
use std::collections::HashSet;

use super::{Backend, DynDatabasePool};
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// All migrations of the course platform, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(150) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL DEFAULT '',
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'student',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(150) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL DEFAULT '',
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'student',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_subjects",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS subjects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(200) NOT NULL,
                slug VARCHAR(200) NOT NULL UNIQUE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS subjects (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(200) NOT NULL,
                slug VARCHAR(200) NOT NULL UNIQUE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 4,
        name: "create_courses",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                subject_id INTEGER NOT NULL,
                title VARCHAR(200) NOT NULL,
                slug VARCHAR(200) NOT NULL UNIQUE,
                overview TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (subject_id) REFERENCES subjects(id)
            );
            CREATE INDEX IF NOT EXISTS idx_courses_owner_id ON courses(owner_id);
            CREATE INDEX IF NOT EXISTS idx_courses_subject_id ON courses(subject_id);
            CREATE TABLE IF NOT EXISTS course_students (
                course_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (course_id, user_id),
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_course_students_user_id ON course_students(user_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS courses (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                owner_id BIGINT NOT NULL,
                subject_id BIGINT NOT NULL,
                title VARCHAR(200) NOT NULL,
                slug VARCHAR(200) NOT NULL UNIQUE,
                overview TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (subject_id) REFERENCES subjects(id)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_courses_owner_id ON courses(owner_id);
            CREATE TABLE IF NOT EXISTS course_students (
                course_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (course_id, user_id),
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_course_students_user_id ON course_students(user_id);
        "#,
    },
    Migration {
        version: 5,
        name: "create_modules",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS modules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id INTEGER NOT NULL,
                title VARCHAR(200) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                sort_order INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_modules_course_id ON modules(course_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS modules (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                course_id BIGINT NOT NULL,
                title VARCHAR(200) NOT NULL,
                description TEXT NOT NULL,
                sort_order INT NOT NULL DEFAULT 0,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_modules_course_id ON modules(course_id);
        "#,
    },
    Migration {
        version: 6,
        name: "create_content_items",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS texts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                title VARCHAR(250) NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                title VARCHAR(250) NOT NULL,
                file VARCHAR(500) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                title VARCHAR(250) NOT NULL,
                file VARCHAR(500) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS videos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                title VARCHAR(250) NOT NULL,
                url VARCHAR(500) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS texts (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                owner_id BIGINT NOT NULL,
                title VARCHAR(250) NOT NULL,
                content LONGTEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS files (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                owner_id BIGINT NOT NULL,
                title VARCHAR(250) NOT NULL,
                file VARCHAR(500) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS images (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                owner_id BIGINT NOT NULL,
                title VARCHAR(250) NOT NULL,
                file VARCHAR(500) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE TABLE IF NOT EXISTS videos (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                owner_id BIGINT NOT NULL,
                title VARCHAR(250) NOT NULL,
                url VARCHAR(500) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 7,
        name: "create_contents",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS contents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                module_id INTEGER NOT NULL,
                kind VARCHAR(10) NOT NULL CHECK (kind IN ('text', 'video', 'image', 'file')),
                object_id INTEGER NOT NULL,
                sort_order INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (module_id) REFERENCES modules(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_contents_module_id ON contents(module_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_contents_item ON contents(kind, object_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS contents (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                module_id BIGINT NOT NULL,
                kind VARCHAR(10) NOT NULL,
                object_id BIGINT NOT NULL,
                sort_order INT NOT NULL DEFAULT 0,
                CONSTRAINT chk_contents_kind CHECK (kind IN ('text', 'video', 'image', 'file')),
                FOREIGN KEY (module_id) REFERENCES modules(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_contents_module_id ON contents(module_id);
            CREATE UNIQUE INDEX idx_contents_item ON contents(kind, object_id);
        "#,
    },
];

impl Migration {
    /// Statement script for the given backend
    pub fn script(&self, driver: DatabaseDriver) -> &'static str {
        match driver {
            DatabaseDriver::Sqlite => self.up_sqlite,
            DatabaseDriver::Mysql => self.up_mysql,
        }
    }
}

/// Run all pending migrations in version order.
///
/// Returns the number of migrations applied by this call.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    let pending = pending_migrations(pool).await?;
    if pending.is_empty() {
        tracing::debug!("Schema is up to date");
        return Ok(0);
    }

    for migration in &pending {
        tracing::info!("Migrating to v{} ({})", migration.version, migration.name);
        apply(pool, migration)
            .await
            .with_context(|| format!("Migration v{} {} failed", migration.version, migration.name))?;
    }

    Ok(pending.len())
}

/// Number of migrations not yet recorded in `_migrations`
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    Ok(pending_migrations(pool).await?.len())
}

async fn pending_migrations(pool: &DynDatabasePool) -> Result<Vec<&'static Migration>> {
    let ledger = match pool.driver() {
        DatabaseDriver::Sqlite => LEDGER_TABLE.replace("{version}", "INTEGER"),
        DatabaseDriver::Mysql => LEDGER_TABLE.replace("{version}", "INT"),
    };
    pool.execute(&ledger).await?;

    let applied = applied_versions(pool).await?;
    Ok(MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&i64::from(m.version)))
        .collect())
}

const LEDGER_TABLE: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version {version} PRIMARY KEY,
    name VARCHAR(255) NOT NULL UNIQUE,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

async fn applied_versions(pool: &DynDatabasePool) -> Result<HashSet<i64>> {
    const SQL: &str = "SELECT version FROM _migrations";

    let versions = match pool.backend()? {
        Backend::Sqlite(pool) => sqlx::query_scalar::<_, i64>(SQL).fetch_all(pool).await,
        Backend::Mysql(pool) => sqlx::query_scalar::<_, i32>(SQL)
            .fetch_all(pool)
            .await
            .map(|v| v.into_iter().map(i64::from).collect()),
    }
    .context("Failed to read the migration ledger")?;

    Ok(versions.into_iter().collect())
}

async fn apply(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    let statements = split_sql_statements(migration.script(pool.driver()));
    const RECORD: &str = "INSERT INTO _migrations (version, name) VALUES (?, ?)";

    match pool.backend()? {
        // SQLite DDL is transactional, so a failed migration leaves no trace.
        Backend::Sqlite(pool) => {
            let mut tx = pool.begin().await?;
            for statement in statements {
                sqlx::query(statement)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| statement_failed(statement))?;
            }
            sqlx::query(RECORD)
                .bind(migration.version)
                .bind(migration.name)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
        // MySQL commits DDL implicitly.
        Backend::Mysql(pool) => {
            for statement in statements {
                sqlx::query(statement)
                    .execute(pool)
                    .await
                    .with_context(|| statement_failed(statement))?;
            }
            sqlx::query(RECORD)
                .bind(migration.version)
                .bind(migration.name)
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}

fn statement_failed(statement: &str) -> String {
    let head: String = statement.chars().take(100).collect();
    if head.len() < statement.len() {
        format!("Statement failed: {}...", head)
    } else {
        format!("Statement failed: {}", head)
    }
}

/// Split a script on `;`, skipping empty and comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| {
            stmt.lines()
                .map(str::trim)
                .any(|line| !line.is_empty() && !line.starts_with("--"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn table_exists(pool: &DynDatabasePool, table: &str) -> bool {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(pool.as_sqlite().unwrap())
        .await
        .unwrap();
        count == 1
    }

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.unwrap();

        let count = run_migrations(&pool).await.unwrap();
        assert_eq!(count, MIGRATIONS.len());

        let count = run_migrations(&pool).await.unwrap();
        assert_eq!(count, 0);
        assert_eq!(pending_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pending_count_before_migrations() {
        let pool = create_test_pool().await.unwrap();
        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_only_unrecorded_versions_are_pending() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        sqlx::query("DELETE FROM _migrations WHERE version = ?")
            .bind(MIGRATIONS.len() as i64)
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();

        assert_eq!(pending_count(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_all_tables_created() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        for table in [
            "users",
            "sessions",
            "subjects",
            "courses",
            "course_students",
            "modules",
            "contents",
            "texts",
            "files",
            "images",
            "videos",
        ] {
            assert!(table_exists(&pool, table).await, "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_contents_kind_is_constrained() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let sqlite = pool.as_sqlite().unwrap();

        sqlx::query("INSERT INTO users (username, password_hash) VALUES ('u', 'h')")
            .execute(sqlite)
            .await
            .unwrap();
        sqlx::query("INSERT INTO subjects (title, slug) VALUES ('S', 's')")
            .execute(sqlite)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO courses (owner_id, subject_id, title, slug, overview) VALUES (1, 1, 'C', 'c', '')",
        )
        .execute(sqlite)
        .await
        .unwrap();
        sqlx::query("INSERT INTO modules (course_id, title) VALUES (1, 'M')")
            .execute(sqlite)
            .await
            .unwrap();

        let ok = sqlx::query("INSERT INTO contents (module_id, kind, object_id) VALUES (1, 'text', 1)")
            .execute(sqlite)
            .await;
        assert!(ok.is_ok());

        let rejected =
            sqlx::query("INSERT INTO contents (module_id, kind, object_id) VALUES (1, 'audio', 2)")
                .execute(sqlite)
                .await;
        assert!(rejected.is_err());
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n-- comment only;\n  CREATE INDEX i ON a(id);  ";
        let statements = split_sql_statements(sql);
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a(id)"]
        );
    }

    #[test]
    fn test_migration_versions_are_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version, i as i32 + 1);
            for driver in [DatabaseDriver::Sqlite, DatabaseDriver::Mysql] {
                assert!(!split_sql_statements(migration.script(driver)).is_empty());
            }
        }
    }
}
