//! Database connection pool abstraction
//!
//! A single interface over the SQLite and MySQL backends. Repositories ask
//! the pool for its driver and borrow the matching sqlx pool.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqlitePool, SqlitePoolOptions},
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{DatabaseConfig, DatabaseDriver};

/// A shared pool over one of the supported backends.
///
/// Implementations only expose their sqlx pool; statement helpers are
/// provided on top of [`DatabasePool::backend`].
#[async_trait]
pub trait DatabasePool: Send + Sync {
    fn driver(&self) -> DatabaseDriver;

    fn as_sqlite(&self) -> Option<&SqlitePool>;

    fn as_mysql(&self) -> Option<&MySqlPool>;

    /// Borrow the concrete backend pool for driver-specific queries
    fn backend(&self) -> Result<Backend<'_>> {
        match (self.as_sqlite(), self.as_mysql()) {
            (Some(pool), _) => Ok(Backend::Sqlite(pool)),
            (None, Some(pool)) => Ok(Backend::Mysql(pool)),
            (None, None) => Err(anyhow!(
                "{:?} pool exposes no connection",
                self.driver()
            )),
        }
    }

    /// Run a statement without rows, returning the affected row count
    async fn execute(&self, statement: &str) -> Result<u64> {
        let affected = match self.backend()? {
            Backend::Sqlite(pool) => sqlx::query(statement)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(statement)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        };
        affected.with_context(|| format!("Failed to execute statement: {}", statement))
    }

    /// Round-trip a trivial query
    async fn ping(&self) -> Result<()> {
        let probe = match self.backend()? {
            Backend::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.map(drop),
            Backend::Mysql(pool) => sqlx::query("SELECT 1").execute(pool).await.map(drop),
        };
        probe.context("Database ping failed")
    }
}

/// Concrete pool borrowed from a [`DatabasePool`]
#[derive(Clone, Copy)]
pub enum Backend<'a> {
    Sqlite(&'a SqlitePool),
    Mysql(&'a MySqlPool),
}

/// SQLite connection pool implementation
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open (creating if needed) the database at `url`.
    ///
    /// Accepts a bare file path, a `sqlite:` URL or `:memory:`.
    pub async fn new(url: &str) -> Result<Self> {
        let target = SqliteTarget::parse(url);

        if let SqliteTarget::File { path, .. } = &target {
            match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create database directory: {:?}", dir))?,
                _ => {}
            }
        }

        // Every in-memory connection is its own database, so keep exactly one alive.
        let options = match target {
            SqliteTarget::Memory => SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
            SqliteTarget::File { .. } => SqlitePoolOptions::new().max_connections(20),
        };

        let pool = options
            .connect(&target.connection_url())
            .await
            .with_context(|| format!("Failed to connect to SQLite database: {}", url))?;

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .context("Failed to enable foreign keys")?;

        Ok(Self { pool })
    }
}

#[derive(Debug, PartialEq)]
enum SqliteTarget {
    Memory,
    File { path: PathBuf, url: String },
}

impl SqliteTarget {
    fn parse(url: &str) -> Self {
        if url == ":memory:" || url.starts_with("sqlite::memory:") {
            return Self::Memory;
        }
        match url.strip_prefix("sqlite:") {
            Some(rest) => {
                let path = rest.split('?').next().unwrap_or(rest);
                let url = if url.contains('?') {
                    url.to_string()
                } else {
                    format!("{}?mode=rwc", url)
                };
                Self::File {
                    path: PathBuf::from(path),
                    url,
                }
            }
            None => Self::File {
                path: PathBuf::from(url),
                url: format!("sqlite:{}?mode=rwc", url),
            },
        }
    }

    fn connection_url(&self) -> String {
        match self {
            Self::Memory => "sqlite::memory:".to_string(),
            Self::File { url, .. } => url.clone(),
        }
    }
}

impl DatabasePool for SqliteDatabase {
    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Sqlite
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        Some(&self.pool)
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        None
    }
}

/// MySQL connection pool implementation
pub struct MysqlDatabase {
    pool: MySqlPool,
}

impl MysqlDatabase {
    /// Create a new MySQL connection pool
    pub async fn new(url: &str) -> Result<Self> {
        let connection_url = if url.starts_with("mysql://") {
            url.to_string()
        } else {
            format!("mysql://{}", url)
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(30)
            .connect(&connection_url)
            .await
            .with_context(|| format!("Failed to connect to MySQL database: {}", url))?;

        Ok(Self { pool })
    }
}

impl DatabasePool for MysqlDatabase {
    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Mysql
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        None
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        Some(&self.pool)
    }
}

/// Type alias for a shared database pool
pub type DynDatabasePool = Arc<dyn DatabasePool>;

/// Connect to the configured database
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let pool: DynDatabasePool = match config.driver {
        DatabaseDriver::Sqlite => Arc::new(SqliteDatabase::new(&config.url).await?),
        DatabaseDriver::Mysql => Arc::new(MysqlDatabase::new(&config.url).await?),
    };
    Ok(pool)
}

/// Create a SQLite in-memory database pool for testing
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    let config = DatabaseConfig {
        driver: DatabaseDriver::Sqlite,
        url: ":memory:".to_string(),
    };
    create_pool(&config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_pool() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        assert_eq!(pool.driver(), DatabaseDriver::Sqlite);
        assert!(pool.as_sqlite().is_some());
        assert!(pool.as_mysql().is_none());
        pool.ping().await.expect("Ping should succeed");
    }

    #[tokio::test]
    async fn test_in_memory_pool_keeps_state_between_queries() {
        let pool = create_test_pool().await.unwrap();

        pool.execute("CREATE TABLE probe (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();
        let affected = pool
            .execute("INSERT INTO probe (name) VALUES ('a'), ('b')")
            .await
            .unwrap();
        assert_eq!(affected, 2);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM probe")
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_sqlite_target_parsing() {
        assert_eq!(SqliteTarget::parse(":memory:"), SqliteTarget::Memory);
        assert_eq!(SqliteTarget::parse("sqlite::memory:"), SqliteTarget::Memory);
        assert_eq!(
            SqliteTarget::parse("data/educa.db"),
            SqliteTarget::File {
                path: PathBuf::from("data/educa.db"),
                url: "sqlite:data/educa.db?mode=rwc".to_string(),
            }
        );
        assert_eq!(
            SqliteTarget::parse("sqlite:data/educa.db?mode=ro"),
            SqliteTarget::File {
                path: PathBuf::from("data/educa.db"),
                url: "sqlite:data/educa.db?mode=ro".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_sqlite_nested_directory_creation() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("nested").join("dir").join("educa.db");

        let config = DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: db_path.to_string_lossy().to_string(),
        };

        let pool = create_pool(&config).await.expect("Failed to create pool");
        pool.ping().await.expect("Ping should succeed");
        assert!(db_path.exists());
    }

    #[tokio::test]
    #[ignore = "Requires MySQL server"]
    async fn test_mysql_pool_ping() {
        let url = std::env::var("MYSQL_TEST_URL")
            .unwrap_or_else(|_| "mysql://root@localhost/test".to_string());

        let config = DatabaseConfig {
            driver: DatabaseDriver::Mysql,
            url,
        };

        let pool = create_pool(&config).await.expect("Failed to create pool");
        assert_eq!(pool.driver(), DatabaseDriver::Mysql);
        pool.ping().await.expect("Ping should succeed");
    }
}
