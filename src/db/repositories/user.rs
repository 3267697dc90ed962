//! User repository
//!
//! Database operations for user accounts.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user and return it with its new id
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Change a user's role, returning the updated user if it exists
    async fn update_role(&self, id: i64, role: UserRole) -> Result<Option<User>>;

    /// Total number of users
    async fn count(&self) -> Result<i64>;

    /// All users ordered by username
    async fn list(&self) -> Result<Vec<User>>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => create_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => create_user_mysql(pool, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => get_user_sqlite(pool, UserKey::Id(id)).await,
            Backend::Mysql(pool) => get_user_mysql(pool, UserKey::Id(id)).await,
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => get_user_sqlite(pool, UserKey::Username(username)).await,
            Backend::Mysql(pool) => get_user_mysql(pool, UserKey::Username(username)).await,
        }
    }

    async fn update_role(&self, id: i64, role: UserRole) -> Result<Option<User>> {
        let now = Utc::now();
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
                    .bind(role.as_str())
                    .bind(now)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update user role")?
                    .rows_affected()
            }
            Backend::Mysql(pool) => {
                sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
                    .bind(role.as_str())
                    .bind(now)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update user role")?
                    .rows_affected()
            }
        };

        if affected == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    async fn count(&self) -> Result<i64> {
        const SQL: &str = "SELECT COUNT(*) FROM users";
        let count = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query_scalar::<_, i64>(SQL).fetch_one(pool).await,
            Backend::Mysql(pool) => sqlx::query_scalar::<_, i64>(SQL).fetch_one(pool).await,
        }
        .context("Failed to count users")?;
        Ok(count)
    }

    async fn list(&self) -> Result<Vec<User>> {
        const SQL: &str = "SELECT * FROM users ORDER BY username";
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(SQL)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list users")?;
                rows.iter().map(row_to_user_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(SQL)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list users")?;
                rows.iter().map(row_to_user_mysql).collect()
            }
        }
    }
}

/// Lookup key for a single user
#[derive(Clone, Copy)]
enum UserKey<'a> {
    Id(i64),
    Username(&'a str),
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_sqlite(pool: &SqlitePool, key: UserKey<'_>) -> Result<Option<User>> {
    let row = match key {
        UserKey::Id(id) => {
            sqlx::query("SELECT * FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
        }
        UserKey::Username(username) => {
            sqlx::query("SELECT * FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(pool)
                .await
        }
    }
    .context("Failed to get user")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: UserRole::from_str(&role)
            .with_context(|| format!("Invalid role in database: {}", role))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_mysql(pool: &MySqlPool, key: UserKey<'_>) -> Result<Option<User>> {
    let row = match key {
        UserKey::Id(id) => {
            sqlx::query("SELECT * FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
        }
        UserKey::Username(username) => {
            sqlx::query("SELECT * FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(pool)
                .await
        }
    }
    .context("Failed to get user")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: UserRole::from_str(&role)
            .with_context(|| format!("Invalid role in database: {}", role))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn user(name: &str, role: UserRole) -> User {
        User::new(
            name.to_string(),
            format!("{}@example.com", name),
            "hash".to_string(),
            role,
        )
    }

    #[tokio::test]
    async fn test_create_and_lookup_user() {
        let repo = setup_test_repo().await;

        let created = repo.create(&user("alice", UserRole::Instructor)).await.unwrap();
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "alice");
        assert_eq!(by_id.role, UserRole::Instructor);

        let by_name = repo.get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);

        assert!(repo.get_by_username("bob").await.unwrap().is_none());
        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let repo = setup_test_repo().await;
        repo.create(&user("alice", UserRole::Student)).await.unwrap();
        assert!(repo.create(&user("alice", UserRole::Student)).await.is_err());
    }

    #[tokio::test]
    async fn test_update_role_and_count() {
        let repo = setup_test_repo().await;
        let created = repo.create(&user("sam", UserRole::Student)).await.unwrap();
        repo.create(&user("ann", UserRole::Admin)).await.unwrap();

        let updated = repo
            .update_role(created.id, UserRole::Instructor)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.role, UserRole::Instructor);
        assert!(repo.update_role(999, UserRole::Admin).await.unwrap().is_none());

        assert_eq!(repo.count().await.unwrap(), 2);
        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|u| u.username).collect();
        assert_eq!(names, vec!["ann", "sam"]);
    }
}
