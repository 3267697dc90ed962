//! Content repository
//!
//! Stores content items in one table per kind (`texts`, `videos`, `images`,
//! `files`) and the module links in `contents`. An item and its link are
//! created together and deleted together, each inside one transaction.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Content, ContentDraft, ContentItem, ContentKind, ContentPayload, ItemBase, ModuleContent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Content repository trait
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Insert an item owned by `owner_id` and link it at the end of `module_id`
    async fn create(&self, module_id: i64, owner_id: i64, draft: &ContentDraft)
        -> Result<ModuleContent>;

    /// Fetch an item of `kind` owned by `owner_id`
    async fn get_item(&self, kind: ContentKind, id: i64, owner_id: i64)
        -> Result<Option<ContentItem>>;

    /// Update an item in place; `None` when it is not owned by `owner_id`
    async fn update_item(
        &self,
        kind: ContentKind,
        id: i64,
        owner_id: i64,
        draft: &ContentDraft,
    ) -> Result<Option<ContentItem>>;

    /// The link of an item inside a given module
    async fn get_link(&self, module_id: i64, kind: ContentKind, object_id: i64)
        -> Result<Option<Content>>;

    /// A link whose course is owned by `owner_id`
    async fn get_owned(&self, id: i64, owner_id: i64) -> Result<Option<Content>>;

    /// Delete an owned link and its item. False when not owned.
    async fn delete_owned(&self, id: i64, owner_id: i64) -> Result<bool>;

    /// Links of a module with their items, ordered
    async fn list_by_module(&self, module_id: i64) -> Result<Vec<ModuleContent>>;

    /// Set the order of a link if its course is owned by `owner_id`
    async fn update_order_owned(&self, id: i64, owner_id: i64, order: i32) -> Result<bool>;
}

/// SQLx-based content repository implementation
pub struct SqlxContentRepository {
    pool: DynDatabasePool,
}

impl SqlxContentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ContentRepository> {
        Arc::new(Self::new(pool))
    }
}

/// Restricts `contents` rows to those whose course belongs to an owner
const OWNED_LINK: &str = r#"
    module_id IN (
        SELECT m.id FROM modules m JOIN courses c ON c.id = m.course_id WHERE c.owner_id = ?
    )
"#;

fn insert_item_sql(kind: ContentKind) -> String {
    format!(
        "INSERT INTO {} (owner_id, title, {}, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        kind.table(),
        kind.payload_column()
    )
}

fn select_item_sql(kind: ContentKind) -> String {
    format!(
        "SELECT id, owner_id, title, {} AS payload, created_at, updated_at FROM {} WHERE id = ? AND owner_id = ?",
        kind.payload_column(),
        kind.table()
    )
}

fn update_item_sql(kind: ContentKind) -> String {
    format!(
        "UPDATE {} SET title = ?, {} = ?, updated_at = ? WHERE id = ? AND owner_id = ?",
        kind.table(),
        kind.payload_column()
    )
}

fn module_items_sql(kind: ContentKind) -> String {
    format!(
        r#"
        SELECT ct.id AS content_id, ct.module_id, ct.sort_order,
               i.id, i.owner_id, i.title, i.{} AS payload, i.created_at, i.updated_at
        FROM contents ct
        JOIN {} i ON i.id = ct.object_id
        WHERE ct.kind = ? AND ct.module_id = ?
        "#,
        kind.payload_column(),
        kind.table()
    )
}

const NEXT_ORDER: &str =
    "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM contents WHERE module_id = ?";
const INSERT_LINK: &str =
    "INSERT INTO contents (module_id, kind, object_id, sort_order) VALUES (?, ?, ?, ?)";
const SELECT_LINK: &str =
    "SELECT id, module_id, kind, object_id, sort_order FROM contents WHERE module_id = ? AND kind = ? AND object_id = ?";

fn select_owned_link_sql() -> String {
    format!(
        "SELECT id, module_id, kind, object_id, sort_order FROM contents WHERE id = ? AND {}",
        OWNED_LINK
    )
}

fn sort_module_contents(mut contents: Vec<ModuleContent>) -> Vec<ModuleContent> {
    contents.sort_by_key(|c| (c.content.order, c.content.id));
    contents
}

#[async_trait]
impl ContentRepository for SqlxContentRepository {
    async fn create(
        &self,
        module_id: i64,
        owner_id: i64,
        draft: &ContentDraft,
    ) -> Result<ModuleContent> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => create_content_sqlite(pool, module_id, owner_id, draft).await,
            Backend::Mysql(pool) => create_content_mysql(pool, module_id, owner_id, draft).await,
        }
    }

    async fn get_item(
        &self,
        kind: ContentKind,
        id: i64,
        owner_id: i64,
    ) -> Result<Option<ContentItem>> {
        let sql = select_item_sql(kind);
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(owner_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get content item")?;
                Ok(row.map(|row| row_to_item_sqlite(&row, kind)))
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(owner_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get content item")?;
                Ok(row.map(|row| row_to_item_mysql(&row, kind)))
            }
        }
    }

    async fn update_item(
        &self,
        kind: ContentKind,
        id: i64,
        owner_id: i64,
        draft: &ContentDraft,
    ) -> Result<Option<ContentItem>> {
        let sql = update_item_sql(kind);
        let now = Utc::now();
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(&draft.title)
                .bind(draft.payload.value())
                .bind(now)
                .bind(id)
                .bind(owner_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(&draft.title)
                .bind(draft.payload.value())
                .bind(now)
                .bind(id)
                .bind(owner_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to update content item")?;

        if affected == 0 {
            return Ok(None);
        }
        self.get_item(kind, id, owner_id).await
    }

    async fn get_link(
        &self,
        module_id: i64,
        kind: ContentKind,
        object_id: i64,
    ) -> Result<Option<Content>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(SELECT_LINK)
                    .bind(module_id)
                    .bind(kind.as_str())
                    .bind(object_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get content link")?;
                row.as_ref().map(row_to_content_sqlite).transpose()
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(SELECT_LINK)
                    .bind(module_id)
                    .bind(kind.as_str())
                    .bind(object_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get content link")?;
                row.as_ref().map(row_to_content_mysql).transpose()
            }
        }
    }

    async fn get_owned(&self, id: i64, owner_id: i64) -> Result<Option<Content>> {
        let sql = select_owned_link_sql();
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(owner_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get owned content")?;
                row.as_ref().map(row_to_content_sqlite).transpose()
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .bind(owner_id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get owned content")?;
                row.as_ref().map(row_to_content_mysql).transpose()
            }
        }
    }

    async fn delete_owned(&self, id: i64, owner_id: i64) -> Result<bool> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => delete_content_sqlite(pool, id, owner_id).await,
            Backend::Mysql(pool) => delete_content_mysql(pool, id, owner_id).await,
        }
    }

    async fn list_by_module(&self, module_id: i64) -> Result<Vec<ModuleContent>> {
        let mut contents = Vec::new();
        for kind in ContentKind::ALL {
            let sql = module_items_sql(kind);
            match self.pool.backend()? {
                Backend::Sqlite(pool) => {
                    let rows = sqlx::query(&sql)
                        .bind(kind.as_str())
                        .bind(module_id)
                        .fetch_all(pool)
                        .await
                        .context("Failed to list module contents")?;
                    contents.extend(rows.iter().map(|row| ModuleContent {
                        content: Content {
                            id: row.get("content_id"),
                            module_id: row.get("module_id"),
                            kind,
                            object_id: row.get("id"),
                            order: row.get("sort_order"),
                        },
                        item: row_to_item_sqlite(row, kind),
                    }));
                }
                Backend::Mysql(pool) => {
                    let rows = sqlx::query(&sql)
                        .bind(kind.as_str())
                        .bind(module_id)
                        .fetch_all(pool)
                        .await
                        .context("Failed to list module contents")?;
                    contents.extend(rows.iter().map(|row| ModuleContent {
                        content: Content {
                            id: row.get("content_id"),
                            module_id: row.get("module_id"),
                            kind,
                            object_id: row.get("id"),
                            order: row.get("sort_order"),
                        },
                        item: row_to_item_mysql(row, kind),
                    }));
                }
            }
        }
        Ok(sort_module_contents(contents))
    }

    async fn update_order_owned(&self, id: i64, owner_id: i64, order: i32) -> Result<bool> {
        let sql = format!("UPDATE contents SET sort_order = ? WHERE id = ? AND {}", OWNED_LINK);
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(order)
                .bind(id)
                .bind(owner_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(order)
                .bind(id)
                .bind(owner_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to update content order")?;
        Ok(affected > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_content_sqlite(
    pool: &SqlitePool,
    module_id: i64,
    owner_id: i64,
    draft: &ContentDraft,
) -> Result<ModuleContent> {
    let kind = draft.payload.kind();
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let object_id = sqlx::query(&insert_item_sql(kind))
        .bind(owner_id)
        .bind(&draft.title)
        .bind(draft.payload.value())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create content item")?
        .last_insert_rowid();

    let order: i32 = sqlx::query_scalar(NEXT_ORDER)
        .bind(module_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to compute content order")?;

    let content_id = sqlx::query(INSERT_LINK)
        .bind(module_id)
        .bind(kind.as_str())
        .bind(object_id)
        .bind(order)
        .execute(&mut *tx)
        .await
        .context("Failed to link content to module")?
        .last_insert_rowid();

    tx.commit().await?;

    Ok(new_module_content(content_id, module_id, object_id, order, owner_id, draft, now))
}

async fn delete_content_sqlite(pool: &SqlitePool, id: i64, owner_id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(&select_owned_link_sql())
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up content")?;
    let Some(link) = row.as_ref().map(row_to_content_sqlite).transpose()? else {
        return Ok(false);
    };

    sqlx::query(&format!("DELETE FROM {} WHERE id = ?", link.kind.table()))
        .bind(link.object_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete content item")?;
    sqlx::query("DELETE FROM contents WHERE id = ?")
        .bind(link.id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete content link")?;

    tx.commit().await?;
    Ok(true)
}

fn row_to_content_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Content> {
    let kind: String = row.get("kind");
    Ok(Content {
        id: row.get("id"),
        module_id: row.get("module_id"),
        kind: ContentKind::from_str(&kind)
            .with_context(|| format!("Invalid content kind in database: {}", kind))?,
        object_id: row.get("object_id"),
        order: row.get("sort_order"),
    })
}

fn row_to_item_sqlite(row: &sqlx::sqlite::SqliteRow, kind: ContentKind) -> ContentItem {
    ContentItem {
        base: ItemBase {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            title: row.get("title"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        },
        payload: ContentPayload::from_parts(kind, row.get("payload")),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_content_mysql(
    pool: &MySqlPool,
    module_id: i64,
    owner_id: i64,
    draft: &ContentDraft,
) -> Result<ModuleContent> {
    let kind = draft.payload.kind();
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let object_id = sqlx::query(&insert_item_sql(kind))
        .bind(owner_id)
        .bind(&draft.title)
        .bind(draft.payload.value())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create content item")?
        .last_insert_id() as i64;

    let order: i64 = sqlx::query_scalar(NEXT_ORDER)
        .bind(module_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to compute content order")?;
    let order = order as i32;

    let content_id = sqlx::query(INSERT_LINK)
        .bind(module_id)
        .bind(kind.as_str())
        .bind(object_id)
        .bind(order)
        .execute(&mut *tx)
        .await
        .context("Failed to link content to module")?
        .last_insert_id() as i64;

    tx.commit().await?;

    Ok(new_module_content(content_id, module_id, object_id, order, owner_id, draft, now))
}

async fn delete_content_mysql(pool: &MySqlPool, id: i64, owner_id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(&format!("{} FOR UPDATE", select_owned_link_sql()))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up content")?;
    let Some(link) = row.as_ref().map(row_to_content_mysql).transpose()? else {
        return Ok(false);
    };

    sqlx::query(&format!("DELETE FROM {} WHERE id = ?", link.kind.table()))
        .bind(link.object_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete content item")?;
    sqlx::query("DELETE FROM contents WHERE id = ?")
        .bind(link.id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete content link")?;

    tx.commit().await?;
    Ok(true)
}

fn row_to_content_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Content> {
    let kind: String = row.get("kind");
    Ok(Content {
        id: row.get("id"),
        module_id: row.get("module_id"),
        kind: ContentKind::from_str(&kind)
            .with_context(|| format!("Invalid content kind in database: {}", kind))?,
        object_id: row.get("object_id"),
        order: row.get("sort_order"),
    })
}

fn row_to_item_mysql(row: &sqlx::mysql::MySqlRow, kind: ContentKind) -> ContentItem {
    ContentItem {
        base: ItemBase {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            title: row.get("title"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        },
        payload: ContentPayload::from_parts(kind, row.get("payload")),
    }
}

fn new_module_content(
    content_id: i64,
    module_id: i64,
    object_id: i64,
    order: i32,
    owner_id: i64,
    draft: &ContentDraft,
    now: chrono::DateTime<Utc>,
) -> ModuleContent {
    ModuleContent {
        content: Content {
            id: content_id,
            module_id,
            kind: draft.payload.kind(),
            object_id,
            order,
        },
        item: ContentItem {
            base: ItemBase {
                id: object_id,
                owner_id,
                title: draft.title.clone(),
                created_at: now,
                updated_at: now,
            },
            payload: draft.payload.clone(),
        },
    }
}
