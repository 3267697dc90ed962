//! Content editor service
//!
//! Creates, edits and deletes the content items of a module. The kind comes
//! in as a token from the URL and is resolved against the four known kinds;
//! an unknown token is a not-found and touches nothing.

use crate::db::repositories::{ContentRepository, ModuleRepository};
use crate::models::{ContentItem, ContentKind, FieldErrors, Module, ModuleContent, User};
use crate::services::content_form::{ContentForm, KindSpec};
use anyhow::Context;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ContentServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Resolve a content kind token, treating unknown tokens as missing
pub fn resolve_kind(model_name: &str) -> Result<ContentKind, ContentServiceError> {
    model_name
        .parse()
        .map_err(|_| ContentServiceError::NotFound(format!("content type {}", model_name)))
}

pub struct ContentService {
    module_repo: Arc<dyn ModuleRepository>,
    content_repo: Arc<dyn ContentRepository>,
}

impl ContentService {
    pub fn new(module_repo: Arc<dyn ModuleRepository>, content_repo: Arc<dyn ContentRepository>) -> Self {
        Self {
            module_repo,
            content_repo,
        }
    }

    /// The editable fields of a kind, for an empty create form
    pub fn form_schema(
        &self,
        actor: &User,
        model_name: &str,
    ) -> Result<&'static KindSpec, ContentServiceError> {
        require_manager(actor)?;
        Ok(KindSpec::of(resolve_kind(model_name)?))
    }

    /// A module of one of the caller's courses with its ordered contents
    pub async fn module_contents(
        &self,
        actor: &User,
        module_id: i64,
    ) -> Result<(Module, Vec<ModuleContent>), ContentServiceError> {
        let module = self.owned_module(actor, module_id).await?;
        let contents = self
            .content_repo
            .list_by_module(module.id)
            .await
            .context("Failed to list module contents")?;
        Ok((module, contents))
    }

    /// An existing item of the module, for editing
    pub async fn get_item(
        &self,
        actor: &User,
        module_id: i64,
        model_name: &str,
        id: i64,
    ) -> Result<ContentItem, ContentServiceError> {
        let kind = resolve_kind(model_name)?;
        let module = self.owned_module(actor, module_id).await?;
        self.linked_item(actor, &module, kind, id).await
    }

    /// Create an item and link it at the end of the module
    pub async fn create(
        &self,
        actor: &User,
        module_id: i64,
        model_name: &str,
        input: &Value,
    ) -> Result<ModuleContent, ContentServiceError> {
        let kind = resolve_kind(model_name)?;
        let module = self.owned_module(actor, module_id).await?;
        let draft = ContentForm::bind(kind, input).map_err(ContentServiceError::ValidationError)?;

        let created = self
            .content_repo
            .create(module.id, actor.id, &draft)
            .await
            .context("Failed to create content")?;
        tracing::info!(
            content_id = created.content.id,
            module_id = module.id,
            kind = %kind,
            "Created content"
        );
        Ok(created)
    }

    /// Update an item of the module in place. The module link is left as is.
    pub async fn update(
        &self,
        actor: &User,
        module_id: i64,
        model_name: &str,
        id: i64,
        input: &Value,
    ) -> Result<ContentItem, ContentServiceError> {
        let kind = resolve_kind(model_name)?;
        let module = self.owned_module(actor, module_id).await?;
        self.linked_item(actor, &module, kind, id).await?;
        let draft = ContentForm::bind(kind, input).map_err(ContentServiceError::ValidationError)?;

        self.content_repo
            .update_item(kind, id, actor.id, &draft)
            .await
            .context("Failed to update content item")?
            .ok_or_else(|| ContentServiceError::NotFound(format!("{} {}", kind, id)))
    }

    /// Delete a content link and its item
    pub async fn delete(&self, actor: &User, content_id: i64) -> Result<(), ContentServiceError> {
        require_manager(actor)?;
        let deleted = self
            .content_repo
            .delete_owned(content_id, actor.id)
            .await
            .context("Failed to delete content")?;
        if !deleted {
            return Err(ContentServiceError::NotFound(format!("content {}", content_id)));
        }
        tracing::info!(content_id, "Deleted content");
        Ok(())
    }

    async fn owned_module(&self, actor: &User, module_id: i64) -> Result<Module, ContentServiceError> {
        require_manager(actor)?;
        self.module_repo
            .get_owned(module_id, actor.id)
            .await
            .context("Failed to get module")?
            .ok_or_else(|| ContentServiceError::NotFound(format!("module {}", module_id)))
    }

    async fn linked_item(
        &self,
        actor: &User,
        module: &Module,
        kind: ContentKind,
        id: i64,
    ) -> Result<ContentItem, ContentServiceError> {
        let not_found = || ContentServiceError::NotFound(format!("{} {}", kind, id));

        self.content_repo
            .get_link(module.id, kind, id)
            .await
            .context("Failed to get content link")?
            .ok_or_else(not_found)?;
        self.content_repo
            .get_item(kind, id, actor.id)
            .await
            .context("Failed to get content item")?
            .ok_or_else(not_found)
    }
}

fn require_manager(actor: &User) -> Result<(), ContentServiceError> {
    if actor.can_manage_courses() {
        Ok(())
    } else {
        Err(ContentServiceError::Forbidden(
            "Only instructors can manage content".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{seed_subject, setup_pool};
    use crate::db::repositories::{SqlxContentRepository, SqlxModuleRepository};
    use crate::db::DynDatabasePool;
    use crate::models::{ContentPayload, ModuleFormEntry, ModuleFormset, UserRole};
    use crate::services::course::tests::{course_input, course_service, create_user};
    use serde_json::json;

    struct Fixture {
        pool: DynDatabasePool,
        service: ContentService,
        owner: User,
        module_id: i64,
    }

    async fn fixture() -> Fixture {
        let pool = setup_pool().await;
        let courses = course_service(&pool);
        let subject = seed_subject(&pool, "programming").await;
        let owner = create_user(&pool, "owner", UserRole::Instructor).await;
        let course = courses.create(&owner, course_input(subject, "Intro")).await.unwrap();
        let modules = courses
            .update_modules(
                &owner,
                course.id,
                ModuleFormset {
                    modules: vec![ModuleFormEntry {
                        title: "Week 1".into(),
                        ..Default::default()
                    }],
                },
            )
            .await
            .unwrap();

        let service = ContentService::new(
            SqlxModuleRepository::boxed(pool.clone()),
            SqlxContentRepository::boxed(pool.clone()),
        );
        Fixture {
            pool,
            service,
            owner,
            module_id: modules[0].id,
        }
    }

    async fn count(pool: &DynDatabasePool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_kind_creates_nothing() {
        let f = fixture().await;
        for token in ["audio", "Text", "course", ""] {
            let result = f
                .service
                .create(&f.owner, f.module_id, token, &json!({"title": "x", "content": "y"}))
                .await;
            assert!(matches!(result, Err(ContentServiceError::NotFound(_))));
        }
        assert_eq!(count(&f.pool, "contents").await, 0);
        for table in ["texts", "videos", "images", "files"] {
            assert_eq!(count(&f.pool, table).await, 0);
        }
    }

    #[tokio::test]
    async fn test_create_edit_delete_cycle() {
        let f = fixture().await;

        let created = f
            .service
            .create(&f.owner, f.module_id, "text", &json!({"title": "Hello", "content": "World"}))
            .await
            .unwrap();
        assert_eq!(created.item.base.owner_id, f.owner.id);
        assert_eq!(created.content.order, 0);

        let id = created.item.base.id;
        let updated = f
            .service
            .update(&f.owner, f.module_id, "text", id, &json!({"title": "Hello again", "content": "Edited"}))
            .await
            .unwrap();
        assert_eq!(updated.payload, ContentPayload::Text { content: "Edited".into() });
        assert_eq!(count(&f.pool, "contents").await, 1);

        let fetched = f.service.get_item(&f.owner, f.module_id, "text", id).await.unwrap();
        assert_eq!(fetched.base.title, "Hello again");
        assert!(matches!(
            f.service.get_item(&f.owner, f.module_id, "video", id).await,
            Err(ContentServiceError::NotFound(_))
        ));

        f.service.delete(&f.owner, created.content.id).await.unwrap();
        assert_eq!(count(&f.pool, "contents").await, 0);
        assert_eq!(count(&f.pool, "texts").await, 0);
        assert!(matches!(
            f.service.delete(&f.owner, created.content.id).await,
            Err(ContentServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_and_foreign_access() {
        let f = fixture().await;
        let intruder = create_user(&f.pool, "intruder", UserRole::Instructor).await;
        let student = create_user(&f.pool, "student", UserRole::Student).await;

        match f
            .service
            .create(&f.owner, f.module_id, "video", &json!({"title": "Clip", "url": "not a url"}))
            .await
        {
            Err(ContentServiceError::ValidationError(errors)) => assert!(errors.get("url").is_some()),
            other => panic!("expected validation error, got {:?}", other),
        }

        let input = json!({"title": "Clip", "url": "https://vimeo.com/1"});
        assert!(matches!(
            f.service.create(&intruder, f.module_id, "video", &input).await,
            Err(ContentServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.create(&student, f.module_id, "video", &input).await,
            Err(ContentServiceError::Forbidden(_))
        ));

        let created = f.service.create(&f.owner, f.module_id, "video", &input).await.unwrap();
        assert!(matches!(
            f.service.delete(&intruder, created.content.id).await,
            Err(ContentServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.module_contents(&intruder, f.module_id).await,
            Err(ContentServiceError::NotFound(_))
        ));

        let (module, contents) = f.service.module_contents(&f.owner, f.module_id).await.unwrap();
        assert_eq!(module.id, f.module_id);
        assert_eq!(contents.len(), 1);
    }

    #[test]
    fn test_resolve_kind() {
        assert_eq!(resolve_kind("image").unwrap(), ContentKind::Image);
        assert!(matches!(resolve_kind("images"), Err(ContentServiceError::NotFound(_))));
    }
}
