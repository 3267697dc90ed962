//! Subject service
//!
//! Read access for everyone; creation and deletion for administrators.

use crate::db::repositories::SubjectRepository;
use crate::models::{CreateSubjectInput, FieldErrors, Subject, SubjectWithCount, User};
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SubjectServiceError {
    #[error("Subject not found: {0}")]
    NotFound(String),

    #[error("Subject slug already exists: {0}")]
    DuplicateSlug(String),

    /// Subjects with courses cannot be removed
    #[error("Subject still has {0} course(s)")]
    InUse(i64),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct SubjectService {
    repo: Arc<dyn SubjectRepository>,
}

impl SubjectService {
    pub fn new(repo: Arc<dyn SubjectRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self) -> Result<Vec<Subject>, SubjectServiceError> {
        Ok(self.repo.list().await.context("Failed to list subjects")?)
    }

    /// Subjects annotated with how many courses each holds
    pub async fn list_with_course_counts(&self) -> Result<Vec<SubjectWithCount>, SubjectServiceError> {
        Ok(self
            .repo
            .list_with_course_counts()
            .await
            .context("Failed to list subjects with counts")?)
    }

    pub async fn get(&self, id: i64) -> Result<Subject, SubjectServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get subject")?
            .ok_or_else(|| SubjectServiceError::NotFound(id.to_string()))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Subject, SubjectServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get subject by slug")?
            .ok_or_else(|| SubjectServiceError::NotFound(slug.to_string()))
    }

    pub async fn create(
        &self,
        actor: &User,
        input: CreateSubjectInput,
    ) -> Result<Subject, SubjectServiceError> {
        require_admin(actor)?;

        let title = input.title.trim().to_string();
        let slug = match input.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slug.to_string(),
            _ => generate_slug(&title),
        };

        let mut errors = FieldErrors::new();
        if title.is_empty() {
            errors.add("title", "This field is required.");
        }
        if slug.is_empty() && !title.is_empty() {
            errors.add("slug", "Enter a valid slug.");
        }
        errors.into_result().map_err(SubjectServiceError::ValidationError)?;

        if self
            .repo
            .get_by_slug(&slug)
            .await
            .context("Failed to check slug uniqueness")?
            .is_some()
        {
            return Err(SubjectServiceError::DuplicateSlug(slug));
        }

        let subject = self
            .repo
            .create(&title, &slug)
            .await
            .context("Failed to create subject")?;
        tracing::info!(subject_id = subject.id, "Created subject {}", subject.slug);
        Ok(subject)
    }

    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), SubjectServiceError> {
        require_admin(actor)?;
        self.get(id).await?;

        let courses = self
            .repo
            .count_courses(id)
            .await
            .context("Failed to count subject courses")?;
        if courses > 0 {
            return Err(SubjectServiceError::InUse(courses));
        }

        self.repo.delete(id).await.context("Failed to delete subject")?;
        Ok(())
    }
}

fn require_admin(actor: &User) -> Result<(), SubjectServiceError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(SubjectServiceError::Forbidden(
            "Only administrators can manage subjects".to_string(),
        ))
    }
}

/// Generate a URL-friendly slug from a title.
///
/// ASCII letters and digits are lowercased and kept, non-ASCII letters are
/// kept as-is, and every other run of characters collapses into one `-`.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}
