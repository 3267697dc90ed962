//! Course service
//!
//! Instructor-facing course management (always scoped to the caller's own
//! courses), the module formset, the public catalog and the read-only API
//! views. A course owned by someone else is reported exactly like a missing
//! one.

use crate::cache::{course_page_key, CacheLayer, SharedCache};
use crate::db::repositories::{
    CourseFields, CourseRepository, ModuleRepository, SubjectRepository, UserRepository,
};
use crate::models::{
    Course, CourseInput, CourseWithModuleCount, FieldErrors, Module, ModuleFormEntry,
    ModuleFormset, Subject, SubjectWithCount, User,
};
use crate::services::subject::generate_slug;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const MAX_TITLE_LEN: usize = 200;

/// Slugs that collide with the static segments under `/course/`
const RESERVED_SLUGS: &[&str] = &["mine", "create", "module", "content", "upload", "subject"];

#[derive(Debug, thiserror::Error)]
pub enum CourseServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller's role may not manage courses
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl CourseServiceError {
    fn course(id: i64) -> Self {
        Self::NotFound(format!("course {}", id))
    }
}

/// Public catalog listing
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub subjects: Vec<SubjectWithCount>,
    /// The subject the listing is filtered by, if any
    pub subject: Option<Subject>,
    pub courses: Vec<CourseWithModuleCount>,
}

/// Public course page, cached per slug
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoursePage {
    pub course: Course,
    pub subject: Subject,
    pub owner: String,
    pub modules: Vec<Module>,
}

/// Course as exposed by the JSON API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiCourse {
    pub id: i64,
    pub subject: i64,
    pub title: String,
    pub slug: String,
    pub overview: String,
    pub created: DateTime<Utc>,
    pub owner: i64,
    pub modules: Vec<ApiModule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiModule {
    pub order: i32,
    pub title: String,
    pub description: String,
}

impl ApiCourse {
    fn new(course: Course, modules: Vec<Module>) -> Self {
        Self {
            id: course.id,
            subject: course.subject_id,
            title: course.title,
            slug: course.slug,
            overview: course.overview,
            created: course.created_at,
            owner: course.owner_id,
            modules: modules
                .into_iter()
                .map(|m| ApiModule {
                    order: m.order,
                    title: m.title,
                    description: m.description,
                })
                .collect(),
        }
    }
}

pub struct CourseService {
    course_repo: Arc<dyn CourseRepository>,
    module_repo: Arc<dyn ModuleRepository>,
    subject_repo: Arc<dyn SubjectRepository>,
    user_repo: Arc<dyn UserRepository>,
    cache: SharedCache,
    page_ttl: Duration,
}

impl CourseService {
    pub fn new(
        course_repo: Arc<dyn CourseRepository>,
        module_repo: Arc<dyn ModuleRepository>,
        subject_repo: Arc<dyn SubjectRepository>,
        user_repo: Arc<dyn UserRepository>,
        cache: SharedCache,
        page_ttl: Duration,
    ) -> Self {
        Self {
            course_repo,
            module_repo,
            subject_repo,
            user_repo,
            cache,
            page_ttl,
        }
    }

    // ===== Owner scope =====

    /// The caller's own courses, newest first
    pub async fn mine(&self, actor: &User) -> Result<Vec<Course>, CourseServiceError> {
        require_manager(actor)?;
        Ok(self
            .course_repo
            .list_by_owner(actor.id)
            .await
            .context("Failed to list own courses")?)
    }

    /// A course the caller owns
    pub async fn get_owned(&self, actor: &User, id: i64) -> Result<Course, CourseServiceError> {
        require_manager(actor)?;
        self.course_repo
            .get_owned(id, actor.id)
            .await
            .context("Failed to get course")?
            .ok_or_else(|| CourseServiceError::course(id))
    }

    /// Create a course owned by the caller
    pub async fn create(&self, actor: &User, input: CourseInput) -> Result<Course, CourseServiceError> {
        require_manager(actor)?;
        let fields = self.clean_course_input(input, None).await?;

        let course = self
            .course_repo
            .create(actor.id, &fields)
            .await
            .context("Failed to create course")?;
        tracing::info!(course_id = course.id, owner_id = actor.id, "Created course {}", course.slug);
        Ok(course)
    }

    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: CourseInput,
    ) -> Result<Course, CourseServiceError> {
        self.get_owned(actor, id).await?;
        let fields = self.clean_course_input(input, Some(id)).await?;

        self.course_repo
            .update_owned(id, actor.id, &fields)
            .await
            .context("Failed to update course")?
            .ok_or_else(|| CourseServiceError::course(id))
    }

    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), CourseServiceError> {
        require_manager(actor)?;
        let deleted = self
            .course_repo
            .delete_owned(id, actor.id)
            .await
            .context("Failed to delete course")?;
        if !deleted {
            return Err(CourseServiceError::course(id));
        }
        tracing::info!(course_id = id, owner_id = actor.id, "Deleted course");
        Ok(())
    }

    // ===== Module formset =====

    pub async fn modules(&self, actor: &User, course_id: i64) -> Result<Vec<Module>, CourseServiceError> {
        let course = self.get_owned(actor, course_id).await?;
        Ok(self
            .module_repo
            .list_by_course(course.id)
            .await
            .context("Failed to list modules")?)
    }

    /// Apply a module formset to an owned course.
    ///
    /// Every entry is validated before anything is written. Entries with an
    /// id must belong to the course; entries flagged `delete` are removed.
    pub async fn update_modules(
        &self,
        actor: &User,
        course_id: i64,
        formset: ModuleFormset,
    ) -> Result<Vec<Module>, CourseServiceError> {
        let course = self.get_owned(actor, course_id).await?;

        validate_formset(&formset.modules).map_err(CourseServiceError::ValidationError)?;

        for id in formset.modules.iter().filter_map(|entry| entry.id) {
            if self
                .module_repo
                .get_in_course(id, course.id)
                .await
                .context("Failed to get module")?
                .is_none()
            {
                return Err(CourseServiceError::NotFound(format!("module {}", id)));
            }
        }

        for entry in formset.modules {
            let title = entry.title.trim();
            match (entry.id, entry.delete) {
                (Some(id), true) => {
                    self.module_repo
                        .delete(id, course.id)
                        .await
                        .context("Failed to delete module")?;
                }
                (Some(id), false) => {
                    self.module_repo
                        .update(id, course.id, title, &entry.description, entry.order)
                        .await
                        .context("Failed to update module")?;
                }
                (None, false) => {
                    self.module_repo
                        .create(course.id, title, &entry.description, entry.order)
                        .await
                        .context("Failed to create module")?;
                }
                (None, true) => {}
            }
        }

        Ok(self
            .module_repo
            .list_by_course(course.id)
            .await
            .context("Failed to list modules")?)
    }

    // ===== Public catalog =====

    /// Catalog of all courses, or of one subject's courses
    pub async fn catalog(&self, subject_slug: Option<&str>) -> Result<Catalog, CourseServiceError> {
        let subjects = self
            .subject_repo
            .list_with_course_counts()
            .await
            .context("Failed to list subjects")?;

        let subject = match subject_slug {
            Some(slug) => Some(
                self.subject_repo
                    .get_by_slug(slug)
                    .await
                    .context("Failed to get subject")?
                    .ok_or_else(|| CourseServiceError::NotFound(format!("subject {}", slug)))?,
            ),
            None => None,
        };

        let courses = self
            .course_repo
            .list_with_module_counts(subject.as_ref().map(|s| s.id))
            .await
            .context("Failed to list courses")?;

        Ok(Catalog {
            subjects,
            subject,
            courses,
        })
    }

    /// Public course page by slug, read through the page cache.
    ///
    /// Cached pages are never invalidated; they expire after the page TTL.
    pub async fn public_page(&self, slug: &str) -> Result<CoursePage, CourseServiceError> {
        let key = course_page_key(slug);
        match self.cache.get::<CoursePage>(&key).await {
            Ok(Some(page)) => return Ok(page),
            Ok(None) => {}
            Err(e) => tracing::warn!("Ignoring unreadable cache entry {}: {:#}", key, e),
        }

        let course = self
            .course_repo
            .get_by_slug(slug)
            .await
            .context("Failed to get course by slug")?
            .ok_or_else(|| CourseServiceError::NotFound(format!("course {}", slug)))?;
        let page = self.build_page(course).await?;

        if let Err(e) = self.cache.set(&key, &page, self.page_ttl).await {
            tracing::warn!("Failed to cache course page {}: {:#}", key, e);
        }
        Ok(page)
    }

    async fn build_page(&self, course: Course) -> Result<CoursePage, CourseServiceError> {
        let subject = self
            .subject_repo
            .get_by_id(course.subject_id)
            .await
            .context("Failed to get course subject")?
            .ok_or_else(|| CourseServiceError::NotFound(format!("subject {}", course.subject_id)))?;
        let owner = self
            .user_repo
            .get_by_id(course.owner_id)
            .await
            .context("Failed to get course owner")?
            .map(|u| u.username)
            .unwrap_or_default();
        let modules = self
            .module_repo
            .list_by_course(course.id)
            .await
            .context("Failed to list modules")?;

        Ok(CoursePage {
            course,
            subject,
            owner,
            modules,
        })
    }

    // ===== Read-only API =====

    pub async fn api_list(&self) -> Result<Vec<ApiCourse>, CourseServiceError> {
        let courses = self.course_repo.list().await.context("Failed to list courses")?;
        let mut out = Vec::with_capacity(courses.len());
        for course in courses {
            let modules = self
                .module_repo
                .list_by_course(course.id)
                .await
                .context("Failed to list modules")?;
            out.push(ApiCourse::new(course, modules));
        }
        Ok(out)
    }

    pub async fn api_get(&self, id: i64) -> Result<ApiCourse, CourseServiceError> {
        let course = self.get(id).await?;
        let modules = self
            .module_repo
            .list_by_course(course.id)
            .await
            .context("Failed to list modules")?;
        Ok(ApiCourse::new(course, modules))
    }

    /// Any course by id, regardless of owner
    pub async fn get(&self, id: i64) -> Result<Course, CourseServiceError> {
        self.course_repo
            .get_by_id(id)
            .await
            .context("Failed to get course")?
            .ok_or_else(|| CourseServiceError::course(id))
    }

    async fn clean_course_input(
        &self,
        input: CourseInput,
        existing: Option<i64>,
    ) -> Result<CourseFields, CourseServiceError> {
        let mut errors = FieldErrors::new();

        let title = input.title.trim().to_string();
        if title.is_empty() {
            errors.add("title", "This field is required.");
        } else if title.chars().count() > MAX_TITLE_LEN {
            errors.add(
                "title",
                format!("Ensure this value has at most {} characters.", MAX_TITLE_LEN),
            );
        }

        let slug = match input.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slug.to_string(),
            _ => generate_slug(&title),
        };
        if !title.is_empty() && !is_valid_slug(&slug) {
            errors.add(
                "slug",
                "Enter a valid slug consisting of letters, numbers, underscores or hyphens.",
            );
        } else if RESERVED_SLUGS.contains(&slug.as_str()) {
            errors.add("slug", format!("\"{}\" is reserved.", slug));
        } else if !slug.is_empty()
            && self
                .course_repo
                .slug_taken(&slug, existing)
                .await
                .context("Failed to check slug")?
        {
            errors.add("slug", "Course with this slug already exists.");
        }

        if self
            .subject_repo
            .get_by_id(input.subject_id)
            .await
            .context("Failed to get subject")?
            .is_none()
        {
            errors.add(
                "subject_id",
                "Select a valid choice. That choice is not one of the available choices.",
            );
        }

        errors.into_result().map_err(CourseServiceError::ValidationError)?;

        Ok(CourseFields {
            subject_id: input.subject_id,
            title,
            slug,
            overview: input.overview,
        })
    }
}

fn require_manager(actor: &User) -> Result<(), CourseServiceError> {
    if actor.can_manage_courses() {
        Ok(())
    } else {
        Err(CourseServiceError::Forbidden(
            "Only instructors can manage courses".to_string(),
        ))
    }
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slug.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

fn validate_formset(entries: &[ModuleFormEntry]) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    for (i, entry) in entries.iter().enumerate() {
        if entry.delete {
            continue;
        }
        let title = entry.title.trim();
        if title.is_empty() {
            errors.add(format!("modules[{}].title", i), "This field is required.");
        } else if title.chars().count() > MAX_TITLE_LEN {
            errors.add(
                format!("modules[{}].title", i),
                format!("Ensure this value has at most {} characters.", MAX_TITLE_LEN),
            );
        }
        if matches!(entry.order, Some(order) if order < 0) {
            errors.add(
                format!("modules[{}].order", i),
                "Ensure this value is greater than or equal to 0.",
            );
        }
    }
    errors.into_result()
}
