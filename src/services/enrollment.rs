//! Enrollment and the student side of a course
//!
//! Enrolling is idempotent. Everything a student reads beyond the public
//! page requires an enrollment; without one the course is reported missing.

use crate::db::repositories::{ContentRepository, CourseRepository, ModuleRepository};
use crate::models::{ContentKind, Course, Module, ModuleContent, User};
use crate::services::content_form::KindSpec;
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A content item as shown to students
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedContent {
    pub id: i64,
    pub order: i32,
    pub kind: ContentKind,
    pub title: String,
    pub rendered: String,
}

impl From<&ModuleContent> for RenderedContent {
    fn from(content: &ModuleContent) -> Self {
        let spec = KindSpec::of(content.content.kind);
        Self {
            id: content.content.id,
            order: content.content.order,
            kind: content.content.kind,
            title: content.item.base.title.clone(),
            rendered: (spec.render)(&content.item),
        }
    }
}

/// An enrolled student's view of a course with one module opened
#[derive(Debug, Clone, Serialize)]
pub struct StudentCourse {
    pub course: Course,
    pub modules: Vec<Module>,
    pub module: Option<Module>,
    pub contents: Vec<RenderedContent>,
}

/// A module with its rendered contents, for the API
#[derive(Debug, Clone, Serialize)]
pub struct ModuleWithContents {
    pub id: i64,
    pub order: i32,
    pub title: String,
    pub description: String,
    pub contents: Vec<RenderedContent>,
}

pub struct EnrollmentService {
    course_repo: Arc<dyn CourseRepository>,
    module_repo: Arc<dyn ModuleRepository>,
    content_repo: Arc<dyn ContentRepository>,
}

impl EnrollmentService {
    pub fn new(
        course_repo: Arc<dyn CourseRepository>,
        module_repo: Arc<dyn ModuleRepository>,
        content_repo: Arc<dyn ContentRepository>,
    ) -> Self {
        Self {
            course_repo,
            module_repo,
            content_repo,
        }
    }

    /// Enroll the caller. Enrolling twice is a no-op.
    pub async fn enroll(&self, actor: &User, course_id: i64) -> Result<Course, EnrollmentError> {
        let course = self
            .course_repo
            .get_by_id(course_id)
            .await
            .context("Failed to get course")?
            .ok_or_else(|| EnrollmentError::NotFound(format!("course {}", course_id)))?;

        let added = self
            .course_repo
            .enroll(course.id, actor.id)
            .await
            .context("Failed to enroll student")?;
        if added {
            tracing::info!(course_id = course.id, user_id = actor.id, "Student enrolled");
        }
        Ok(course)
    }

    pub async fn enrolled_courses(&self, actor: &User) -> Result<Vec<Course>, EnrollmentError> {
        Ok(self
            .course_repo
            .list_enrolled(actor.id)
            .await
            .context("Failed to list enrolled courses")?)
    }

    /// Course detail for an enrolled student.
    ///
    /// Without `module_id` the module with the lowest order is opened; a
    /// module of another course is not found.
    pub async fn student_course(
        &self,
        actor: &User,
        course_id: i64,
        module_id: Option<i64>,
    ) -> Result<StudentCourse, EnrollmentError> {
        let course = self.enrolled_course(actor, course_id).await?;

        let module = match module_id {
            Some(id) => Some(
                self.module_repo
                    .get_in_course(id, course.id)
                    .await
                    .context("Failed to get module")?
                    .ok_or_else(|| EnrollmentError::NotFound(format!("module {}", id)))?,
            ),
            None => self
                .module_repo
                .first_in_course(course.id)
                .await
                .context("Failed to get first module")?,
        };

        let contents = match &module {
            Some(module) => self.rendered_contents(module.id).await?,
            None => Vec::new(),
        };
        let modules = self
            .module_repo
            .list_by_course(course.id)
            .await
            .context("Failed to list modules")?;

        Ok(StudentCourse {
            course,
            modules,
            module,
            contents,
        })
    }

    /// Every module of an enrolled course with its rendered contents
    pub async fn course_contents(
        &self,
        actor: &User,
        course_id: i64,
    ) -> Result<Vec<ModuleWithContents>, EnrollmentError> {
        let course = self.enrolled_course(actor, course_id).await?;
        let modules = self
            .module_repo
            .list_by_course(course.id)
            .await
            .context("Failed to list modules")?;

        let mut out = Vec::with_capacity(modules.len());
        for module in modules {
            let contents = self.rendered_contents(module.id).await?;
            out.push(ModuleWithContents {
                id: module.id,
                order: module.order,
                title: module.title,
                description: module.description,
                contents,
            });
        }
        Ok(out)
    }

    async fn enrolled_course(&self, actor: &User, course_id: i64) -> Result<Course, EnrollmentError> {
        let not_found = || EnrollmentError::NotFound(format!("course {}", course_id));

        if !self
            .course_repo
            .is_enrolled(course_id, actor.id)
            .await
            .context("Failed to check enrollment")?
        {
            return Err(not_found());
        }
        self.course_repo
            .get_by_id(course_id)
            .await
            .context("Failed to get course")?
            .ok_or_else(not_found)
    }

    async fn rendered_contents(&self, module_id: i64) -> Result<Vec<RenderedContent>, EnrollmentError> {
        let contents = self
            .content_repo
            .list_by_module(module_id)
            .await
            .context("Failed to list module contents")?;
        Ok(contents.iter().map(RenderedContent::from).collect())
    }
}
