//! Course model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A course authored by its owner and filed under one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub owner_id: i64,
    pub subject_id: i64,
    pub title: String,
    pub slug: String,
    pub overview: String,
    pub created_at: DateTime<Utc>,
}

/// Catalog row: a course with its module count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseWithModuleCount {
    #[serde(flatten)]
    pub course: Course,
    pub total_modules: i64,
}

/// Editable course fields. The owner is never part of the input.
#[derive(Debug, Clone, Deserialize)]
pub struct CourseInput {
    pub subject_id: i64,
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub overview: String,
}
