//! Subject model

use serde::{Deserialize, Serialize};

/// Topic that groups courses in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub title: String,
    pub slug: String,
}

/// Subject annotated with the number of courses filed under it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectWithCount {
    #[serde(flatten)]
    pub subject: Subject,
    pub total_courses: i64,
}

/// Input for creating a subject
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubjectInput {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
}
