//! Module model

use serde::{Deserialize, Serialize};

/// Ordered section of a course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub description: String,
    pub order: i32,
}

/// One row of the module formset submitted for a course.
///
/// Rows without `id` are new modules; rows with `delete` set remove the
/// referenced module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleFormEntry {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: Option<i32>,
    #[serde(default)]
    pub delete: bool,
}

/// Module formset body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleFormset {
    #[serde(default)]
    pub modules: Vec<ModuleFormEntry>,
}
