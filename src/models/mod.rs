//! Data models
//!
//! Plain data types shared by repositories, services and the API layer.

mod content;
mod course;
mod module;
mod session;
mod subject;
mod user;

use serde::Serialize;
use std::collections::BTreeMap;

pub use content::{
    Content, ContentDraft, ContentItem, ContentKind, ContentPayload, ItemBase, ModuleContent,
    UnknownContentKind,
};
pub use course::{Course, CourseInput, CourseWithModuleCount};
pub use module::{Module, ModuleFormEntry, ModuleFormset};
pub use session::Session;
pub use subject::{CreateSubjectInput, Subject, SubjectWithCount};
pub use user::{User, UserRole};

/// Field-level validation messages, keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(())` when no field failed, otherwise the collected errors
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<&str> = self.0.keys().map(String::as_str).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}
