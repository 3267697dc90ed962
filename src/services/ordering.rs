//! Drag-and-drop ordering
//!
//! Accepts `{"<id>": <order>, ...}` for modules or contents. Each pair is
//! applied as its own single-row update scoped to the caller's courses;
//! there is no transaction across the batch, so concurrent submissions
//! interleave row by row. Ids the caller does not own are left unchanged and
//! reported as `not_found`.

use crate::db::repositories::{ContentRepository, ModuleRepository};
use crate::models::User;
use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum OrderingError {
    #[error("Invalid order payload: {0}")]
    InvalidPayload(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Updated,
    NotFound,
}

/// Outcome of a reorder batch, per submitted id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderReport {
    pub saved: &'static str,
    pub results: BTreeMap<String, OrderStatus>,
}

impl OrderReport {
    fn new() -> Self {
        Self {
            saved: "OK",
            results: BTreeMap::new(),
        }
    }

    pub fn status(&self, id: i64) -> Option<OrderStatus> {
        self.results.get(&id.to_string()).copied()
    }
}

/// Parse an id → order map. Keys must be integer ids and values
/// non-negative integers.
pub fn parse_order_map(payload: &Value) -> Result<Vec<(i64, i32)>, OrderingError> {
    let object = payload
        .as_object()
        .ok_or_else(|| OrderingError::InvalidPayload("expected a JSON object".to_string()))?;

    object
        .iter()
        .map(|(key, value)| {
            let id = key
                .trim()
                .parse::<i64>()
                .map_err(|_| OrderingError::InvalidPayload(format!("invalid id '{}'", key)))?;
            let order = value
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .filter(|n| *n >= 0)
                .ok_or_else(|| {
                    OrderingError::InvalidPayload(format!("invalid order for id {}: {}", id, value))
                })?;
            Ok((id, order))
        })
        .collect()
}

pub struct OrderingService {
    module_repo: Arc<dyn ModuleRepository>,
    content_repo: Arc<dyn ContentRepository>,
}

impl OrderingService {
    pub fn new(module_repo: Arc<dyn ModuleRepository>, content_repo: Arc<dyn ContentRepository>) -> Self {
        Self {
            module_repo,
            content_repo,
        }
    }

    pub async fn reorder_modules(&self, actor: &User, payload: &Value) -> Result<OrderReport, OrderingError> {
        let pairs = prepare(actor, payload)?;
        let mut report = OrderReport::new();
        for (id, order) in pairs {
            let updated = self
                .module_repo
                .update_order_owned(id, actor.id, order)
                .await
                .context("Failed to update module order")?;
            record(&mut report, "module", id, updated);
        }
        Ok(report)
    }

    pub async fn reorder_contents(&self, actor: &User, payload: &Value) -> Result<OrderReport, OrderingError> {
        let pairs = prepare(actor, payload)?;
        let mut report = OrderReport::new();
        for (id, order) in pairs {
            let updated = self
                .content_repo
                .update_order_owned(id, actor.id, order)
                .await
                .context("Failed to update content order")?;
            record(&mut report, "content", id, updated);
        }
        Ok(report)
    }
}

fn prepare(actor: &User, payload: &Value) -> Result<Vec<(i64, i32)>, OrderingError> {
    if !actor.can_manage_courses() {
        return Err(OrderingError::Forbidden(
            "Only instructors can reorder course material".to_string(),
        ));
    }
    parse_order_map(payload)
}

fn record(report: &mut OrderReport, what: &str, id: i64, updated: bool) {
    let status = if updated {
        OrderStatus::Updated
    } else {
        tracing::debug!(id, "Skipped reorder of unowned or missing {}", what);
        OrderStatus::NotFound
    };
    report.results.insert(id.to_string(), status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{seed_subject, setup_pool};
    use crate::db::repositories::{SqlxContentRepository, SqlxModuleRepository};
    use crate::models::{ContentDraft, ContentPayload, ModuleFormEntry, ModuleFormset, UserRole};
    use crate::services::course::tests::{course_input, course_service, create_user};
    use serde_json::json;

    #[test]
    fn test_parse_order_map() {
        let mut pairs = parse_order_map(&json!({"5": 1, "7": 2})).unwrap();
        pairs.sort();
        assert_eq!(pairs, vec![(5, 1), (7, 2)]);

        assert!(parse_order_map(&json!({})).unwrap().is_empty());
        assert!(parse_order_map(&json!({"abc": 1})).is_err());
        assert!(parse_order_map(&json!({"1": "2"})).is_err());
        assert!(parse_order_map(&json!({"1": 1.5})).is_err());
        assert!(parse_order_map(&json!({"1": -1})).is_err());
        assert!(parse_order_map(&json!({"1": 5_000_000_000i64})).is_err());
        assert!(parse_order_map(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_report_serialization() {
        let mut report = OrderReport::new();
        report.results.insert("5".into(), OrderStatus::Updated);
        report.results.insert("7".into(), OrderStatus::NotFound);
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"saved": "OK", "results": {"5": "updated", "7": "not_found"}})
        );
    }

    #[tokio::test]
    async fn test_reorder_skips_unowned_ids() {
        let pool = setup_pool().await;
        let courses = course_service(&pool);
        let subject = seed_subject(&pool, "cs").await;
        let a = create_user(&pool, "a", UserRole::Instructor).await;
        let b = create_user(&pool, "b", UserRole::Instructor).await;

        let mut module_ids = Vec::new();
        for (owner, title) in [(&a, "Mine"), (&b, "Theirs")] {
            let course = courses.create(owner, course_input(subject, title)).await.unwrap();
            let modules = courses
                .update_modules(
                    owner,
                    course.id,
                    ModuleFormset {
                        modules: vec![ModuleFormEntry {
                            title: "M".into(),
                            ..Default::default()
                        }],
                    },
                )
                .await
                .unwrap();
            module_ids.push(modules[0].id);
        }

        let content_repo = SqlxContentRepository::boxed(pool.clone());
        let draft = |title: &str| ContentDraft {
            title: title.into(),
            payload: ContentPayload::Text {
                content: "body".into(),
            },
        };
        let first = content_repo.create(module_ids[0], a.id, &draft("1")).await.unwrap();
        let second = content_repo.create(module_ids[0], a.id, &draft("2")).await.unwrap();
        let foreign = content_repo.create(module_ids[1], b.id, &draft("3")).await.unwrap();

        let service = OrderingService::new(SqlxModuleRepository::boxed(pool.clone()), content_repo.clone());
        let payload = json!({
            first.content.id.to_string(): 3,
            second.content.id.to_string(): 1,
            foreign.content.id.to_string(): 9,
        });
        let report = service.reorder_contents(&a, &payload).await.unwrap();

        assert_eq!(report.status(first.content.id), Some(OrderStatus::Updated));
        assert_eq!(report.status(foreign.content.id), Some(OrderStatus::NotFound));

        let orders: Vec<(i64, i32)> = content_repo
            .list_by_module(module_ids[0])
            .await
            .unwrap()
            .iter()
            .map(|c| (c.content.id, c.content.order))
            .collect();
        assert_eq!(orders, vec![(second.content.id, 1), (first.content.id, 3)]);
        assert_eq!(
            content_repo.get_owned(foreign.content.id, b.id).await.unwrap().unwrap().order,
            0
        );

        let modules = json!({
            module_ids[0].to_string(): 4,
            module_ids[1].to_string(): 4,
        });
        let report = service.reorder_modules(&a, &modules).await.unwrap();
        assert_eq!(report.status(module_ids[0]), Some(OrderStatus::Updated));
        assert_eq!(report.status(module_ids[1]), Some(OrderStatus::NotFound));

        let student = create_user(&pool, "s", UserRole::Student).await;
        assert!(matches!(
            service.reorder_modules(&student, &modules).await,
            Err(OrderingError::Forbidden(_))
        ));
    }
}
