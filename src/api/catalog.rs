//! Public catalog
//!
//! - GET / and GET /courses - All courses with the subject list
//! - GET /course/subject/{subject} - Courses of one subject
//! - GET /course/{id} - Course detail by slug (cached)

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState};
use crate::services::{Catalog, CoursePage};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(catalog))
        .route("/courses", get(catalog))
        .route("/course/subject/{subject}", get(subject_catalog))
        // `id` carries the slug; matchit requires one name per position
        .route("/course/{id}", get(course_detail))
}

async fn catalog(State(state): State<AppState>) -> Result<Json<Catalog>, ApiError> {
    Ok(Json(state.course_service.catalog(None).await?))
}

async fn subject_catalog(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> Result<Json<Catalog>, ApiError> {
    Ok(Json(state.course_service.catalog(Some(&subject)).await?))
}

async fn course_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<CoursePage>, ApiError> {
    Ok(Json(state.course_service.public_page(&slug).await?))
}
