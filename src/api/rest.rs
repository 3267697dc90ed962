//! Read-only JSON API
//!
//! Listing endpoints are public. Enrolling and reading course contents
//! authenticate with HTTP Basic.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::Subject;
use crate::services::{ApiCourse, ModuleWithContents};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/subjects", get(list_subjects))
        .route("/subjects/{id}", get(get_subject))
        .route("/courses", get(list_courses))
        .route("/courses/{id}", get(get_course))
}

/// Routes behind `require_basic_auth`
pub fn basic_auth_router() -> Router<AppState> {
    Router::new()
        .route("/courses/{id}/enroll", post(enroll))
        .route("/courses/{id}/contents", get(contents))
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.pool.ping().await.map_err(|e| {
        tracing::error!("Health check failed: {}", e);
        ApiError::internal_error("Database unavailable")
    })?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn list_subjects(State(state): State<AppState>) -> Result<Json<Vec<Subject>>, ApiError> {
    Ok(Json(state.subject_service.list().await?))
}

async fn get_subject(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Subject>, ApiError> {
    Ok(Json(state.subject_service.get(id).await?))
}

async fn list_courses(State(state): State<AppState>) -> Result<Json<Vec<ApiCourse>>, ApiError> {
    Ok(Json(state.course_service.api_list().await?))
}

async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiCourse>, ApiError> {
    Ok(Json(state.course_service.api_get(id).await?))
}

/// POST /api/courses/{id}/enroll
async fn enroll(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.enrollment_service.enroll(&user.0, id).await?;
    Ok(Json(json!({ "enrolled": true })))
}

/// GET /api/courses/{id}/contents
async fn contents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ModuleWithContents>>, ApiError> {
    Ok(Json(
        state.enrollment_service.course_contents(&user.0, id).await?,
    ))
}
