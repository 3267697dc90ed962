//! Admin API endpoints
//!
//! - POST /api/admin/subjects - Create a subject
//! - DELETE /api/admin/subjects/{id} - Delete a subject without courses
//! - PUT /api/admin/users/{id}/role - Change a user's role

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::api::middleware::{parse_body, ApiError, AppState, AuthenticatedUser, JsonBody};
use crate::models::{CreateSubjectInput, User, UserRole};

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

/// Build the admin router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/subjects", post(create_subject))
        .route("/subjects/{id}", delete(delete_subject))
        .route("/users/{id}/role", put(change_role))
}

async fn create_subject(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let input: CreateSubjectInput = parse_body(&body)?;
    let subject = state
        .subject_service
        .create(&user.0, input)
        .await
        .map_err(|e| ApiError::from(e).with_input(&body))?;
    Ok((StatusCode::CREATED, Json(subject)))
}

async fn delete_subject(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.subject_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<User>, ApiError> {
    let request: RoleRequest = parse_body(&body)?;
    Ok(Json(
        state.user_service.change_role(&user.0, id, request.role).await?,
    ))
}
