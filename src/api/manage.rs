//! Instructor endpoints
//!
//! Course CRUD, the module formset, the content editor and drag-and-drop
//! ordering. Every handler works on the caller's own courses only.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::api::middleware::{parse_body, ApiError, AppState, AuthenticatedUser, JsonBody};
use crate::models::{ContentItem, Course, CourseInput, Module, ModuleContent, ModuleFormset};
use crate::services::{ContentForm, KindSpec, OrderReport};

/// Build the course management router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/mine", get(my_courses))
        .route("/create", post(create_course))
        .route("/{id}/edit", put(update_course))
        .route("/{id}/delete", delete(delete_course))
        .route("/{id}/module", get(list_modules).put(update_modules))
        .route("/module/order", post(order_modules))
        .route("/content/order", post(order_contents))
        .route("/module/{module_id}", get(module_contents))
        .route(
            "/module/{module_id}/content/{model_name}/create",
            get(content_form).post(create_content),
        )
        .route(
            "/module/{module_id}/content/{model_name}/{id}",
            get(edit_content).put(update_content),
        )
        .route("/content/{id}/delete", delete(delete_content))
}

/// A module with its contents, for the editor
#[derive(Debug, Serialize)]
pub struct ModuleContentsResponse {
    pub module: Module,
    pub contents: Vec<ModuleContent>,
}

/// An existing item with its form
#[derive(Debug, Serialize)]
pub struct EditContentResponse {
    pub form: &'static KindSpec,
    pub initial: Map<String, Value>,
    pub item: ContentItem,
}

/// GET /course/mine
async fn my_courses(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Course>>, ApiError> {
    Ok(Json(state.course_service.mine(&user.0).await?))
}

/// POST /course/create
///
/// The owner is always the caller; an `owner` field in the body is ignored.
async fn create_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let input: CourseInput = parse_body(&body)?;
    let course = state
        .course_service
        .create(&user.0, input)
        .await
        .map_err(|e| ApiError::from(e).with_input(&body))?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// PUT /course/{id}/edit
async fn update_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<Course>, ApiError> {
    let input: CourseInput = parse_body(&body)?;
    let course = state
        .course_service
        .update(&user.0, id, input)
        .await
        .map_err(|e| ApiError::from(e).with_input(&body))?;
    Ok(Json(course))
}

/// DELETE /course/{id}/delete
async fn delete_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.course_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /course/{id}/module
async fn list_modules(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Module>>, ApiError> {
    Ok(Json(state.course_service.modules(&user.0, id).await?))
}

/// PUT /course/{id}/module
async fn update_modules(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<Vec<Module>>, ApiError> {
    let formset: ModuleFormset = parse_body(&body)?;
    let modules = state
        .course_service
        .update_modules(&user.0, id, formset)
        .await
        .map_err(|e| ApiError::from(e).with_input(&body))?;
    Ok(Json(modules))
}

/// GET /course/module/{module_id}
async fn module_contents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(module_id): Path<i64>,
) -> Result<Json<ModuleContentsResponse>, ApiError> {
    let (module, contents) = state
        .content_service
        .module_contents(&user.0, module_id)
        .await?;
    Ok(Json(ModuleContentsResponse { module, contents }))
}

/// GET /course/module/{module_id}/content/{model_name}/create
///
/// The empty form: the fields of the requested kind.
async fn content_form(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((module_id, model_name)): Path<(i64, String)>,
) -> Result<Json<&'static KindSpec>, ApiError> {
    let spec = state.content_service.form_schema(&user.0, &model_name)?;
    // The module must still be one of the caller's
    state
        .content_service
        .module_contents(&user.0, module_id)
        .await?;
    Ok(Json(spec))
}

/// POST /course/module/{module_id}/content/{model_name}/create
async fn create_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((module_id, model_name)): Path<(i64, String)>,
    JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state
        .content_service
        .create(&user.0, module_id, &model_name, &body)
        .await
        .map_err(|e| ApiError::from(e).with_input(&body))?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /course/module/{module_id}/content/{model_name}/{id}
async fn edit_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((module_id, model_name, id)): Path<(i64, String, i64)>,
) -> Result<Json<EditContentResponse>, ApiError> {
    let item = state
        .content_service
        .get_item(&user.0, module_id, &model_name, id)
        .await?;
    Ok(Json(EditContentResponse {
        form: KindSpec::of(item.kind()),
        initial: ContentForm::initial(&item),
        item,
    }))
}

/// PUT /course/module/{module_id}/content/{model_name}/{id}
async fn update_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((module_id, model_name, id)): Path<(i64, String, i64)>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<ContentItem>, ApiError> {
    let item = state
        .content_service
        .update(&user.0, module_id, &model_name, id, &body)
        .await
        .map_err(|e| ApiError::from(e).with_input(&body))?;
    Ok(Json(item))
}

/// DELETE /course/content/{id}/delete
async fn delete_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.content_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /course/module/order
async fn order_modules(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<OrderReport>, ApiError> {
    Ok(Json(
        state.ordering_service.reorder_modules(&user.0, &body).await?,
    ))
}

/// POST /course/content/order
async fn order_contents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<OrderReport>, ApiError> {
    Ok(Json(
        state.ordering_service.reorder_contents(&user.0, &body).await?,
    ))
}
